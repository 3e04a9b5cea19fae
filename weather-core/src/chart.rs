//! Hourly temperature chart, rendered to PNG in memory.
//!
//! Every request gets its own pixel buffer, so concurrent renders never share
//! output.

use std::io::Cursor;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use image::{ImageFormat, RgbImage};
use plotters::coord::combinators::BindKeyPoints;
use plotters::coord::types::RangedDateTime;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{Coordinate, HourlySeries, WeatherError};

pub const DEFAULT_WIDTH: u32 = 1200;
pub const DEFAULT_HEIGHT: u32 = 600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self { width: DEFAULT_WIDTH, height: DEFAULT_HEIGHT }
    }
}

/// Turns a series into image bytes.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, coordinate: Coordinate, series: &HourlySeries) -> Result<Vec<u8>, WeatherError>;

    fn content_type(&self) -> &'static str {
        "image/png"
    }
}

#[derive(Debug, Clone)]
pub struct PngChartRenderer {
    width: u32,
    height: u32,
}

impl PngChartRenderer {
    pub fn new(config: &ChartConfig) -> Self {
        Self { width: config.width.max(200), height: config.height.max(150) }
    }
}

impl Default for PngChartRenderer {
    fn default() -> Self {
        Self::new(&ChartConfig::default())
    }
}

impl ChartRenderer for PngChartRenderer {
    fn render(&self, coordinate: Coordinate, series: &HourlySeries) -> Result<Vec<u8>, WeatherError> {
        let points: Vec<(NaiveDateTime, f64)> =
            series.points().into_iter().map(|(ts, v)| (ts.naive_utc(), v)).collect();
        if points.is_empty() {
            return Err(WeatherError::Render("series has no values to plot".into()));
        }

        let (x_start, x_end) = time_range(&points, series.interval)
            .ok_or_else(|| WeatherError::Render("series time range overflows".into()))?;
        let (y_start, y_end) = value_range(&points);
        let ticks = day_ticks(x_start, x_end);
        let tick_count = ticks.len();

        let mut pixels = vec![0u8; self.width as usize * self.height as usize * 3];
        {
            let root =
                BitMapBackend::with_buffer(&mut pixels, (self.width, self.height)).into_drawing_area();
            root.fill(&WHITE).map_err(render_error)?;

            let mut chart = ChartBuilder::on(&root)
                .caption(
                    format!("Hourly Temperature Over Time ({coordinate})"),
                    ("sans-serif", 24),
                )
                .margin(20)
                .x_label_area_size(90)
                .y_label_area_size(60)
                .build_cartesian_2d(
                    RangedDateTime::from(x_start..x_end).with_key_points(ticks),
                    y_start..y_end,
                )
                .map_err(render_error)?;

            chart
                .configure_mesh()
                .x_desc("Date")
                .y_desc("Temperature (°C)")
                .x_labels(tick_count)
                .x_label_formatter(&|dt: &NaiveDateTime| dt.format("%Y-%m-%d").to_string())
                .x_label_style(
                    ("sans-serif", 14).into_font().transform(FontTransform::Rotate90),
                )
                .light_line_style(BLACK.mix(0.1))
                .draw()
                .map_err(render_error)?;

            chart
                .draw_series(
                    LineSeries::new(points.iter().copied(), BLUE.stroke_width(2)).point_size(3),
                )
                .map_err(render_error)?
                .label("Hourly Temperature")
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()
                .map_err(render_error)?;

            root.present().map_err(render_error)?;
        }

        encode_png(self.width, self.height, pixels)
    }
}

/// X axis spans the samples; a single sample is widened by one interval.
fn time_range(
    points: &[(NaiveDateTime, f64)],
    interval: Duration,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let start = points.first()?.0;
    let end = points.last()?.0;
    if end > start {
        Some((start, end))
    } else {
        Some((start, start.checked_add_signed(interval.max(Duration::hours(1)))?))
    }
}

/// One tick per calendar day in range, so every date label appears once.
/// A range that never crosses midnight gets a single tick at its start.
fn day_ticks(start: NaiveDateTime, end: NaiveDateTime) -> Vec<NaiveDateTime> {
    let mut ticks: Vec<NaiveDateTime> = start
        .date()
        .iter_days()
        .map(|day| day.and_time(NaiveTime::MIN))
        .skip_while(|tick| *tick < start)
        .take_while(|tick| *tick <= end)
        .collect();
    if ticks.is_empty() {
        ticks.push(start);
    }
    ticks
}

fn value_range(points: &[(NaiveDateTime, f64)]) -> (f64, f64) {
    let (min, max) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), (_, v)| (min.min(*v), max.max(*v)));
    let padding = if (max - min).abs() > 1e-6 { (max - min) * 0.1 } else { 1.0 };
    (min - padding, max + padding)
}

fn encode_png(width: u32, height: u32, pixels: Vec<u8>) -> Result<Vec<u8>, WeatherError> {
    let image = RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| WeatherError::Render("pixel buffer does not match image size".into()))?;

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).map_err(render_error)?;
    Ok(png)
}

fn render_error(err: impl std::fmt::Display) -> WeatherError {
    WeatherError::Render(err.to_string())
}
