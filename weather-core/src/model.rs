use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Hourly variables requested for the air-quality route.
pub const AIR_QUALITY_VARIABLES: &str = "pm10,pm2_5,carbon_monoxide,nitrogen_dioxide";
/// Daily variables requested for the daily-summary route.
pub const DAILY_SUMMARY_VARIABLES: &str = "temperature_2m_max,temperature_2m_min,sunrise,sunset";
/// Hourly variables requested when comparing two locations.
pub const COMPARISON_VARIABLES: &str = "temperature_2m,precipitation";
/// Variable plotted by the chart route.
pub const CHART_VARIABLE: &str = "temperature_2m";

/// A point on the globe. Ranges are not checked here; upstream validates them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lat: {}, Lon: {}", self.latitude, self.longitude)
    }
}

/// Which Open-Meteo service a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Forecast,
    AirQuality,
    Archive,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Forecast => "forecast",
            Endpoint::AirQuality => "air-quality",
            Endpoint::Archive => "archive",
        }
    }
}

/// Query forwarded to the upstream API, one per gateway route.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub endpoint: Endpoint,
    pub params: Vec<(&'static str, String)>,
}

impl UpstreamRequest {
    fn at(endpoint: Endpoint, coordinate: Coordinate) -> Self {
        Self {
            endpoint,
            params: vec![
                ("latitude", coordinate.latitude.to_string()),
                ("longitude", coordinate.longitude.to_string()),
            ],
        }
    }

    fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.params.push((key, value.into()));
        self
    }

    pub fn current_weather(coordinate: Coordinate) -> Self {
        Self::at(Endpoint::Forecast, coordinate).with("current_weather", "true")
    }

    pub fn air_quality(coordinate: Coordinate) -> Self {
        Self::at(Endpoint::AirQuality, coordinate).with("hourly", AIR_QUALITY_VARIABLES)
    }

    /// Open-Meteo has no alert feed; this returns the current conditions.
    pub fn weather_alerts(coordinate: Coordinate) -> Self {
        Self::current_weather(coordinate)
    }

    /// Without a date this asks the forecast API for the previous day. With one,
    /// the archive API for that day's hourly temperature and precipitation.
    pub fn historical(coordinate: Coordinate, date: Option<&str>) -> Self {
        match date {
            Some(date) => Self::at(Endpoint::Archive, coordinate)
                .with("hourly", COMPARISON_VARIABLES)
                .with("start_date", date)
                .with("end_date", date),
            None => Self::at(Endpoint::Forecast, coordinate).with("past_days", "1"),
        }
    }

    pub fn daily_summary(coordinate: Coordinate, start_date: &str, end_date: &str) -> Self {
        Self::at(Endpoint::Forecast, coordinate)
            .with("daily", DAILY_SUMMARY_VARIABLES)
            .with("start_date", start_date)
            .with("end_date", end_date)
            .with("timezone", "auto")
    }

    pub fn comparison(coordinate: Coordinate, date: &str) -> Self {
        Self::at(Endpoint::Forecast, coordinate)
            .with("hourly", COMPARISON_VARIABLES)
            .with("start_date", date)
            .with("end_date", date)
    }

    /// Hourly series of one variable with unix timestamps, as the chart needs.
    pub fn hourly_series(coordinate: Coordinate, variable: &str) -> Self {
        Self::at(Endpoint::Forecast, coordinate)
            .with("hourly", variable)
            .with("timeformat", "unixtime")
    }

    /// Stable key covering the endpoint and every forwarded parameter.
    pub fn cache_key(&self) -> String {
        let query = self
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.endpoint.as_str(), query)
    }
}

/// Fixed-interval samples of one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlySeries {
    pub variable: String,
    pub start: DateTime<Utc>,
    pub interval: Duration,
    pub values: Vec<Option<f64>>,
}

impl HourlySeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `None` when the offset does not fit in a timestamp.
    pub fn timestamp(&self, index: usize) -> Option<DateTime<Utc>> {
        let offset = i64::try_from(index).ok()?.checked_mul(self.interval.num_seconds())?;
        self.start.checked_add_signed(Duration::try_seconds(offset)?)
    }

    /// `(timestamp, value)` for every sample that has a value.
    pub fn points(&self) -> Vec<(DateTime<Utc>, f64)> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| Some((self.timestamp(i)?, (*v)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn param<'a>(req: &'a UpstreamRequest, key: &str) -> Option<&'a str> {
        req.params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn current_weather_forwards_flag() {
        let req = UpstreamRequest::current_weather(Coordinate::new(52.52, 13.41));
        assert_eq!(req.endpoint, Endpoint::Forecast);
        assert_eq!(param(&req, "latitude"), Some("52.52"));
        assert_eq!(param(&req, "longitude"), Some("13.41"));
        assert_eq!(param(&req, "current_weather"), Some("true"));
    }

    #[test]
    fn air_quality_goes_to_air_quality_endpoint() {
        let req = UpstreamRequest::air_quality(Coordinate::new(1.0, 2.0));
        assert_eq!(req.endpoint, Endpoint::AirQuality);
        assert_eq!(param(&req, "hourly"), Some(AIR_QUALITY_VARIABLES));
    }

    #[test]
    fn historical_without_date_asks_for_past_day() {
        let req = UpstreamRequest::historical(Coordinate::new(1.0, 2.0), None);
        assert_eq!(param(&req, "past_days"), Some("1"));
        assert_eq!(param(&req, "start_date"), None);

        let req = UpstreamRequest::historical(Coordinate::new(1.0, 2.0), Some("2020-01-01"));
        assert_eq!(req.endpoint, Endpoint::Archive);
        assert_eq!(param(&req, "past_days"), None);
        assert_eq!(param(&req, "hourly"), Some(COMPARISON_VARIABLES));
        assert_eq!(param(&req, "start_date"), Some("2020-01-01"));
        assert_eq!(param(&req, "end_date"), Some("2020-01-01"));
    }

    #[test]
    fn daily_summary_passes_range_through() {
        let req =
            UpstreamRequest::daily_summary(Coordinate::new(1.0, 2.0), "2024-01-01", "not-a-date");
        assert_eq!(param(&req, "daily"), Some(DAILY_SUMMARY_VARIABLES));
        assert_eq!(param(&req, "start_date"), Some("2024-01-01"));
        assert_eq!(param(&req, "end_date"), Some("not-a-date"));
        assert_eq!(param(&req, "timezone"), Some("auto"));
    }

    #[test]
    fn cache_key_distinguishes_coordinates_and_params() {
        let a = UpstreamRequest::hourly_series(Coordinate::new(1.0, 2.0), "temperature_2m");
        let b = UpstreamRequest::hourly_series(Coordinate::new(1.0, 2.5), "temperature_2m");
        let c = UpstreamRequest::hourly_series(Coordinate::new(1.0, 2.0), "precipitation");

        assert_eq!(a.cache_key(), a.clone().cache_key());
        assert_ne!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
        assert!(a.cache_key().starts_with("forecast?latitude=1&longitude=2"));
    }

    #[test]
    fn series_timestamps_step_by_interval() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let series = HourlySeries {
            variable: CHART_VARIABLE.into(),
            start,
            interval: Duration::hours(1),
            values: vec![Some(10.0), None, Some(12.5), Some(11.0)],
        };

        assert_eq!(series.len(), 4);
        assert_eq!(series.timestamp(4), Some(start + Duration::hours(4)));

        let points = series.points();
        assert_eq!(
            points,
            vec![
                (start, 10.0),
                (start + Duration::hours(2), 12.5),
                (start + Duration::hours(3), 11.0),
            ]
        );
    }

    #[test]
    fn out_of_range_timestamps_are_skipped() {
        let series = HourlySeries {
            variable: CHART_VARIABLE.into(),
            start: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            interval: Duration::seconds(i64::MAX / 1000),
            values: vec![Some(1.0), Some(2.0), Some(3.0)],
        };

        assert_eq!(series.timestamp(2), None);
        assert_eq!(series.points(), vec![(series.start, 1.0)]);
    }
}
