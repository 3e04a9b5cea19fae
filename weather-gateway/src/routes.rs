//! Request handlers. Each GET route forwards to Open-Meteo and relays the JSON
//! untouched; `POST /weather` renders an hourly temperature chart.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use weather_core::{Coordinate, UpstreamRequest, WeatherError, model::CHART_VARIABLE};

use crate::{error::ApiError, server::AppState};

type QueryResult<T> = Result<Query<T>, QueryRejection>;

#[derive(Debug, Deserialize)]
pub struct CoordinateQuery {
    pub latitude: f64,
    pub longitude: f64,
}

impl CoordinateQuery {
    fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoricalQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DailySummaryQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    pub lat1: f64,
    pub lon1: f64,
    pub lat2: f64,
    pub lon2: f64,
    pub date: String,
}

/// Body of `POST /weather`. Both fields are checked by hand so that a missing
/// one gets the dedicated error.
#[derive(Debug, Deserialize)]
pub struct ChartRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub async fn home() -> Json<Value> {
    Json(json!({ "message": "Hello, World!" }))
}

pub async fn current_weather(
    State(state): State<AppState>,
    query: QueryResult<CoordinateQuery>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    forward(&state, UpstreamRequest::current_weather(query.coordinate())).await
}

pub async fn air_quality(
    State(state): State<AppState>,
    query: QueryResult<CoordinateQuery>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    forward(&state, UpstreamRequest::air_quality(query.coordinate())).await
}

/// Open-Meteo publishes no alerts; this relays current conditions.
pub async fn weather_alerts(
    State(state): State<AppState>,
    query: QueryResult<CoordinateQuery>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    forward(&state, UpstreamRequest::weather_alerts(query.coordinate())).await
}

/// A `date` is served from the archive API; without one, the past day from
/// the forecast API.
pub async fn historical_weather(
    State(state): State<AppState>,
    query: QueryResult<HistoricalQuery>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let coordinate = Coordinate::new(query.latitude, query.longitude);
    forward(&state, UpstreamRequest::historical(coordinate, query.date.as_deref())).await
}

pub async fn daily_summary(
    State(state): State<AppState>,
    query: QueryResult<DailySummaryQuery>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let coordinate = Coordinate::new(query.latitude, query.longitude);
    let request = UpstreamRequest::daily_summary(coordinate, &query.start_date, &query.end_date);
    forward(&state, request).await
}

/// Both locations are fetched concurrently; either failure fails the request.
pub async fn compare_weather(
    State(state): State<AppState>,
    query: QueryResult<CompareQuery>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let first = UpstreamRequest::comparison(Coordinate::new(query.lat1, query.lon1), &query.date);
    let second = UpstreamRequest::comparison(Coordinate::new(query.lat2, query.lon2), &query.date);

    let (location1, location2) =
        tokio::try_join!(state.provider.fetch_json(&first), state.provider.fetch_json(&second))?;

    Ok(Json(json!({ "location1": location1, "location2": location2 })))
}

pub async fn weather_chart(
    State(state): State<AppState>,
    payload: Result<Json<ChartRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    let (Some(latitude), Some(longitude)) = (body.latitude, body.longitude) else {
        return Err(ApiError::MissingCoordinates);
    };
    let coordinate = Coordinate::new(latitude, longitude);

    let request = UpstreamRequest::hourly_series(coordinate, CHART_VARIABLE);
    let series = state
        .series_cache
        .get_or_try_fetch(request.cache_key(), || {
            state.provider.fetch_hourly(&request, CHART_VARIABLE)
        })
        .await?;

    let renderer = Arc::clone(&state.renderer);
    let content_type = renderer.content_type();
    let image = tokio::task::spawn_blocking(move || renderer.render(coordinate, &series))
        .await
        .map_err(|e| WeatherError::Render(e.to_string()))??;

    tracing::debug!("rendered {} byte chart for {}", image.len(), coordinate);
    Ok(([(header::CONTENT_TYPE, content_type)], image).into_response())
}

async fn forward(state: &AppState, request: UpstreamRequest) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.provider.fetch_json(&request).await?))
}
