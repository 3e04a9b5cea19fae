//! HTTP mapping of gateway failures. Every error body is `{"detail": "..."}`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use weather_core::WeatherError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Latitude and Longitude are required")]
    MissingCoordinates,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Weather(#[from] WeatherError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCoordinates | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Weather(err) => match err {
                WeatherError::UpstreamStatus { status, .. } if err.is_upstream_rejection() => {
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
                }
                WeatherError::UpstreamStatus { .. }
                | WeatherError::UpstreamUnavailable(_)
                | WeatherError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
                WeatherError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
                WeatherError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.to_string();

        if status.is_server_error() {
            tracing::error!("{} -> {}", detail, status);
        } else {
            tracing::debug!("{} -> {}", detail, status);
        }

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
