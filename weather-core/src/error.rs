//! Error type shared by the upstream client, the cache and the chart renderer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeatherError {
    /// Upstream answered with a non-success status.
    #[error("Open-Meteo request failed with status {status}: {reason}")]
    UpstreamStatus { status: u16, reason: String },

    #[error("Open-Meteo request timed out")]
    UpstreamTimeout,

    #[error("Failed to reach Open-Meteo: {0}")]
    UpstreamUnavailable(String),

    #[error("Malformed Open-Meteo response: {0}")]
    MalformedResponse(String),

    #[error("Chart rendering failed: {0}")]
    Render(String),
}

impl WeatherError {
    /// Whether upstream refused the request because of the caller's input.
    pub fn is_upstream_rejection(&self) -> bool {
        matches!(self, Self::UpstreamStatus { status, .. } if (400..500).contains(status))
    }
}

impl From<reqwest::Error> for WeatherError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::UpstreamTimeout;
        }
        if err.is_decode() {
            return Self::MalformedResponse(err.to_string());
        }
        Self::UpstreamUnavailable(err.to_string())
    }
}
