use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;

use crate::{
    config::UpstreamConfig,
    error::WeatherError,
    model::{Endpoint, HourlySeries, UpstreamRequest},
    retry::{RetryPolicy, with_retry},
};

use super::WeatherProvider;

const USER_AGENT: &str = concat!("weather-gateway/", env!("CARGO_PKG_VERSION"));
const DEFAULT_INTERVAL_SECS: i64 = 3600;

#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    http: Client,
    forecast_url: String,
    air_quality_url: String,
    archive_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl OpenMeteoProvider {
    pub fn from_config(upstream: &UpstreamConfig, retry: RetryPolicy) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(upstream.timeout_ms))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client for Open-Meteo")?;

        Ok(Self {
            http,
            forecast_url: upstream.forecast_url.clone(),
            air_quality_url: upstream.air_quality_url.clone(),
            archive_url: upstream.archive_url.clone(),
            api_key: upstream.api_key.clone(),
            retry,
        })
    }

    fn url_for(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Forecast => &self.forecast_url,
            Endpoint::AirQuality => &self.air_quality_url,
            Endpoint::Archive => &self.archive_url,
        }
    }

    fn build(&self, request: &UpstreamRequest) -> RequestBuilder {
        let builder = self.http.get(self.url_for(request.endpoint)).query(&request.params);
        match &self.api_key {
            Some(key) => builder.query(&[("apikey", key)]),
            None => builder,
        }
    }

    async fn read_body(response: Response, endpoint: Endpoint) -> Result<String, WeatherError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!("Open-Meteo {} answered {}", endpoint.as_str(), status);
            return Err(WeatherError::UpstreamStatus {
                status: status.as_u16(),
                reason: upstream_reason(&body),
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    async fn fetch_json(&self, request: &UpstreamRequest) -> Result<serde_json::Value, WeatherError> {
        tracing::debug!("forwarding {}", request.cache_key());

        let response = self.build(request).send().await?;
        let body = Self::read_body(response, request.endpoint).await?;

        serde_json::from_str(&body).map_err(|e| {
            WeatherError::MalformedResponse(format!("{e}: {}", truncate_body(&body)))
        })
    }

    async fn fetch_hourly(
        &self,
        request: &UpstreamRequest,
        variable: &str,
    ) -> Result<HourlySeries, WeatherError> {
        tracing::debug!("fetching hourly {} via {}", variable, request.cache_key());

        let response = with_retry(&self.retry, || self.build(request).send()).await?;
        let body = Self::read_body(response, request.endpoint).await?;

        parse_hourly(&body, variable)
    }
}

/// Open-Meteo errors look like `{"error": true, "reason": "..."}`.
#[derive(Debug, Deserialize)]
struct OmError {
    reason: String,
}

#[derive(Debug, Deserialize)]
struct OmHourlyResponse {
    hourly: OmHourly,
}

/// `time` plus one array per requested variable.
#[derive(Debug, Deserialize)]
struct OmHourly {
    time: Vec<i64>,
    #[serde(flatten)]
    variables: serde_json::Map<String, serde_json::Value>,
}

fn parse_hourly(body: &str, variable: &str) -> Result<HourlySeries, WeatherError> {
    let parsed: OmHourlyResponse = serde_json::from_str(body)
        .map_err(|e| WeatherError::MalformedResponse(format!("hourly block: {e}")))?;
    let OmHourly { time, mut variables } = parsed.hourly;

    let raw = variables.remove(variable).ok_or_else(|| {
        WeatherError::MalformedResponse(format!("hourly block has no '{variable}' values"))
    })?;
    let values: Vec<Option<f64>> = serde_json::from_value(raw)
        .map_err(|e| WeatherError::MalformedResponse(format!("'{variable}' values: {e}")))?;

    if values.len() != time.len() {
        return Err(WeatherError::MalformedResponse(format!(
            "{} timestamps but {} '{variable}' values",
            time.len(),
            values.len()
        )));
    }

    let first = *time
        .first()
        .ok_or_else(|| WeatherError::MalformedResponse("hourly block is empty".into()))?;
    let interval = match time.as_slice() {
        [a, b, ..] => b.checked_sub(*a).unwrap_or(0),
        _ => DEFAULT_INTERVAL_SECS,
    };
    if interval <= 0 {
        return Err(WeatherError::MalformedResponse(format!(
            "non-increasing hourly timestamps (interval {interval}s)"
        )));
    }
    if let Some(i) = time.windows(2).position(|w| w[1].checked_sub(w[0]) != Some(interval)) {
        return Err(WeatherError::MalformedResponse(format!(
            "hourly timestamps are not evenly spaced at index {}",
            i + 1
        )));
    }

    let interval = chrono::Duration::try_seconds(interval).ok_or_else(|| {
        WeatherError::MalformedResponse(format!("interval {interval}s out of range"))
    })?;
    let start = unix_to_utc(first)
        .ok_or_else(|| WeatherError::MalformedResponse(format!("timestamp {first} out of range")))?;

    Ok(HourlySeries {
        variable: variable.to_string(),
        start,
        interval,
        values,
    })
}

fn upstream_reason(body: &str) -> String {
    serde_json::from_str::<OmError>(body)
        .map(|e| e.reason)
        .unwrap_or_else(|_| truncate_body(body))
}

fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts, 0)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CHART_VARIABLE, Coordinate};
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn upstream(server: &MockServer) -> UpstreamConfig {
        UpstreamConfig {
            forecast_url: format!("{}/v1/forecast", server.uri()),
            air_quality_url: format!("{}/v1/air-quality", server.uri()),
            archive_url: format!("{}/v1/archive", server.uri()),
            ..UpstreamConfig::default()
        }
    }

    fn provider(server: &MockServer) -> OpenMeteoProvider {
        OpenMeteoProvider::from_config(&upstream(server), RetryPolicy::none()).expect("provider")
    }

    #[tokio::test]
    async fn fetch_json_relays_body_verbatim() {
        let server = MockServer::start().await;
        let body = json!({"latitude": 52.52, "current_weather": {"temperature": 13.4}});
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("latitude", "52.52"))
            .and(query_param("longitude", "13.41"))
            .and(query_param("current_weather", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let req = UpstreamRequest::current_weather(Coordinate::new(52.52, 13.41));
        let value = provider(&server).fetch_json(&req).await.expect("json");
        assert_eq!(value, body);
    }

    #[tokio::test]
    async fn air_quality_uses_its_own_endpoint_and_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/air-quality"))
            .and(query_param("apikey", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hourly": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let config = UpstreamConfig { api_key: Some("secret".into()), ..upstream(&server) };
        let provider = OpenMeteoProvider::from_config(&config, RetryPolicy::none()).unwrap();

        let req = UpstreamRequest::air_quality(Coordinate::new(1.0, 2.0));
        assert!(provider.fetch_json(&req).await.is_ok());
    }

    #[tokio::test]
    async fn dated_history_goes_to_archive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/archive"))
            .and(query_param("start_date", "2020-01-01"))
            .and(query_param("end_date", "2020-01-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hourly": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let req = UpstreamRequest::historical(Coordinate::new(52.52, 13.41), Some("2020-01-01"));
        assert_eq!(provider(&server).fetch_json(&req).await.unwrap(), json!({"hourly": {}}));
    }

    #[tokio::test]
    async fn upstream_reason_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                json!({"error": true, "reason": "Latitude must be in range of -90 to 90°."}),
            ))
            .mount(&server)
            .await;

        let req = UpstreamRequest::current_weather(Coordinate::new(123.0, 0.0));
        let err = provider(&server).fetch_json(&req).await.unwrap_err();
        match err {
            WeatherError::UpstreamStatus { status, reason } => {
                assert_eq!(status, 400);
                assert!(reason.starts_with("Latitude must be in range"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_success_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let req = UpstreamRequest::current_weather(Coordinate::new(1.0, 2.0));
        let err = provider(&server).fetch_json(&req).await.unwrap_err();
        assert!(matches!(err, WeatherError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let config = UpstreamConfig { timeout_ms: 100, ..upstream(&server) };
        let provider = OpenMeteoProvider::from_config(&config, RetryPolicy::none()).unwrap();

        let req = UpstreamRequest::current_weather(Coordinate::new(1.0, 2.0));
        let err = provider.fetch_json(&req).await.unwrap_err();
        assert!(matches!(err, WeatherError::UpstreamTimeout));
    }

    #[tokio::test]
    async fn fetch_hourly_builds_series() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("hourly", "temperature_2m"))
            .and(query_param("timeformat", "unixtime"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hourly_units": {"time": "unixtime", "temperature_2m": "°C"},
                "hourly": {
                    "time": [1714521600, 1714525200, 1714528800],
                    "temperature_2m": [9.5, null, 11.25]
                }
            })))
            .mount(&server)
            .await;

        let req = UpstreamRequest::hourly_series(Coordinate::new(1.0, 2.0), CHART_VARIABLE);
        let series = provider(&server).fetch_hourly(&req, CHART_VARIABLE).await.expect("series");

        assert_eq!(series.start, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(series.interval, chrono::Duration::hours(1));
        assert_eq!(series.values, vec![Some(9.5), None, Some(11.25)]);
    }

    #[tokio::test]
    async fn fetch_hourly_retries_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hourly": {"time": [0], "temperature_2m": [1.0]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let retry = RetryPolicy { max_retries: 2, backoff_factor: 0.001, max_delay_ms: 10 };
        let req = UpstreamRequest::hourly_series(Coordinate::new(1.0, 2.0), CHART_VARIABLE);
        let series = OpenMeteoProvider::from_config(&upstream(&server), retry)
            .unwrap()
            .fetch_hourly(&req, CHART_VARIABLE)
            .await
            .expect("series");
        assert_eq!(series.len(), 1);
        assert_eq!(series.interval, chrono::Duration::seconds(DEFAULT_INTERVAL_SECS));
    }

    #[test]
    fn parse_hourly_rejects_mismatched_lengths() {
        let body = r#"{"hourly": {"time": [0, 3600], "temperature_2m": [1.0]}}"#;
        assert!(matches!(
            parse_hourly(body, "temperature_2m"),
            Err(WeatherError::MalformedResponse(_))
        ));
    }

    #[test]
    fn parse_hourly_rejects_uneven_spacing() {
        let body = r#"{"hourly": {"time": [0, 3600, 9000], "temperature_2m": [1.0, 2.0, 3.0]}}"#;
        let err = parse_hourly(body, "temperature_2m").unwrap_err();
        assert!(matches!(err, WeatherError::MalformedResponse(_)));
        assert!(err.to_string().contains("index 2"));

        let body = r#"{"hourly": {"time": [0, 3600, 7200], "temperature_2m": [1.0, 2.0, 3.0]}}"#;
        assert_eq!(parse_hourly(body, "temperature_2m").unwrap().len(), 3);
    }

    #[test]
    fn parse_hourly_rejects_missing_variable() {
        let body = r#"{"hourly": {"time": [0], "precipitation": [0.0]}}"#;
        let err = parse_hourly(body, "temperature_2m").unwrap_err();
        assert!(err.to_string().contains("temperature_2m"));
    }

    #[test]
    fn parse_hourly_rejects_empty_block() {
        let body = r#"{"hourly": {"time": [], "temperature_2m": []}}"#;
        assert!(parse_hourly(body, "temperature_2m").is_err());
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "é".repeat(300);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
