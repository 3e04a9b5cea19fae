use crate::{
    HourlySeries, UpstreamRequest, WeatherError, config::Config,
    provider::openmeteo::OpenMeteoProvider,
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openmeteo;

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Forward `request` and return the upstream JSON untouched.
    async fn fetch_json(&self, request: &UpstreamRequest) -> Result<serde_json::Value, WeatherError>;

    /// Fetch one hourly variable as a typed series.
    async fn fetch_hourly(
        &self,
        request: &UpstreamRequest,
        variable: &str,
    ) -> Result<HourlySeries, WeatherError>;
}

/// Construct the Open-Meteo provider described by `config`.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let provider = OpenMeteoProvider::from_config(&config.upstream, config.retry.clone())?;
    Ok(Box::new(provider))
}
