//! Core library for the `weather-gateway` service.
//!
//! This crate defines:
//! - Configuration handling
//! - The Open-Meteo client behind the `WeatherProvider` trait, with retries
//! - Upstream request builders and the hourly series model
//! - A TTL cache for hourly series and the PNG chart renderer
//!
//! It is used by `weather-gateway`, but can also be reused by other binaries or services.

pub mod cache;
pub mod chart;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod retry;

pub use cache::{CacheConfig, SeriesCache};
pub use chart::{ChartConfig, ChartRenderer, PngChartRenderer};
pub use config::{Config, ServerConfig, UpstreamConfig};
pub use error::WeatherError;
pub use model::{Coordinate, Endpoint, HourlySeries, UpstreamRequest};
pub use provider::{WeatherProvider, openmeteo::OpenMeteoProvider, provider_from_config};
pub use retry::RetryPolicy;
