use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use weather_core::{
    ChartRenderer, Config, HourlySeries, PngChartRenderer, SeriesCache, WeatherProvider,
    provider_from_config,
};

use crate::routes;

/// Shared by every request. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn WeatherProvider>,
    pub series_cache: Arc<SeriesCache<HourlySeries>>,
    pub renderer: Arc<dyn ChartRenderer>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_renderer(config, Arc::new(PngChartRenderer::new(&config.chart)))
    }

    pub fn with_renderer(config: &Config, renderer: Arc<dyn ChartRenderer>) -> Result<Self> {
        Ok(Self {
            provider: Arc::from(provider_from_config(config)?),
            series_cache: Arc::new(SeriesCache::new(&config.cache)),
            renderer,
        })
    }
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(routes::home))
        .route("/current-weather", get(routes::current_weather))
        .route("/air-quality", get(routes::air_quality))
        .route("/weather-alerts", get(routes::weather_alerts))
        .route("/historical-weather", get(routes::historical_weather))
        .route("/daily-summary", get(routes::daily_summary))
        .route("/compare-weather", get(routes::compare_weather))
        .route("/weather", post(routes::weather_chart))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Only the configured origins; methods and headers are mirrored from the
/// preflight, which a credentialed CORS response requires instead of `*`.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("Invalid allowed origin in config: {origin:?}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

pub async fn serve(config: Config) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let app = router(state, cors_layer(&config.server.allowed_origins)?);

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;

    tracing::info!(
        "weather gateway listening on {} (upstream {})",
        config.server.bind,
        config.upstream.forecast_url
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("weather gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
