pub mod config;
pub mod inflight;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod routes;
pub mod temp;

use anyhow::{Context, Result};
use config::AppConfig;
use enhance::ImageEditClient;
use maps::StaticMapClient;
use metrics::Metrics;
use pipeline::{Pipeline, Stages};
use property::PropertyClient;
use retry::RetryPolicy;
use routes::AppState;
use std::sync::Arc;
use std::time::Duration;
use temp::TempStore;

/// Wire the real stage clients from configuration and prepare the temp dir
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.concurrency.request_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let temp = TempStore::new(&config.temp_dir);
    temp.ensure_dir()
        .await
        .with_context(|| format!("Failed to create temp dir {}", config.temp_dir.display()))?;

    let stages = Stages {
        fetcher: Arc::new(StaticMapClient::new(
            config.endpoints.google_maps_base_url.clone(),
            config.credentials.google_maps_api_key.clone(),
            http.clone(),
        )),
        enhancer: Arc::new(ImageEditClient::new(
            config.endpoints.openai_base_url.clone(),
            config.credentials.openai_api_key.clone(),
            http.clone(),
        )),
        updater: Arc::new(PropertyClient::new(
            config.endpoints.property_api_base_url.clone(),
            config.credentials.property_api_token.clone(),
            http,
        )),
    };

    let metrics = Metrics::new();
    let pipeline = Pipeline::new(stages, temp, RetryPolicy::from(&config.retry), metrics.clone());

    Ok(AppState {
        pipeline: Arc::new(pipeline),
        metrics,
    })
}
