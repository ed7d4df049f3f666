use crate::inflight::InFlight;
use crate::metrics::{Metrics, Stage, TimedOperation};
use crate::retry::RetryPolicy;
use crate::temp::TempStore;
use async_trait::async_trait;
use enhance::{EnhanceError, ImageEditClient};
use maps::{Coordinates, MapsError, StaticMapClient};
use property::{PropertyClient, PropertyError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Download the satellite tile for `center` into `dest`
    async fn fetch(&self, center: Coordinates, dest: &Path) -> Result<PathBuf, MapsError>;
}

#[async_trait]
pub trait ImageEnhancer: Send + Sync {
    /// Returns the URL of the enhanced image
    async fn enhance(&self, image: &Path) -> Result<String, EnhanceError>;
}

#[async_trait]
pub trait PropertyUpdater: Send + Sync {
    async fn update(&self, property_id: &str, enhanced_image_url: &str) -> Result<(), PropertyError>;
}

#[async_trait]
impl ImageFetcher for StaticMapClient {
    async fn fetch(&self, center: Coordinates, dest: &Path) -> Result<PathBuf, MapsError> {
        self.download(center, dest).await
    }
}

#[async_trait]
impl ImageEnhancer for ImageEditClient {
    async fn enhance(&self, image: &Path) -> Result<String, EnhanceError> {
        ImageEditClient::enhance(self, image).await
    }
}

#[async_trait]
impl PropertyUpdater for PropertyClient {
    async fn update(&self, property_id: &str, enhanced_image_url: &str) -> Result<(), PropertyError> {
        self.set_drone_image(property_id, enhanced_image_url).await
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Google Maps API error: {0}")]
    Maps(#[from] MapsError),

    #[error("OpenAI API error: {0}")]
    Enhance(#[from] EnhanceError),

    #[error("Property API error: {0}")]
    Property(#[from] PropertyError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Maps(_) => Stage::MapsFetch,
            PipelineError::Enhance(_) => Stage::Enhance,
            PipelineError::Property(_) => Stage::PropertyUpdate,
        }
    }
}

/// A validated request to re-image one property
#[derive(Debug, Clone)]
pub struct PropertyJob {
    pub property_id: String,
    pub center: Coordinates,
    pub address: Option<String>,
}

pub struct Stages {
    pub fetcher: Arc<dyn ImageFetcher>,
    pub enhancer: Arc<dyn ImageEnhancer>,
    pub updater: Arc<dyn PropertyUpdater>,
}

pub struct Pipeline {
    stages: Stages,
    temp: TempStore,
    retry: RetryPolicy,
    in_flight: InFlight,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(stages: Stages, temp: TempStore, retry: RetryPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            stages,
            temp,
            retry,
            in_flight: InFlight::new(),
            metrics,
        }
    }

    pub fn temp(&self) -> &TempStore {
        &self.temp
    }

    /// Fetch, enhance and store the property image; returns the enhanced URL.
    ///
    /// Requests for the same property wait for each other. The temp image is
    /// removed before this returns, whichever stage failed.
    pub async fn process(&self, job: &PropertyJob) -> Result<String, PipelineError> {
        let _slot = self
            .in_flight
            .acquire(&TempStore::file_stem_for(&job.property_id))
            .await;

        let image = self.temp.guard(&job.property_id);
        let result = self.run_stages(job, image.path()).await;
        image.release().await;

        result
    }

    async fn run_stages(&self, job: &PropertyJob, image_path: &Path) -> Result<String, PipelineError> {
        let fetcher = &self.stages.fetcher;
        let enhancer = &self.stages.enhancer;
        let updater = &self.stages.updater;
        let center = job.center;
        let property_id = job.property_id.as_str();

        info!(lat = center.lat, lng = center.lng, address = ?job.address, "Downloading satellite tile");
        let timer = TimedOperation::start();
        let fetched = self
            .retry
            .retry("maps_fetch", move || fetcher.fetch(center, image_path))
            .await;
        self.metrics.record_stage(Stage::MapsFetch, timer.elapsed(), fetched.is_ok());
        let downloaded = fetched?;
        let downloaded = downloaded.as_path();

        info!("Enhancing satellite tile");
        let timer = TimedOperation::start();
        let enhanced = self
            .retry
            .retry("enhance", move || enhancer.enhance(downloaded))
            .await;
        self.metrics.record_stage(Stage::Enhance, timer.elapsed(), enhanced.is_ok());
        let enhanced_url = enhanced?;
        let url = enhanced_url.as_str();

        info!(enhanced_image_url = %enhanced_url, "Updating property record");
        let timer = TimedOperation::start();
        let updated = self
            .retry
            .retry("property_update", move || updater.update(property_id, url))
            .await;
        self.metrics.record_stage(Stage::PropertyUpdate, timer.elapsed(), updated.is_ok());
        updated?;

        Ok(enhanced_url)
    }
}
