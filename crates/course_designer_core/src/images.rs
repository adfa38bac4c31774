//! crates/course_designer_core/src/images.rs
//!
//! The image-generation orchestrator. Every prompt is tried against an ordered
//! list of image models; prompts are issued in capped concurrent batches with a
//! pause between batches, and the whole run is bounded by a timeout. A failed
//! prompt becomes an empty URL and never fails the run.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::ImageKey;
use crate::ports::{ImageModel, ImageStorageService, PortError, PortResult};

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const MAX_BATCH_SIZE: usize = 10;

/// Tuning for the image stage.
#[derive(Debug, Clone)]
pub struct ImageSettings {
    /// When false, no image provider is ever called and every URL stays empty.
    pub enabled: bool,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub timeout: Duration,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: Duration::from_millis(1200),
            timeout: Duration::from_secs(30),
        }
    }
}

pub fn clamp_batch_size(requested: usize) -> usize {
    requested.clamp(1, MAX_BATCH_SIZE)
}

/// One image to generate, and where to keep it if object storage is configured.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub destination: Option<ImageKey>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            destination: None,
        }
    }

    pub fn with_destination(prompt: impl Into<String>, destination: ImageKey) -> Self {
        Self {
            prompt: prompt.into(),
            destination: Some(destination),
        }
    }
}

/// Result of a batched run. `urls` is parallel to the input; empty means failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBatchReport {
    pub urls: Vec<String>,
    pub batches_issued: usize,
    pub generated: usize,
}

pub struct ImageOrchestrator {
    models: Vec<Arc<dyn ImageModel>>,
    storage: Option<Arc<dyn ImageStorageService>>,
    settings: ImageSettings,
}

impl ImageOrchestrator {
    pub fn new(
        models: Vec<Arc<dyn ImageModel>>,
        storage: Option<Arc<dyn ImageStorageService>>,
        settings: ImageSettings,
    ) -> Self {
        Self {
            models,
            storage,
            settings,
        }
    }

    pub fn settings(&self) -> &ImageSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Generates a single image, trying each model in priority order.
    pub async fn generate_one(
        &self,
        prompt: &str,
        destination: Option<&ImageKey>,
    ) -> PortResult<String> {
        if prompt.trim().is_empty() {
            return Err(PortError::Validation("image prompt is empty".to_string()));
        }
        if !self.settings.enabled {
            return Err(PortError::Configuration(
                "image generation is disabled".to_string(),
            ));
        }
        let url = self.attempt_models(prompt).await?;
        Ok(self.persist(url, destination).await)
    }

    /// Generates every request using the configured batch size.
    pub async fn generate_all(&self, requests: &[ImageRequest]) -> ImageBatchReport {
        self.generate_batched(requests, self.settings.batch_size)
            .await
    }

    /// Generates every request in batches of `batch_size` (clamped to 1..=10).
    pub async fn generate_batched(
        &self,
        requests: &[ImageRequest],
        batch_size: usize,
    ) -> ImageBatchReport {
        let batch_size = clamp_batch_size(batch_size);
        let results = Mutex::new(vec![String::new(); requests.len()]);
        let batches = AtomicUsize::new(0);

        if !self.settings.enabled {
            debug!("Image generation disabled; skipping {} prompts", requests.len());
            return ImageBatchReport {
                urls: results.into_inner(),
                batches_issued: 0,
                generated: 0,
            };
        }

        let work = async {
            for (index, chunk) in requests.chunks(batch_size).enumerate() {
                if index > 0 {
                    tokio::time::sleep(self.settings.batch_delay).await;
                }
                batches.fetch_add(1, Ordering::SeqCst);
                let offset = index * batch_size;
                info!(
                    batch = index + 1,
                    size = chunk.len(),
                    "Generating image batch"
                );

                let tasks = chunk.iter().enumerate().map(|(i, request)| {
                    let results = &results;
                    async move {
                        let url = self.resolve(request).await;
                        results.lock().await[offset + i] = url;
                    }
                });
                join_all(tasks).await;
            }
        };

        if tokio::time::timeout(self.settings.timeout, work).await.is_err() {
            warn!(
                timeout_ms = self.settings.timeout.as_millis() as u64,
                "Image generation timed out; unresolved prompts are left empty"
            );
        }

        let urls = results.into_inner();
        let generated = urls.iter().filter(|u| !u.is_empty()).count();
        info!(
            requested = urls.len(),
            generated,
            "Image generation finished"
        );
        ImageBatchReport {
            urls,
            batches_issued: batches.load(Ordering::SeqCst),
            generated,
        }
    }

    async fn resolve(&self, request: &ImageRequest) -> String {
        if request.prompt.trim().is_empty() {
            return String::new();
        }
        match self
            .generate_one(&request.prompt, request.destination.as_ref())
            .await
        {
            Ok(url) => url,
            Err(e) => {
                warn!("Image generation failed for prompt: {}", e);
                String::new()
            }
        }
    }

    async fn attempt_models(&self, prompt: &str) -> PortResult<String> {
        if self.models.is_empty() {
            return Err(PortError::Configuration(
                "no image models are configured".to_string(),
            ));
        }

        let mut skipped = Vec::new();
        for model in &self.models {
            match model.attempt(prompt).await {
                Ok(url) if !url.is_empty() => {
                    debug!(model = model.name(), "Image generated");
                    return Ok(url);
                }
                Ok(_) => {
                    warn!(model = model.name(), "Model returned no image; trying next");
                    skipped.push(format!("{}: empty response", model.name()));
                }
                Err(PortError::ModelUnavailable(reason)) => {
                    warn!(model = model.name(), %reason, "Model unavailable; trying next");
                    skipped.push(format!("{}: {}", model.name(), reason));
                }
                Err(e) => return Err(e),
            }
        }

        Err(PortError::Generation(format!(
            "all image models failed ({})",
            skipped.join("; ")
        )))
    }

    async fn persist(&self, url: String, destination: Option<&ImageKey>) -> String {
        let (Some(storage), Some(key)) = (&self.storage, destination) else {
            return url;
        };
        match storage.persist_image(&url, &key.object_key()).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Upload failed, keeping provider URL: {}", e);
                url
            }
        }
    }
}
