//! services/api/src/adapters/s3.rs
//!
//! This module contains the object storage adapter, the concrete implementation of
//! the `ImageStorageService` port. Generated images are fetched from the provider's
//! temporary URL and copied into an S3 bucket so that saved courses outlive them.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{config::Credentials, primitives::ByteStream, Client};
use bytes::Bytes;
use course_designer_core::ports::{ImageStorageService, PortError, PortResult};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::config::StorageConfig;

const DEFAULT_CONTENT_TYPE: &str = "image/png";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct S3ImageStorage {
    client: Client,
    http: reqwest::Client,
    bucket: String,
    region: String,
}

impl S3ImageStorage {
    /// Builds an S3 client from the explicit credentials in `StorageConfig`.
    pub async fn new(config: &StorageConfig, http: reqwest::Client) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "environment",
        );
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        Self {
            client: Client::new(&sdk_config),
            http,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
        }
    }

    /// The public address of an object in this bucket.
    pub fn public_url(&self, object_key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, object_key
        )
    }

    async fn download(&self, source_url: &str) -> PortResult<(Bytes, String)> {
        let response = self
            .http
            .get(source_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PortError::Storage(format!("could not fetch generated image: {}", e)))?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let body = response
            .bytes()
            .await
            .map_err(|e| PortError::Storage(format!("could not read generated image: {}", e)))?;
        Ok((body, content_type))
    }
}

//=========================================================================================
// `ImageStorageService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ImageStorageService for S3ImageStorage {
    async fn persist_image(&self, source_url: &str, object_key: &str) -> PortResult<String> {
        if source_url.starts_with("data:") {
            return Err(PortError::Storage(
                "inline image data is not copied to storage".to_string(),
            ));
        }

        let (body, content_type) = self.download(source_url).await?;
        debug!(key = %object_key, bytes = body.len(), "Uploading image");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| PortError::Storage(format!("upload of {} failed: {}", object_key, e)))?;

        Ok(self.public_url(object_key))
    }
}
