//! services/api/src/adapters/image_gen.rs
//!
//! This module contains the adapter for OpenAI-compatible image generation.
//! Each instance wraps one model name and implements the `ImageModel` port; the
//! orchestrator in the `core` crate tries them in order.

use async_trait::async_trait;
use course_designer_core::ports::{ImageModel, PortError, PortResult};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

const IMAGE_SIZE: &str = "1024x1024";

#[derive(Serialize)]
struct ImageGenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a str>,
}

#[derive(Deserialize)]
struct ImageGenerationResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    code: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// One image model reached over the `/images/generations` endpoint.
#[derive(Clone)]
pub struct OpenAiImageModel {
    http: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiImageModel {
    pub fn new(http: Client, api_base: &str, api_key: &str, model: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// `gpt-image-*` models always answer with base64 and reject `response_format`.
    fn response_format(&self) -> Option<&'static str> {
        if self.model.starts_with("gpt-image") {
            None
        } else {
            Some("url")
        }
    }
}

//=========================================================================================
// `ImageModel` Trait Implementation
//=========================================================================================

#[async_trait]
impl ImageModel for OpenAiImageModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn attempt(&self, prompt: &str) -> PortResult<String> {
        let body = ImageGenerationRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: IMAGE_SIZE,
            response_format: self.response_format(),
        };

        let response = self
            .http
            .post(format!("{}/images/generations", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Generation(format!("image request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorEnvelope>(&text).ok().map(|e| e.error);
            return Err(classify_failure(&self.model, status, detail));
        }

        let parsed: ImageGenerationResponse = response
            .json()
            .await
            .map_err(|e| PortError::Generation(format!("unreadable image response: {}", e)))?;

        let image = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| PortError::Generation("image response contained no data".to_string()))?;

        debug!(model = %self.model, "Image provider answered");
        match (image.url, image.b64_json) {
            (Some(url), _) if !url.is_empty() => Ok(url),
            (_, Some(b64)) if !b64.is_empty() => Ok(format!("data:image/png;base64,{}", b64)),
            _ => Err(PortError::Generation("image response had no url or data".to_string())),
        }
    }
}

/// Decides from the status and error code whether the next model should be tried.
fn classify_failure(model: &str, status: StatusCode, detail: Option<ErrorBody>) -> PortError {
    let code = detail.as_ref().and_then(|d| d.code.as_deref());
    let message = detail
        .as_ref()
        .map(|d| d.message.clone())
        .unwrap_or_else(|| status.to_string());

    if code == Some("model_not_found")
        || status == StatusCode::NOT_FOUND
        || status == StatusCode::BAD_REQUEST
    {
        return PortError::ModelUnavailable(format!("{}: {}", model, message));
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PortError::Configuration(format!("image provider rejected credentials: {}", message))
        }
        _ => PortError::Generation(format!("{} failed with {}: {}", model, status, message)),
    }
}
