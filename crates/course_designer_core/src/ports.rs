//! crates/course_designer_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, keeping the
//! generation pipeline independent of specific providers and storage backends.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::SavedCourse;
use crate::state::TransitionError;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., HTTP, S3, files).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// Credentials or other required settings are missing.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The caller supplied malformed input.
    #[error("Invalid input: {0}")]
    Validation(String),
    /// A provider call failed or returned unusable content.
    #[error("Generation failed: {0}")]
    Generation(String),
    /// The requested image model does not exist or rejected the request shape.
    /// The image orchestrator moves on to the next model when it sees this.
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// A request for JSON output constrained by a schema.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    /// Short identifier for the schema, sent to providers that require one.
    pub schema_name: String,
    pub prompt: String,
    pub schema: Value,
}

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Sends the prompt and returns the provider's output parsed as JSON.
    async fn generate_json(&self, request: &StructuredRequest) -> PortResult<Value>;
}

/// One image-generation model. The orchestrator holds these in priority order.
#[async_trait]
pub trait ImageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Returns a URL (remote or `data:`) for an image matching the prompt.
    /// Must return `PortError::ModelUnavailable` when the model itself cannot
    /// serve the request, so the next model gets a chance.
    async fn attempt(&self, prompt: &str) -> PortResult<String>;
}

#[async_trait]
pub trait ImageStorageService: Send + Sync {
    /// Copies the image at `source_url` under `object_key` and returns its durable URL.
    async fn persist_image(&self, source_url: &str, object_key: &str) -> PortResult<String>;
}

#[async_trait]
pub trait SavedCourseStore: Send + Sync {
    /// All saved courses, newest first.
    async fn list(&self) -> PortResult<Vec<SavedCourse>>;

    /// Adds a course at the front of the list.
    async fn prepend(&self, course: SavedCourse) -> PortResult<()>;

    /// Replaces the course with the same id in place, or prepends it if absent.
    async fn upsert(&self, course: SavedCourse) -> PortResult<()>;

    /// Removes one course. Returns `NotFound` if no course has this id.
    async fn remove(&self, id: i64) -> PortResult<()>;

    async fn clear(&self) -> PortResult<()>;
}
