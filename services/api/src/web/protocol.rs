//! services/api/src/web/protocol.rs
//!
//! Request and response bodies for the REST API. Field names are camelCase on
//! the wire. Core domain types are documented as plain objects.

use course_designer_core::domain::{ContentDepth, Course, OutlineModule, SavedCourse};
use course_designer_core::state::{SessionState, ViewMode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

fn default_num_modules() -> usize {
    3
}

//=========================================================================================
// Generation
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOutlineRequest {
    /// The course topic.
    pub prompt: String,
    /// Between 1 and 3.
    #[serde(default = "default_num_modules")]
    pub num_modules: usize,
    #[serde(default)]
    #[schema(value_type = String, example = "Low")]
    pub depth: ContentDepth,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OutlineResponse {
    #[schema(value_type = Vec<Object>)]
    pub modules: Vec<OutlineModule>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCourseRequest {
    pub prompt: String,
    #[schema(value_type = Vec<Object>)]
    pub outline: Vec<OutlineModule>,
    #[serde(default)]
    #[schema(value_type = String, example = "Low")]
    pub depth: ContentDepth,
}

/// A generated course, serialized as-is.
#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct CourseResponse(pub Course);

/// Either a single `prompt` or a list of `prompts`.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest {
    pub prompt: Option<String>,
    pub prompts: Option<Vec<String>>,
    /// Clamped to 1..=10. Defaults to the configured batch size.
    pub batch_size: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub image_url: String,
}

/// `imageUrls` is parallel to the request; failed entries are empty strings.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageBatchResponse {
    pub image_urls: Vec<String>,
    pub total_generated: usize,
    pub total_requested: usize,
}

/// The answer to `/generate-image`, shaped by which field the request used.
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum ImageGenerationResponse {
    Single(ImageResponse),
    Batch(ImageBatchResponse),
}

//=========================================================================================
// Saved Courses
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Vec<Object>)]
pub struct SavedCoursesResponse(pub Vec<SavedCourse>);

//=========================================================================================
// Sessions
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    #[schema(value_type = Object)]
    pub state: SessionState,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NavigationRequest {
    pub module_index: usize,
    pub slide_index: Option<usize>,
    #[schema(value_type = Option<String>, example = "quiz")]
    pub view_mode: Option<ViewMode>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizScoreRequest {
    pub module_index: usize,
    pub score: u32,
    pub total: u32,
}
