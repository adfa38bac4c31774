//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the stateless generation endpoints and the
//! master definition for the OpenAPI specification.

use crate::error::{ApiError, ErrorResponse};
use crate::web::courses;
use crate::web::protocol::{
    CourseResponse, GenerateCourseRequest, GenerateImageRequest, GenerateOutlineRequest,
    ImageBatchResponse, ImageGenerationResponse, ImageResponse, NavigationRequest,
    OutlineResponse, QuizScoreRequest, SavedCoursesResponse, SessionSnapshot,
};
use crate::web::sessions;
use crate::web::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use course_designer_core::images::ImageRequest;
use course_designer_core::workflow::{COURSE_FAILED, OUTLINE_FAILED};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::OpenApi;

const IMAGE_FAILED: &str = "Failed to generate image";
const IMAGES_FAILED: &str = "Failed to generate images";

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        generate_outline_handler,
        generate_course_handler,
        generate_image_handler,
        courses::list_courses_handler,
        courses::delete_course_handler,
        courses::clear_courses_handler,
        sessions::create_session_handler,
        sessions::get_session_handler,
        sessions::delete_session_handler,
        sessions::request_outline_handler,
        sessions::approve_outline_handler,
        sessions::reset_session_handler,
        sessions::open_course_handler,
        sessions::navigation_handler,
        sessions::quiz_score_handler,
    ),
    components(
        schemas(
            GenerateOutlineRequest,
            OutlineResponse,
            GenerateCourseRequest,
            CourseResponse,
            GenerateImageRequest,
            ImageResponse,
            ImageBatchResponse,
            ImageGenerationResponse,
            SavedCoursesResponse,
            SessionSnapshot,
            NavigationRequest,
            QuizScoreRequest,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Course Designer API", description = "Generates illustrated courses from a topic and keeps the ones users save.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Generation Handlers
//=========================================================================================

/// Generate a course outline for a topic.
#[utoipa::path(
    post,
    path = "/generate-outline",
    request_body = GenerateOutlineRequest,
    responses(
        (status = 200, description = "Outline generated", body = OutlineResponse),
        (status = 400, description = "Empty prompt or module count out of range", body = ErrorResponse),
        (status = 500, description = "Provider or configuration failure", body = ErrorResponse)
    )
)]
pub async fn generate_outline_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<GenerateOutlineRequest>, JsonRejection>,
) -> Result<Json<OutlineResponse>, ApiError> {
    let Json(request) = payload?;
    info!(modules = request.num_modules, "Generating outline for '{}'", request.prompt);

    let modules = app_state
        .workflow
        .outline_generator()
        .generate(&request.prompt, request.num_modules, request.depth)
        .await
        .map_err(|e| ApiError::generation(e, OUTLINE_FAILED))?;

    Ok(Json(OutlineResponse { modules }))
}

/// Expand an approved outline into a full course with images.
#[utoipa::path(
    post,
    path = "/generate-course",
    request_body = GenerateCourseRequest,
    responses(
        (status = 200, description = "Course generated", body = CourseResponse),
        (status = 400, description = "The outline is empty", body = ErrorResponse),
        (status = 500, description = "Provider or configuration failure", body = ErrorResponse)
    )
)]
pub async fn generate_course_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<GenerateCourseRequest>, JsonRejection>,
) -> Result<Json<CourseResponse>, ApiError> {
    let Json(request) = payload?;

    let course = app_state
        .workflow
        .expander()
        .expand(&request.prompt, &request.outline, request.depth)
        .await
        .map_err(|e| ApiError::generation(e, COURSE_FAILED))?;

    Ok(Json(CourseResponse(course)))
}

/// Generate one image, or a batch of images in order.
///
/// With `prompts`, failed entries come back as empty strings and the call only
/// fails when no image at all could be produced.
#[utoipa::path(
    post,
    path = "/generate-image",
    request_body = GenerateImageRequest,
    responses(
        (status = 200, description = "`{imageUrl}` for `prompt`, `{imageUrls, totalGenerated, totalRequested}` for `prompts`", body = ImageGenerationResponse),
        (status = 400, description = "Neither prompt nor prompts was given", body = ErrorResponse),
        (status = 500, description = "No image could be generated", body = ErrorResponse)
    )
)]
pub async fn generate_image_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<GenerateImageRequest>, JsonRejection>,
) -> Result<Json<ImageGenerationResponse>, ApiError> {
    let Json(request) = payload?;
    let images = app_state.workflow.images();

    if let Some(prompts) = request.prompts.filter(|p| !p.is_empty()) {
        let requests: Vec<ImageRequest> = prompts.iter().map(ImageRequest::new).collect();
        let batch_size = request
            .batch_size
            .unwrap_or(images.settings().batch_size);
        let report = images.generate_batched(&requests, batch_size).await;

        if report.generated == 0 {
            warn!(requested = requests.len(), "No image in the batch could be generated");
            return Err(ApiError::Generation(IMAGES_FAILED.to_string()));
        }
        return Ok(Json(ImageGenerationResponse::Batch(ImageBatchResponse {
            total_generated: report.generated,
            total_requested: report.urls.len(),
            image_urls: report.urls,
        })));
    }

    if let Some(prompt) = request.prompt {
        let image_url = images
            .generate_one(&prompt, None)
            .await
            .map_err(|e| ApiError::generation(e, IMAGE_FAILED))?;
        return Ok(Json(ImageGenerationResponse::Single(ImageResponse {
            image_url,
        })));
    }

    Err(ApiError::BadRequest(
        "Either prompt or prompts is required".to_string(),
    ))
}
