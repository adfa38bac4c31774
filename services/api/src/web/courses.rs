//! services/api/src/web/courses.rs
//!
//! Handlers for the saved-course list.

use crate::error::{ApiError, ErrorResponse};
use crate::web::protocol::SavedCoursesResponse;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use std::sync::Arc;
use tracing::info;

/// List saved courses, newest first.
#[utoipa::path(
    get,
    path = "/courses",
    responses(
        (status = 200, description = "Saved courses", body = SavedCoursesResponse),
        (status = 500, description = "The store could not be read", body = ErrorResponse)
    )
)]
pub async fn list_courses_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<SavedCoursesResponse>, ApiError> {
    let courses = app_state.workflow.store().list().await?;
    Ok(Json(SavedCoursesResponse(courses)))
}

/// Delete one saved course.
#[utoipa::path(
    delete,
    path = "/courses/{id}",
    params(("id" = i64, Path, description = "The saved course id.")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No saved course has this id", body = ErrorResponse)
    )
)]
pub async fn delete_course_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    app_state.workflow.store().remove(id).await?;
    info!("Deleted saved course {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Delete every saved course.
#[utoipa::path(
    delete,
    path = "/courses",
    responses(
        (status = 204, description = "All saved courses deleted"),
        (status = 500, description = "The store could not be written", body = ErrorResponse)
    )
)]
pub async fn clear_courses_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    app_state.workflow.store().clear().await?;
    info!("Cleared all saved courses");
    Ok(StatusCode::NO_CONTENT)
}
