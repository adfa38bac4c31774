//! services/api/src/web/sessions.rs
//!
//! Handlers for server-held sessions. Each endpoint drives the session's state
//! machine and answers with a snapshot of it.
//!
//! A failed generation step is recorded in the session's `error` field and still
//! answered with `200`; only a rejected transition is an HTTP error (`409`).

use crate::error::{ApiError, ErrorResponse};
use crate::web::protocol::{
    GenerateOutlineRequest, NavigationRequest, QuizScoreRequest, SessionSnapshot,
};
use crate::web::state::{AppState, SharedSession};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
};
use course_designer_core::domain::{QuizScore, MAX_MODULES, MIN_MODULES};
use course_designer_core::ports::{PortError, PortResult};
use course_designer_core::state::SessionAction;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

async fn snapshot(session_id: Uuid, session: &SharedSession) -> Json<SessionSnapshot> {
    Json(SessionSnapshot {
        session_id,
        state: session.lock().await.clone(),
    })
}

/// Turns a workflow result into a response. Failures the workflow already wrote
/// into the session are answered with the snapshot.
async fn settle(
    session_id: Uuid,
    session: &SharedSession,
    result: PortResult<()>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    match result {
        Ok(()) => {}
        Err(e @ (PortError::Transition(_) | PortError::Validation(_) | PortError::NotFound(_))) => {
            return Err(e.into())
        }
        Err(e) => warn!(%session_id, "Session step failed: {}", e),
    }
    Ok(snapshot(session_id, session).await)
}

async fn apply(session: &SharedSession, action: SessionAction) -> Result<(), ApiError> {
    session
        .lock()
        .await
        .apply(action)
        .map_err(PortError::from)?;
    Ok(())
}

//=========================================================================================
// Lifecycle
//=========================================================================================

/// Start a new session in the prompt stage.
#[utoipa::path(
    post,
    path = "/sessions",
    responses(
        (status = 201, description = "Session created", body = SessionSnapshot),
        (status = 500, description = "Saved courses could not be read", body = ErrorResponse)
    )
)]
pub async fn create_session_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let (session_id, session) = app_state.create_session().await?;
    info!(%session_id, "Session created");
    Ok((StatusCode::CREATED, snapshot(session_id, &session).await))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = Uuid, Path, description = "The session id.")),
    responses(
        (status = 200, description = "Current session state", body = SessionSnapshot),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    )
)]
pub async fn get_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = app_state.session(session_id).await?;
    Ok(snapshot(session_id, &session).await)
}

/// End a session and free what the server holds for it.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(("id" = Uuid, Path, description = "The session id.")),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    )
)]
pub async fn delete_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    app_state.remove_session(session_id).await?;
    info!(%session_id, "Session deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Return the session to the prompt stage, keeping the saved-course list.
#[utoipa::path(
    post,
    path = "/sessions/{id}/reset",
    params(("id" = Uuid, Path, description = "The session id.")),
    responses(
        (status = 200, description = "Session reset", body = SessionSnapshot),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    )
)]
pub async fn reset_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = app_state.session(session_id).await?;
    let result = app_state.workflow.reset(&session).await;
    settle(session_id, &session, result).await
}

//=========================================================================================
// Course Creation
//=========================================================================================

/// Request an outline for review.
#[utoipa::path(
    post,
    path = "/sessions/{id}/outline",
    params(("id" = Uuid, Path, description = "The session id.")),
    request_body = GenerateOutlineRequest,
    responses(
        (status = 200, description = "Outline ready for review, or the error recorded", body = SessionSnapshot),
        (status = 400, description = "Empty prompt or module count out of range", body = ErrorResponse),
        (status = 404, description = "Unknown session", body = ErrorResponse),
        (status = 409, description = "Not allowed in the current stage", body = ErrorResponse)
    )
)]
pub async fn request_outline_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    payload: Result<Json<GenerateOutlineRequest>, JsonRejection>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let Json(request) = payload?;
    // Rejected here so that bad input never reaches the state machine.
    if request.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".to_string()));
    }
    if !(MIN_MODULES..=MAX_MODULES).contains(&request.num_modules) {
        return Err(ApiError::BadRequest(format!(
            "numModules must be between {} and {}",
            MIN_MODULES, MAX_MODULES
        )));
    }

    let session = app_state.session(session_id).await?;
    let result = app_state
        .workflow
        .request_outline(&session, &request.prompt, request.num_modules, request.depth)
        .await;
    settle(session_id, &session, result).await
}

/// Approve the outline under review and generate the full course.
#[utoipa::path(
    post,
    path = "/sessions/{id}/approve",
    params(("id" = Uuid, Path, description = "The session id.")),
    responses(
        (status = 200, description = "Course ready, or the error recorded", body = SessionSnapshot),
        (status = 404, description = "Unknown session", body = ErrorResponse),
        (status = 409, description = "No outline is awaiting approval", body = ErrorResponse)
    )
)]
pub async fn approve_outline_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = app_state.session(session_id).await?;
    let result = app_state.workflow.approve_outline(&session).await;
    settle(session_id, &session, result).await
}

/// Open a saved course, regenerating any images it is missing.
#[utoipa::path(
    post,
    path = "/sessions/{id}/courses/{course_id}/open",
    params(
        ("id" = Uuid, Path, description = "The session id."),
        ("course_id" = i64, Path, description = "The saved course id.")
    ),
    responses(
        (status = 200, description = "Course opened", body = SessionSnapshot),
        (status = 404, description = "Unknown session or saved course", body = ErrorResponse),
        (status = 409, description = "An error must be cleared first", body = ErrorResponse)
    )
)]
pub async fn open_course_handler(
    State(app_state): State<Arc<AppState>>,
    Path((session_id, course_id)): Path<(Uuid, i64)>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = app_state.session(session_id).await?;
    let result = app_state
        .workflow
        .load_saved_course(&session, course_id)
        .await;
    settle(session_id, &session, result).await
}

//=========================================================================================
// Course View
//=========================================================================================

/// Move to a slide and/or switch between slides and quiz for a module.
#[utoipa::path(
    post,
    path = "/sessions/{id}/navigation",
    params(("id" = Uuid, Path, description = "The session id.")),
    request_body = NavigationRequest,
    responses(
        (status = 200, description = "Navigation updated", body = SessionSnapshot),
        (status = 400, description = "Neither slideIndex nor viewMode was given", body = ErrorResponse),
        (status = 409, description = "No course is open or the module does not exist", body = ErrorResponse)
    )
)]
pub async fn navigation_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    payload: Result<Json<NavigationRequest>, JsonRejection>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let Json(request) = payload?;
    if request.slide_index.is_none() && request.view_mode.is_none() {
        return Err(ApiError::BadRequest(
            "slideIndex or viewMode is required".to_string(),
        ));
    }

    let session = app_state.session(session_id).await?;
    if let Some(slide_index) = request.slide_index {
        apply(
            &session,
            SessionAction::SetCurrentSlide {
                module_index: request.module_index,
                slide_index,
            },
        )
        .await?;
    }
    if let Some(mode) = request.view_mode {
        apply(
            &session,
            SessionAction::SetViewMode {
                module_index: request.module_index,
                mode,
            },
        )
        .await?;
    }
    Ok(snapshot(session_id, &session).await)
}

/// Record the result of a module quiz.
#[utoipa::path(
    post,
    path = "/sessions/{id}/quiz-score",
    params(("id" = Uuid, Path, description = "The session id.")),
    request_body = QuizScoreRequest,
    responses(
        (status = 200, description = "Score recorded", body = SessionSnapshot),
        (status = 400, description = "Score exceeds total", body = ErrorResponse),
        (status = 409, description = "No course is open or the module does not exist", body = ErrorResponse)
    )
)]
pub async fn quiz_score_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    payload: Result<Json<QuizScoreRequest>, JsonRejection>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let Json(request) = payload?;
    if request.score > request.total {
        return Err(ApiError::BadRequest(
            "score must not exceed total".to_string(),
        ));
    }

    let session = app_state.session(session_id).await?;
    apply(
        &session,
        SessionAction::UpdateQuizScore {
            module_index: request.module_index,
            score: QuizScore {
                score: request.score,
                total: request.total,
            },
        },
    )
    .await?;
    Ok(snapshot(session_id, &session).await)
}
