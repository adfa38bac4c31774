pub mod courses;
pub mod protocol;
pub mod rest;
pub mod sessions;
pub mod state;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use rest::ApiDoc;
use state::AppState;

/// Builds every API route plus the Swagger UI. CORS is layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/generate-outline", post(rest::generate_outline_handler))
        .route("/generate-course", post(rest::generate_course_handler))
        .route("/generate-image", post(rest::generate_image_handler))
        .route(
            "/courses",
            get(courses::list_courses_handler).delete(courses::clear_courses_handler),
        )
        .route("/courses/{id}", delete(courses::delete_course_handler))
        .route("/sessions", post(sessions::create_session_handler))
        .route(
            "/sessions/{id}",
            get(sessions::get_session_handler).delete(sessions::delete_session_handler),
        )
        .route("/sessions/{id}/outline", post(sessions::request_outline_handler))
        .route("/sessions/{id}/approve", post(sessions::approve_outline_handler))
        .route("/sessions/{id}/reset", post(sessions::reset_session_handler))
        .route(
            "/sessions/{id}/courses/{course_id}/open",
            post(sessions::open_course_handler),
        )
        .route("/sessions/{id}/navigation", post(sessions::navigation_handler))
        .route("/sessions/{id}/quiz-score", post(sessions::quiz_score_handler))
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
