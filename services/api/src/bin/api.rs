//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{JsonFileCourseStore, OpenAiImageModel, OpenAiTextAdapter, S3ImageStorage},
    config::Config,
    error::ApiError,
    web::{self, state::AppState},
};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method,
};
use course_designer_core::{
    images::clamp_batch_size, CourseExpander, CourseWorkflow, ImageModel, ImageOrchestrator,
    ImageSettings, ImageStorageService, OutlineGenerator, SavedCourseStore,
    TextGenerationService,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    let http = reqwest::Client::builder()
        .build()
        .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

    // --- 2. Initialize Service Adapters ---
    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; generation requests will fail until it is configured.");
    }
    let text_adapter: Arc<dyn TextGenerationService> = Arc::new(OpenAiTextAdapter::new(
        config.openai_api_key.as_deref(),
        config.text_model.clone(),
    ));

    let image_models: Vec<Arc<dyn ImageModel>> = match &config.image_api_key {
        Some(key) => config
            .image_models
            .iter()
            .map(|model| {
                Arc::new(OpenAiImageModel::new(
                    http.clone(),
                    &config.image_api_base,
                    key,
                    model,
                )) as Arc<dyn ImageModel>
            })
            .collect(),
        None => {
            warn!("No image API key is set; courses will be generated without images.");
            Vec::new()
        }
    };
    info!(models = ?config.image_models, "Image models configured");

    let image_storage: Option<Arc<dyn ImageStorageService>> = match &config.storage {
        Some(storage) => {
            info!("Generated images will be copied to bucket '{}'", storage.bucket);
            Some(Arc::new(S3ImageStorage::new(storage, http.clone()).await)
                as Arc<dyn ImageStorageService>)
        }
        None => {
            info!("Object storage is not configured; provider image URLs are kept as-is.");
            None
        }
    };

    let settings = ImageSettings {
        enabled: !config.skip_image_generation,
        batch_size: clamp_batch_size(config.image_batch_size),
        batch_delay: config.image_batch_delay,
        timeout: config.image_timeout,
    };
    let images = Arc::new(ImageOrchestrator::new(image_models, image_storage, settings));

    info!("Saved courses are kept at {}", config.courses_path.display());
    let course_store: Arc<dyn SavedCourseStore> =
        Arc::new(JsonFileCourseStore::new(config.courses_path.clone()));

    // --- 3. Build the Shared AppState ---
    let workflow = CourseWorkflow::new(
        OutlineGenerator::new(text_adapter.clone()),
        CourseExpander::new(text_adapter, images.clone()),
        images,
        course_store,
    );
    let app_state = Arc::new(AppState::new(config.clone(), workflow));
    match web::state::spawn_idle_session_sweep(app_state.clone()) {
        Some(_) => info!(
            "Idle sessions are dropped after {:?}",
            config.session_idle_timeout.unwrap_or_default()
        ),
        None => info!("Idle session eviction is disabled"),
    }

    // --- 4. Create the Web Router ---
    let cors_origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    let app = web::router(app_state).layer(cors);

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
