//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables once at startup and
//! shared as an `Arc<Config>`. The `.env` file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Credentials and location of the bucket generated images are copied into.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub bucket: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub cors_origin: String,
    pub openai_api_key: Option<String>,
    pub text_model: String,
    pub image_api_key: Option<String>,
    pub image_api_base: String,
    pub image_models: Vec<String>,
    pub image_batch_size: usize,
    pub image_batch_delay: Duration,
    pub image_timeout: Duration,
    pub skip_image_generation: bool,
    /// `None` unless the bucket and both keys are set.
    pub storage: Option<StorageConfig>,
    pub courses_path: PathBuf,
    /// Sessions untouched for this long are dropped. `None` keeps them forever.
    pub session_idle_timeout: Option<Duration>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // `Some("")` is treated the same as an unset variable.
        let get = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        // --- Server Settings ---
        let bind_address: SocketAddr =
            parse_or(&get, "BIND_ADDRESS", "0.0.0.0:3000".parse().ok())?;

        let log_level_str = get("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = get("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Text Provider ---
        let openai_api_key = get("OPENAI_API_KEY");
        let text_model = get("TEXT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());

        // --- Image Provider ---
        let image_api_key = get("IMAGE_API_KEY").or_else(|| openai_api_key.clone());
        let image_api_base =
            get("IMAGE_API_BASE").unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let image_models: Vec<String> = get("IMAGE_MODELS")
            .unwrap_or_else(|| "dall-e-3,dall-e-2".to_string())
            .split(',')
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if image_models.is_empty() {
            return Err(ConfigError::InvalidValue(
                "IMAGE_MODELS".to_string(),
                "at least one model name is required".to_string(),
            ));
        }

        let image_batch_size: usize = parse_or(&get, "IMAGE_BATCH_SIZE", Some(5))?;
        let image_batch_delay =
            Duration::from_millis(parse_or(&get, "IMAGE_BATCH_DELAY_MS", Some(1200u64))?);
        let image_timeout = Duration::from_secs(parse_or(&get, "IMAGE_TIMEOUT_SECS", Some(30u64))?);
        let skip_image_generation = get("SKIP_IMAGE_GENERATION")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        // --- Object Storage (optional as a whole) ---
        let storage = match (
            get("S3_BUCKET_NAME"),
            get("AWS_ACCESS_KEY_ID"),
            get("AWS_SECRET_ACCESS_KEY"),
        ) {
            (Some(bucket), Some(access_key_id), Some(secret_access_key)) => Some(StorageConfig {
                access_key_id,
                secret_access_key,
                region: get("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                bucket,
            }),
            _ => None,
        };

        let courses_path = get("COURSES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/courses.json"));

        // --- Sessions ---
        let session_idle_secs: u64 = parse_or(&get, "SESSION_IDLE_TIMEOUT_SECS", Some(3600))?;
        let session_idle_timeout =
            (session_idle_secs > 0).then(|| Duration::from_secs(session_idle_secs));

        Ok(Self {
            bind_address,
            log_level,
            cors_origin,
            openai_api_key,
            text_model,
            image_api_key,
            image_api_base,
            image_models,
            image_batch_size,
            image_batch_delay,
            image_timeout,
            skip_image_generation,
            storage,
            courses_path,
            session_idle_timeout,
        })
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: Option<T>,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(name.to_string())),
    }
}
