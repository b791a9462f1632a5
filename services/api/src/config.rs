//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use classroom_core::SessionTimings;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Absent when the server runs offline against the local JSON store.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub local_store_path: PathBuf,
    pub openai_api_key: Option<String>,
    pub lesson_model: String,
    pub tutor_model: String,
    pub image_model: String,
    pub tts_voice: String,
    pub stt_model: String,
    pub allowed_origin: String,
    pub quiz_review: Duration,
    pub engagement_debounce: Duration,
    pub simulation_interval: Duration,
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

        // --- Server and storage ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let local_store_path = std::env::var("LOCAL_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./classroom_data.json"));

        // --- AI services ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let lesson_model =
            std::env::var("LESSON_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let tutor_model = std::env::var("TUTOR_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let image_model =
            std::env::var("IMAGE_MODEL").unwrap_or_else(|_| "dall-e-3".to_string());
        let tts_voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());
        let stt_model = std::env::var("STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string());

        let allowed_origin = std::env::var("ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());

        // --- Session timings ---
        let quiz_review = millis_var("QUIZ_REVIEW_MS", 2000)?;
        let engagement_debounce = millis_var("ENGAGEMENT_DEBOUNCE_MS", 2000)?;
        let simulation_interval = nonzero_millis_var("SIMULATION_INTERVAL_MS", 2000)?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            local_store_path,
            openai_api_key,
            lesson_model,
            tutor_model,
            image_model,
            tts_voice,
            stt_model,
            allowed_origin,
            quiz_review,
            engagement_debounce,
            simulation_interval,
        })
    }

    /// Offline mode keeps a single local learner in a JSON file.
    pub fn is_offline(&self) -> bool {
        self.database_url.is_none()
    }

    pub fn session_timings(&self) -> SessionTimings {
        SessionTimings {
            quiz_review: self.quiz_review,
            engagement_debounce: self.engagement_debounce,
        }
    }

    /// The OpenAI key, required by every AI adapter.
    pub fn require_openai_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: None,
            log_level: Level::INFO,
            local_store_path: PathBuf::from("./classroom_data.json"),
            openai_api_key: None,
            lesson_model: "gpt-4o-mini".to_string(),
            tutor_model: "gpt-4o".to_string(),
            image_model: "dall-e-3".to_string(),
            tts_voice: "alloy".to_string(),
            stt_model: "whisper-1".to_string(),
            allowed_origin: "http://localhost:5173".to_string(),
            quiz_review: Duration::from_secs(2),
            engagement_debounce: Duration::from_secs(2),
            simulation_interval: Duration::from_secs(2),
        }
    }
}

fn millis_var(name: &str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(Duration::from_millis(default)),
    }
}

/// Like `millis_var`, for periods that must not be zero.
fn nonzero_millis_var(name: &str, default: u64) -> Result<Duration, ConfigError> {
    let value = millis_var(name, default)?;
    if value.is_zero() {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than 0".to_string(),
        ));
    }
    Ok(value)
}
