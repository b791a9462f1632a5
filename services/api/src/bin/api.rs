//! services/api/src/bin/api.rs

use async_openai::{config::OpenAIConfig, types::SpeechModel, Client};
use classroom_api::{
    adapters::{DbAdapter, LocalStoreAdapter, OpenAiLessonAdapter, OpenAiSttAdapter, OpenAiTtsAdapter},
    config::Config,
    error::ApiError,
    web::{router, state::AppState},
};
use classroom_core::ports::{AccountService, ProgressStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
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

    // --- 2. Choose the Progress Store ---
    let (progress, accounts): (Arc<dyn ProgressStore>, Option<Arc<dyn AccountService>>) =
        match &config.database_url {
            Some(database_url) => {
                info!("Connecting to database...");
                let db_pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect(database_url)
                    .await?;
                let db_adapter = Arc::new(DbAdapter::new(db_pool));
                info!("Running database migrations...");
                db_adapter.run_migrations().await?;
                info!("Database migrations complete.");
                let accounts: Arc<dyn AccountService> = db_adapter.clone();
                (db_adapter as Arc<dyn ProgressStore>, Some(accounts))
            }
            None => {
                info!(
                    path = %config.local_store_path.display(),
                    "No DATABASE_URL set; running offline with a local progress file"
                );
                let store = Arc::new(LocalStoreAdapter::load(&config.local_store_path).await?);
                (store as Arc<dyn ProgressStore>, None)
            }
        };

    // --- 3. Initialize AI Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(config.require_openai_key()?);
    let openai_client = Client::with_config(openai_config);

    let tts_voice = OpenAiTtsAdapter::voice_from_name(&config.tts_voice).ok_or_else(|| {
        ApiError::Internal(format!(
            "Invalid TTS voice specified in config: '{}'",
            config.tts_voice
        ))
    })?;
    let tts_adapter = Arc::new(OpenAiTtsAdapter::new(
        openai_client.clone(),
        SpeechModel::Tts1Hd,
        tts_voice,
    ));
    let stt_adapter = Arc::new(OpenAiSttAdapter::new(
        openai_client.clone(),
        config.stt_model.clone(),
    ));
    let content = Arc::new(OpenAiLessonAdapter::new(
        openai_client,
        config.lesson_model.clone(),
        config.tutor_model.clone(),
        config.image_model.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        content,
        tts_adapter,
        stt_adapter,
        progress,
        accounts,
    });

    // --- 5. Start the Server ---
    let app = router(app_state);
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
