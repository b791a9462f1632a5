//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::auth::{CredentialsRequest, TokenResponse};
use crate::web::middleware::Learner;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use classroom_core::domain::{LessonResult, Preferences, UserStats};
use classroom_core::ports::PortError;
use classroom_core::progress::{check_result, reconcile_stats, ProgressError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::register_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        generate_lesson_handler,
        generate_image_handler,
        get_stats_handler,
        update_stats_handler,
        get_history_handler,
        append_history_handler,
        clear_history_handler,
        report_handler,
        get_preferences_handler,
        update_preferences_handler,
    ),
    components(
        schemas(
            CredentialsRequest,
            TokenResponse,
            GenerateLessonRequest,
            GenerateImageRequest,
            GenerateImageResponse,
            ReportResponse
        )
    ),
    tags(
        (name = "AI Classroom API", description = "Lesson generation, progress and account endpoints for the AI virtual classroom.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct GenerateLessonRequest {
    pub subject: String,
    pub grade: String,
    pub topic: String,
}

#[derive(Deserialize, ToSchema)]
pub struct GenerateImageRequest {
    pub prompt: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    /// A `data:image/png;base64,...` URL.
    pub image_url: String,
}

/// Stats plus the progress bar value towards the next level.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: UserStats,
    pub level_progress: u32,
}

#[derive(Serialize, ToSchema)]
pub struct ReportResponse {
    pub report: String,
}

/// Maps a port failure onto an HTTP status.
fn port_error(e: PortError, message: &str) -> (StatusCode, String) {
    let status = match e {
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Conflict(_) => StatusCode::CONFLICT,
        PortError::InvalidContent(_) => StatusCode::BAD_GATEWAY,
        PortError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!(%status, "{}: {:?}", message, e);
    (status, message.to_string())
}

fn rejected(e: ProgressError) -> (StatusCode, String) {
    warn!("Rejected posted progress: {}", e);
    (StatusCode::BAD_REQUEST, e.to_string())
}

//=========================================================================================
// Content Handlers
//=========================================================================================

/// Generate a lesson plan for a subject, grade and topic.
#[utoipa::path(
    post,
    path = "/lessons",
    request_body = GenerateLessonRequest,
    responses(
        (status = 200, description = "The generated lesson plan"),
        (status = 400, description = "A field was left empty"),
        (status = 502, description = "The AI service returned an unusable plan")
    )
)]
pub async fn generate_lesson_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<GenerateLessonRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let (subject, grade, topic) = (req.subject.trim(), req.grade.trim(), req.topic.trim());
    if subject.is_empty() || grade.is_empty() || topic.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Please fill in all fields.".to_string()));
    }

    let plan = app_state
        .content
        .generate_lesson_plan(subject, grade, topic)
        .await
        .map_err(|e| port_error(e, "Failed to generate lesson plan. Please try again."))?;

    info!(%subject, %grade, %topic, steps = plan.steps.len(), "Lesson plan generated");
    Ok(Json(plan))
}

/// Generate an illustration for a visual step.
#[utoipa::path(
    post,
    path = "/images",
    request_body = GenerateImageRequest,
    responses(
        (status = 200, description = "The generated image", body = GenerateImageResponse),
        (status = 400, description = "Empty prompt"),
        (status = 503, description = "The image service is unavailable")
    )
)]
pub async fn generate_image_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<GenerateImageRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.prompt.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "A prompt is required".to_string()));
    }
    let image_url = app_state
        .content
        .generate_image(req.prompt.trim())
        .await
        .map_err(|e| port_error(e, "Failed to generate image"))?;
    Ok(Json(GenerateImageResponse { image_url }))
}

//=========================================================================================
// Progress Handlers
//=========================================================================================

/// The learner's XP, level and streak.
#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, description = "Current stats"),
        (status = 401, description = "Missing or expired token"),
        (status = 403, description = "Guests have no saved progress")
    )
)]
pub async fn get_stats_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(learner): Extension<Learner>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let learner_id = learner.require_progress_id()?;
    let stats = app_state
        .progress
        .get_stats(learner_id)
        .await
        .map_err(|e| port_error(e, "Failed to load stats"))?;
    let level_progress = stats.level_progress();
    Ok(Json(StatsResponse {
        stats,
        level_progress,
    }))
}

/// Replace the learner's stats. XP may only grow; the level is derived from it.
#[utoipa::path(
    post,
    path = "/stats",
    request_body(content_type = "application/json", description = "The new stats."),
    responses(
        (status = 204, description = "Stats saved"),
        (status = 400, description = "XP went down or a value is out of range"),
        (status = 403, description = "Guests have no saved progress")
    )
)]
pub async fn update_stats_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(learner): Extension<Learner>,
    Json(posted): Json<UserStats>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let learner_id = learner.require_progress_id()?;
    let stored = app_state
        .progress
        .get_stats(learner_id)
        .await
        .map_err(|e| port_error(e, "Failed to load stats"))?;
    let stats = reconcile_stats(&stored, &posted).map_err(rejected)?;
    app_state
        .progress
        .update_stats(learner_id, &stats)
        .await
        .map_err(|e| port_error(e, "Failed to save stats"))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Completed lessons, newest first.
#[utoipa::path(
    get,
    path = "/history",
    responses(
        (status = 200, description = "Lesson history"),
        (status = 403, description = "Guests have no saved progress")
    )
)]
pub async fn get_history_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(learner): Extension<Learner>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let learner_id = learner.require_progress_id()?;
    let history = app_state
        .progress
        .get_history(learner_id)
        .await
        .map_err(|e| port_error(e, "Failed to load lesson history"))?;
    Ok(Json(history))
}

/// Record a completed lesson.
#[utoipa::path(
    post,
    path = "/history",
    request_body(content_type = "application/json", description = "The lesson result."),
    responses(
        (status = 201, description = "Lesson recorded"),
        (status = 400, description = "Score or counts are out of range"),
        (status = 403, description = "Guests have no saved progress")
    )
)]
pub async fn append_history_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(learner): Extension<Learner>,
    Json(result): Json<LessonResult>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let learner_id = learner.require_progress_id()?;
    check_result(&result).map_err(rejected)?;
    app_state
        .progress
        .append_history(learner_id, &result)
        .await
        .map_err(|e| port_error(e, "Failed to save lesson result"))?;
    Ok(StatusCode::CREATED)
}

/// Delete the whole lesson history. Stats are kept.
#[utoipa::path(
    post,
    path = "/history/clear",
    responses(
        (status = 204, description = "History cleared"),
        (status = 403, description = "Guests have no saved progress")
    )
)]
pub async fn clear_history_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(learner): Extension<Learner>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let learner_id = learner.require_progress_id()?;
    app_state
        .progress
        .clear_history(learner_id)
        .await
        .map_err(|e| port_error(e, "Failed to clear history"))?;
    info!(learner = %learner.label(), "Lesson history cleared");
    Ok(StatusCode::NO_CONTENT)
}

/// A plain-text summary of one completed lesson.
#[utoipa::path(
    get,
    path = "/history/{id}/report",
    params(("id" = Uuid, Path, description = "The lesson result id.")),
    responses(
        (status = 200, description = "The report", body = ReportResponse),
        (status = 404, description = "No such lesson")
    )
)]
pub async fn report_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(learner): Extension<Learner>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let learner_id = learner.require_progress_id()?;
    let history = app_state
        .progress
        .get_history(learner_id)
        .await
        .map_err(|e| port_error(e, "Failed to load lesson history"))?;
    let result = history
        .iter()
        .find(|r| r.id == id)
        .ok_or((StatusCode::NOT_FOUND, "Lesson not found".to_string()))?;
    Ok(Json(ReportResponse {
        report: result.report(),
    }))
}

/// The learner's saved theme.
#[utoipa::path(
    get,
    path = "/preferences",
    responses(
        (status = 200, description = "Saved preferences"),
        (status = 403, description = "Guests have no saved progress")
    )
)]
pub async fn get_preferences_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(learner): Extension<Learner>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let learner_id = learner.require_progress_id()?;
    let preferences = app_state
        .progress
        .get_preferences(learner_id)
        .await
        .map_err(|e| port_error(e, "Failed to load preferences"))?;
    Ok(Json(preferences))
}

#[utoipa::path(
    put,
    path = "/preferences",
    request_body(content_type = "application/json", description = "The new preferences."),
    responses(
        (status = 204, description = "Preferences saved"),
        (status = 403, description = "Guests have no saved progress")
    )
)]
pub async fn update_preferences_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(learner): Extension<Learner>,
    Json(preferences): Json<Preferences>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let learner_id = learner.require_progress_id()?;
    app_state
        .progress
        .update_preferences(learner_id, &preferences)
        .await
        .map_err(|e| port_error(e, "Failed to save preferences"))?;
    Ok(StatusCode::NO_CONTENT)
}
