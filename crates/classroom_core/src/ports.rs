//! crates/classroom_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the classroom's core logic.
//! These traits form the boundary of the hexagonal architecture, keeping the
//! session controller independent of the AI vendor, the speech engines and the
//! persistence backend.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{
    EngagementLevel, LessonPlan, LessonResult, LessonStep, Preferences, UserStats,
};
use crate::whiteboard::{ToolCall, WhiteboardState};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Already exists: {0}")]
    Conflict(String),
    #[error("Malformed content from the AI service: {0}")]
    InvalidContent(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Gateway Request/Response Types
//=========================================================================================

/// An image attached to a chat message, carried as base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub base64: String,
    pub mime_type: String,
}

impl InlineImage {
    /// Parses a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("data:")?;
        let (mime_type, base64) = rest.split_once(";base64,")?;
        if mime_type.is_empty() || base64.is_empty() {
            return None;
        }
        Some(Self {
            base64: base64.to_string(),
            mime_type: mime_type.to_string(),
        })
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    /// `"<topic> - <step title>"` of the step the learner is on.
    pub lesson_context: String,
    pub image: Option<InlineImage>,
    pub whiteboard: Option<WhiteboardState>,
}

#[derive(Debug, Clone, Default)]
pub struct ChatReply {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

//=========================================================================================
// Account Types
//=========================================================================================

#[derive(Debug, Clone)]
pub struct Account {
    pub user_id: Uuid,
    pub username: String,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: Uuid,
    pub username: String,
    pub password_hash: String,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The AI content gateway. Every call may fail; callers decide the fallback.
#[async_trait]
pub trait LessonContentService: Send + Sync {
    async fn generate_lesson_plan(
        &self,
        subject: &str,
        grade: &str,
        topic: &str,
    ) -> PortResult<LessonPlan>;

    /// Generates an illustration and returns it as a data URL.
    async fn generate_image(&self, prompt: &str) -> PortResult<String>;

    /// Answers the learner, optionally asking for whiteboard tool calls.
    async fn chat_reply(&self, request: ChatRequest) -> PortResult<ChatReply>;

    async fn adaptive_suggestion(
        &self,
        step_content: &str,
        engagement: EngagementLevel,
    ) -> PortResult<String>;

    /// Rewrites the content of a step to be more engaging.
    async fn regenerate_step(
        &self,
        step: &LessonStep,
        engagement: EngagementLevel,
    ) -> PortResult<String>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Generates audio data from a string of text.
    async fn generate_audio(&self, text: &str) -> PortResult<Vec<u8>>;
}

#[async_trait]
pub trait SpeechToTextService: Send + Sync {
    /// Transcribes raw PCM16 audio into text.
    async fn transcribe_audio(&self, audio_data: &[u8]) -> PortResult<String>;
}

/// Persistence of stats, lesson history and preferences for one learner.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get_stats(&self, learner_id: Uuid) -> PortResult<UserStats>;

    async fn update_stats(&self, learner_id: Uuid, stats: &UserStats) -> PortResult<()>;

    /// Lesson history, newest first.
    async fn get_history(&self, learner_id: Uuid) -> PortResult<Vec<LessonResult>>;

    async fn append_history(&self, learner_id: Uuid, result: &LessonResult) -> PortResult<()>;

    async fn clear_history(&self, learner_id: Uuid) -> PortResult<()>;

    /// Appends a finished lesson and folds it into the stats as one unit: either
    /// both are stored or neither is. Returns the new stats.
    async fn record_lesson(
        &self,
        learner_id: Uuid,
        result: &LessonResult,
        today: NaiveDate,
    ) -> PortResult<UserStats>;

    async fn get_preferences(&self, learner_id: Uuid) -> PortResult<Preferences>;

    async fn update_preferences(
        &self,
        learner_id: Uuid,
        preferences: &Preferences,
    ) -> PortResult<()>;
}

#[async_trait]
pub trait AccountService: Send + Sync {
    async fn register(&self, username: &str, password_hash: &str) -> PortResult<Account>;

    async fn find_credentials(&self, username: &str) -> PortResult<Credentials>;

    async fn create_auth_token(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Returns the owner of a live token, or `Unauthorized`.
    async fn validate_auth_token(&self, token: &str) -> PortResult<Uuid>;

    async fn delete_auth_token(&self, token: &str) -> PortResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_round_trips() {
        let image = InlineImage::from_data_url("data:image/jpeg;base64,QUJD").unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.base64, "QUJD");
        assert_eq!(image.data_url(), "data:image/jpeg;base64,QUJD");
    }

    #[test]
    fn plain_urls_are_not_inline_images() {
        assert!(InlineImage::from_data_url("https://example.com/cat.png").is_none());
    }
}
