//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every handler and connection.

use crate::config::Config;
use classroom_core::ports::{
    AccountService, LessonContentService, ProgressStore, SpeechToTextService,
    TextToSpeechService,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub content: Arc<dyn LessonContentService>,
    pub tts_adapter: Arc<dyn TextToSpeechService>,
    pub stt_adapter: Arc<dyn SpeechToTextService>,
    pub progress: Arc<dyn ProgressStore>,
    /// `None` in offline mode, where the single local profile needs no sign-in.
    pub accounts: Option<Arc<dyn AccountService>>,
}
