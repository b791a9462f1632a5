//! services/api/src/web/chat_task.rs
//!
//! Background AI work for a classroom. Each job runs in its own task and posts
//! its result back to the session's event channel; the session decides what to
//! do with a failure.

use classroom_core::domain::{EngagementLevel, LessonStep};
use classroom_core::ports::ChatRequest;
use classroom_core::whiteboard::ImageOptions;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

use crate::web::classroom::SessionEvent;
use crate::web::state::AppState;

pub const CHAT_FALLBACK: &str =
    "I'm sorry, I'm having a little trouble thinking right now. Could you ask me again in a moment?";
pub const IMAGE_FALLBACK: &str =
    "I tried to create an image, but something went wrong. Let's try that again later.";
pub const TRANSCRIPTION_FALLBACK: &str =
    "Sorry, I couldn't make out that recording. Could you try again or type your question?";

/// Asks the tutor for a reply, with the whiteboard and any uploaded image as context.
pub fn spawn_chat(app: &Arc<AppState>, events: &UnboundedSender<SessionEvent>, request: ChatRequest) {
    let app = app.clone();
    let events = events.clone();
    tokio::spawn(async move {
        let result = app.content.chat_reply(request).await;
        match &result {
            Ok(reply) => info!(tool_calls = reply.tool_calls.len(), "Tutor replied"),
            Err(e) => error!("Failed to get chat reply: {:?}", e),
        }
        let _ = events.send(SessionEvent::ChatAnswered(result));
    });
}

/// Generates the picture an `addImage` tool call asked for.
pub fn spawn_image(
    app: &Arc<AppState>,
    events: &UnboundedSender<SessionEvent>,
    prompt: String,
    options: ImageOptions,
) {
    let app = app.clone();
    let events = events.clone();
    tokio::spawn(async move {
        let result = app.content.generate_image(&prompt).await;
        if let Err(e) = &result {
            error!("Failed to generate whiteboard image: {:?}", e);
        }
        let _ = events.send(SessionEvent::ImageReady { options, result });
    });
}

/// Transcribes a recorded voice question.
pub fn spawn_transcription(
    app: &Arc<AppState>,
    events: &UnboundedSender<SessionEvent>,
    audio: Vec<u8>,
) {
    let app = app.clone();
    let events = events.clone();
    tokio::spawn(async move {
        info!(bytes = audio.len(), "Transcribing voice question");
        let result = app.stt_adapter.transcribe_audio(&audio).await;
        if let Err(e) = &result {
            error!("Failed to transcribe audio: {:?}", e);
        }
        let _ = events.send(SessionEvent::Transcribed(result));
    });
}

pub fn spawn_suggestion(
    app: &Arc<AppState>,
    events: &UnboundedSender<SessionEvent>,
    epoch: u64,
    content: String,
    engagement: EngagementLevel,
) {
    let app = app.clone();
    let events = events.clone();
    tokio::spawn(async move {
        let result = app.content.adaptive_suggestion(&content, engagement).await;
        if let Err(e) = &result {
            error!("Failed to get adaptive suggestion: {:?}", e);
        }
        let _ = events.send(SessionEvent::SuggestionReady { epoch, result });
    });
}

pub fn spawn_regeneration(
    app: &Arc<AppState>,
    events: &UnboundedSender<SessionEvent>,
    epoch: u64,
    step_index: usize,
    step: LessonStep,
    engagement: EngagementLevel,
) {
    let app = app.clone();
    let events = events.clone();
    tokio::spawn(async move {
        let result = app.content.regenerate_step(&step, engagement).await;
        if let Err(e) = &result {
            error!(step_index, "Failed to regenerate step: {:?}", e);
        }
        let _ = events.send(SessionEvent::StepRewritten {
            epoch,
            step_index,
            result,
        });
    });
}
