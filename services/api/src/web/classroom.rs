//! services/api/src/web/classroom.rs
//!
//! The session actor. One `Classroom` per WebSocket connection owns the lesson
//! state machine, the whiteboard and the engagement monitor, and is the only
//! place they are mutated. Client messages, timer ticks and AI results all
//! arrive as `SessionEvent`s on a single channel and are handled in order.

use bytes::Bytes;
use chrono::Utc;
use classroom_core::domain::{LessonPlan, LessonResult, UserStats};
use classroom_core::engagement::{EngagementMonitor, EngagementSimulator};
use classroom_core::ports::{ChatReply, ChatRequest, InlineImage, PortError, PortResult};
use classroom_core::session::{Effect, LessonSession, SessionError};
use classroom_core::whiteboard::{ImageOptions, ToolOutcome, Whiteboard, WhiteboardError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::web::chat_task::{self, CHAT_FALLBACK, IMAGE_FALLBACK, TRANSCRIPTION_FALLBACK};
use crate::web::middleware::Learner;
use crate::web::protocol::{ClientMessage, Outbound, OutboundSender, ServerMessage, WhiteboardCommand};
use crate::web::speech::SpeechBridge;
use crate::web::state::AppState;
use crate::web::timers::{ScheduledTask, TaskSlot};

pub const GUEST_NOTICE: &str =
    "Guest progress is not saved. Register for an account to save your progress!";

/// One minute of 48 kHz mono PCM16.
const MAX_VOICE_BYTES: usize = 48_000 * 2 * 60;
const AUTOPLAY_TICK: Duration = Duration::from_secs(1);

/// Everything the actor reacts to.
#[derive(Debug)]
pub enum SessionEvent {
    Client(ClientMessage),
    VoiceFrame(Bytes),
    AutoplayTick(u64),
    ReviewElapsed(u64),
    EngagementCheck(u64),
    SimulatedObservation,
    SuggestionReady {
        epoch: u64,
        result: PortResult<String>,
    },
    StepRewritten {
        epoch: u64,
        step_index: usize,
        result: PortResult<String>,
    },
    ChatAnswered(PortResult<ChatReply>),
    ImageReady {
        options: ImageOptions,
        result: PortResult<String>,
    },
    Transcribed(PortResult<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

pub struct Classroom {
    app: Arc<AppState>,
    learner: Learner,
    session_id: Uuid,
    session: LessonSession,
    whiteboard: Whiteboard,
    monitor: EngagementMonitor,
    speech: SpeechBridge,
    out: OutboundSender,
    events: UnboundedSender<SessionEvent>,
    autoplay: TaskSlot,
    review: TaskSlot,
    engagement_check: TaskSlot,
    simulator: TaskSlot,
    voice: Option<Vec<u8>>,
    pending_replies: usize,
    closed: bool,
}

impl Classroom {
    pub fn new(
        app: Arc<AppState>,
        learner: Learner,
        plan: LessonPlan,
        out: OutboundSender,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<Self, SessionError> {
        let session = LessonSession::new(plan, app.config.session_timings())?;
        let speech = SpeechBridge::new(app.tts_adapter.clone(), out.clone());
        Ok(Self {
            app,
            learner,
            session_id: Uuid::new_v4(),
            session,
            whiteboard: Whiteboard::default(),
            monitor: EngagementMonitor::new(),
            speech,
            out,
            events,
            autoplay: TaskSlot::default(),
            review: TaskSlot::default(),
            engagement_check: TaskSlot::default(),
            simulator: TaskSlot::default(),
            voice: None,
            pending_replies: 0,
            closed: false,
        })
    }

    pub fn session(&self) -> &LessonSession {
        &self.session
    }

    /// Sends the initial picture of the classroom. The tutor stays quiet until
    /// the learner first interacts.
    pub fn start(&mut self) {
        info!(
            session_id = %self.session_id,
            learner = %self.learner.label(),
            topic = %self.session.plan().topic,
            steps = self.session.plan().steps.len(),
            "Classroom session started"
        );
        self.send(ServerMessage::SessionInitialized {
            session_id: self.session_id,
            total_steps: self.session.plan().steps.len(),
            guest: self.learner.is_guest(),
        });
        self.send_step(0);
        self.send_whiteboard();
        self.send_engagement();
    }

    pub async fn handle(&mut self, event: SessionEvent) -> Flow {
        match event {
            SessionEvent::Client(message) => return self.handle_client(message).await,
            SessionEvent::VoiceFrame(data) => self.voice_frame(&data),
            SessionEvent::AutoplayTick(generation) => {
                let fx = self.session.autoplay_tick(generation);
                self.apply(fx);
            }
            SessionEvent::ReviewElapsed(epoch) => {
                let fx = self.session.review_elapsed(epoch);
                self.apply(fx);
            }
            SessionEvent::EngagementCheck(epoch) => {
                let fx = self.session.engagement_check_elapsed(epoch);
                self.apply(fx);
            }
            SessionEvent::SimulatedObservation => {
                let event = EngagementSimulator.next_event(&mut rand::thread_rng());
                if self.monitor.record(event) {
                    self.engagement_changed();
                }
            }
            SessionEvent::SuggestionReady { epoch, result } => {
                let fx = self.session.suggestion_received(epoch, result);
                self.apply(fx);
            }
            SessionEvent::StepRewritten {
                epoch,
                step_index,
                result,
            } => {
                let fx = self.session.regeneration_received(epoch, step_index, result);
                self.apply(fx);
            }
            SessionEvent::ChatAnswered(result) => self.chat_answered(result),
            SessionEvent::ImageReady { options, result } => self.image_ready(&options, result),
            SessionEvent::Transcribed(result) => self.transcribed(result),
        }
        Flow::Continue
    }

    async fn handle_client(&mut self, message: ClientMessage) -> Flow {
        match message {
            ClientMessage::Init { .. } => warn!("Received subsequent Init message, which is ignored."),
            ClientMessage::NextStep => {
                let fx = self.session.next_step();
                self.apply(fx);
            }
            ClientMessage::PrevStep => {
                let fx = self.session.prev_step();
                self.apply(fx);
            }
            ClientMessage::AnswerQuiz { is_correct } => match self.session.answer_quiz(is_correct) {
                Ok(fx) => self.apply(fx),
                Err(e) => {
                    warn!("Rejected quiz answer: {}", e);
                    self.send_error(e.to_string());
                }
            },
            ClientMessage::ToggleAutoplay => {
                let fx = self.session.toggle_autoplay();
                self.apply(fx);
            }
            ClientMessage::ToggleMute => {
                let fx = self.session.toggle_mute();
                self.apply(fx);
            }
            ClientMessage::RaiseHand => {
                let fx = self.session.raise_hand();
                self.apply(fx);
            }
            ClientMessage::RegenerateStep => {
                let fx = self.session.regenerate_step();
                self.apply(fx);
            }
            ClientMessage::AcceptSuggestion => {
                let fx = self.session.accept_suggestion();
                self.apply(fx);
            }
            ClientMessage::EndLesson => {
                let fx = self.session.end_lesson();
                self.apply(fx);
            }
            ClientMessage::FinishSession => {
                self.finish_session().await;
                return Flow::Close;
            }
            ClientMessage::Chat { text, image } => self.ask(text, image),
            ClientMessage::VoiceStarted => {
                self.speech.stop();
                self.voice = Some(Vec::new());
            }
            ClientMessage::VoiceEnded => match self.voice.take() {
                Some(audio) => chat_task::spawn_transcription(&self.app, &self.events, audio),
                None => warn!("Received voice_ended without voice_started"),
            },
            ClientMessage::Camera { on } => {
                self.monitor.set_camera(on);
                self.monitor_changed();
            }
            ClientMessage::CameraDenied => {
                self.monitor.camera_denied();
                self.monitor_changed();
            }
            ClientMessage::ModelStatus { loaded } => {
                if loaded {
                    self.monitor.model_loaded();
                } else {
                    warn!("Face model failed to load; simulating engagement");
                    self.monitor.model_failed();
                }
                self.monitor_changed();
            }
            ClientMessage::FaceObservation(observation) => {
                if self.monitor.observe(&observation) {
                    self.engagement_changed();
                }
            }
            ClientMessage::Whiteboard { command } => self.whiteboard_command(command),
            ClientMessage::WhiteboardRendered { image } => self.whiteboard.set_rendered_image(image),
        }
        Flow::Continue
    }

    /// Cancels every timer and any speech. Called when the connection ends.
    pub fn shutdown(&mut self) {
        self.autoplay.cancel();
        self.review.cancel();
        self.engagement_check.cancel();
        self.simulator.cancel();
        self.speech.stop();
        info!(session_id = %self.session_id, "Classroom session closed");
    }

    //=========================================================================================
    // Effects
    //=========================================================================================

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StopSpeech => self.speech.stop(),
                Effect::Speak(text) => self.speech.speak(&text),
                Effect::StartAutoplay { generation } => self.autoplay.set(ScheduledTask::every(
                    AUTOPLAY_TICK,
                    self.events.clone(),
                    move || SessionEvent::AutoplayTick(generation),
                )),
                Effect::CancelAutoplay => self.autoplay.cancel(),
                Effect::AutoplayProgress(percent) => {
                    self.send(ServerMessage::AutoplayProgress { percent })
                }
                Effect::AutoplayChanged(on) => self.send(ServerMessage::AutoplayChanged { on }),
                Effect::MuteChanged(muted) => self.send(ServerMessage::MuteChanged { muted }),
                Effect::ScheduleAdvance { epoch, delay } => self.review.set(ScheduledTask::once(
                    delay,
                    self.events.clone(),
                    SessionEvent::ReviewElapsed(epoch),
                )),
                Effect::ScheduleEngagementCheck { epoch, delay } => {
                    self.engagement_check.set(ScheduledTask::once(
                        delay,
                        self.events.clone(),
                        SessionEvent::EngagementCheck(epoch),
                    ))
                }
                Effect::RequestSuggestion {
                    epoch,
                    content,
                    engagement,
                } => chat_task::spawn_suggestion(&self.app, &self.events, epoch, content, engagement),
                Effect::RequestRegeneration {
                    epoch,
                    step_index,
                    step,
                    engagement,
                } => chat_task::spawn_regeneration(
                    &self.app,
                    &self.events,
                    epoch,
                    step_index,
                    step,
                    engagement,
                ),
                Effect::StepChanged { index } => {
                    self.review.cancel();
                    self.send_step(index);
                }
                Effect::StepUpdated { index, step } => {
                    self.send(ServerMessage::StepUpdated { index, step })
                }
                Effect::ChatAppended(message) => self.send(ServerMessage::ChatMessage { message }),
                Effect::Adapting(active) => self.send(ServerMessage::Adapting { active }),
                Effect::Finished(result) => self.lesson_finished(result),
            }
        }
    }

    fn lesson_finished(&mut self, result: LessonResult) {
        self.review.cancel();
        self.engagement_check.cancel();
        info!(
            session_id = %self.session_id,
            score = result.score,
            xp = result.xp_earned,
            "Lesson finished"
        );
        let report = result.report();
        self.send(ServerMessage::LessonFinished { result, report });
    }

    //=========================================================================================
    // Session end
    //=========================================================================================

    /// Leaves the classroom. A finished lesson is saved for account and local
    /// learners; a guest is told once that nothing was kept.
    async fn finish_session(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shutdown();

        let Some(learner_id) = self.learner.progress_id() else {
            self.send(ServerMessage::GuestNotice {
                message: GUEST_NOTICE.to_string(),
            });
            return;
        };
        let Some(result) = self.session.result().cloned() else {
            debug!("Session left before the lesson finished; nothing to save");
            return;
        };

        match self.save_progress(learner_id, &result).await {
            Ok(stats) => {
                info!(learner = %self.learner.label(), xp = stats.xp, streak = stats.streak, "Progress saved");
                self.send(ServerMessage::ProgressSaved { stats });
            }
            Err(PortError::Unauthorized) => {
                warn!("Auth token expired before progress could be saved");
                self.send(ServerMessage::LoggedOut);
            }
            Err(e) => {
                error!("Failed to save session progress: {:?}", e);
                self.send_error("Failed to save session progress.".to_string());
            }
        }
    }

    async fn save_progress(&self, learner_id: Uuid, result: &LessonResult) -> PortResult<UserStats> {
        if let (Learner::Account { token, .. }, Some(accounts)) = (&self.learner, &self.app.accounts) {
            accounts.validate_auth_token(token).await?;
        }
        self.app
            .progress
            .record_lesson(learner_id, result, Utc::now().date_naive())
            .await
    }

    //=========================================================================================
    // Chat and voice
    //=========================================================================================

    fn ask(&mut self, text: String, image: Option<String>) {
        if text.trim().is_empty() && image.is_none() {
            return;
        }
        let inline = image.as_deref().and_then(InlineImage::from_data_url);
        if image.is_some() && inline.is_none() {
            warn!("Chat image is not a base64 data URL; sending the text only");
        }

        let fx = self.session.post_user_message(&text, image);
        self.apply(fx);
        self.pending_replies += 1;
        self.send(ServerMessage::ChatTyping { typing: true });

        let state = self.whiteboard.get_state();
        let request = ChatRequest {
            message: text,
            lesson_context: self.session.lesson_context(),
            image: inline,
            whiteboard: (!state.is_empty()).then_some(state),
        };
        chat_task::spawn_chat(&self.app, &self.events, request);
    }

    fn chat_answered(&mut self, result: PortResult<ChatReply>) {
        self.pending_replies = self.pending_replies.saturating_sub(1);
        if self.pending_replies == 0 {
            self.send(ServerMessage::ChatTyping { typing: false });
        }

        let reply = result.unwrap_or_else(|_| ChatReply {
            text: CHAT_FALLBACK.to_string(),
            tool_calls: Vec::new(),
        });

        let mut board_changed = false;
        for call in &reply.tool_calls {
            match self.whiteboard.apply_tool_call(call) {
                ToolOutcome::Applied => board_changed = true,
                ToolOutcome::ImageRequested { prompt, options } => {
                    chat_task::spawn_image(&self.app, &self.events, prompt, options)
                }
            }
        }
        if board_changed {
            self.send_whiteboard();
        }
        if !reply.text.trim().is_empty() {
            let fx = self.session.post_ai_message(&reply.text);
            self.apply(fx);
        }
    }

    fn image_ready(&mut self, options: &ImageOptions, result: PortResult<String>) {
        match result {
            Ok(url) => {
                self.whiteboard.add_image(&url, options);
                self.send_whiteboard();
            }
            Err(_) => {
                let fx = self.session.post_ai_message(IMAGE_FALLBACK);
                self.apply(fx);
            }
        }
    }

    fn voice_frame(&mut self, data: &[u8]) {
        let Some(buffer) = self.voice.as_mut() else {
            debug!("Dropping audio frame outside a voice question");
            return;
        };
        if buffer.len() + data.len() > MAX_VOICE_BYTES {
            warn!("Voice question is too long; dropping audio");
            return;
        }
        buffer.extend_from_slice(data);
    }

    fn transcribed(&mut self, result: PortResult<String>) {
        match result {
            Ok(text) if !text.trim().is_empty() => self.ask(text, None),
            _ => {
                let fx = self.session.post_ai_message(TRANSCRIPTION_FALLBACK);
                self.apply(fx);
            }
        }
    }

    //=========================================================================================
    // Engagement
    //=========================================================================================

    /// The camera or the face model changed state.
    fn monitor_changed(&mut self) {
        if self.monitor.wants_simulation() {
            if !self.simulator.is_active() {
                self.simulator.set(ScheduledTask::every(
                    self.app.config.simulation_interval,
                    self.events.clone(),
                    || SessionEvent::SimulatedObservation,
                ));
            }
        } else {
            self.simulator.cancel();
        }
        self.engagement_changed();
    }

    fn engagement_changed(&mut self) {
        let level = self.monitor.level();
        if level != self.session.engagement() {
            debug!(%level, "Engagement level changed");
            let fx = self.session.set_engagement(level);
            self.apply(fx);
        }
        self.send_engagement();
    }

    //=========================================================================================
    // Whiteboard
    //=========================================================================================

    fn whiteboard_command(&mut self, command: WhiteboardCommand) {
        let board = &mut self.whiteboard;
        let result: Result<(), WhiteboardError> = match command {
            WhiteboardCommand::AddText { text, options } => {
                board.add_text(&text, &options);
                Ok(())
            }
            WhiteboardCommand::AddShape {
                shape_type,
                options,
            } => {
                board.add_shape(shape_type, &options);
                Ok(())
            }
            WhiteboardCommand::AddImage { url, options } => {
                board.add_image(&url, &options);
                Ok(())
            }
            WhiteboardCommand::AddVideo { url } => {
                board.add_video(&url);
                Ok(())
            }
            WhiteboardCommand::DrawPath { points } => board.draw_path(points).map(|_| ()),
            WhiteboardCommand::Select { id } => board.select(id),
            WhiteboardCommand::Move { id, left, top } => board.move_object(id, left, top),
            WhiteboardCommand::Erase { id } => board.erase(id),
            WhiteboardCommand::DeleteSelected => {
                board.delete_selected();
                Ok(())
            }
            WhiteboardCommand::KeyDown { key } => {
                board.key_down(&key);
                Ok(())
            }
            WhiteboardCommand::SetTool { tool } => {
                board.set_tool(tool);
                Ok(())
            }
            WhiteboardCommand::SetColor { color } => {
                board.set_color(&color);
                Ok(())
            }
            WhiteboardCommand::SetBrushWidth { width } => {
                board.set_brush_width(width);
                Ok(())
            }
            WhiteboardCommand::Video { id, control } => board.video_control(id, control),
            WhiteboardCommand::Clear => {
                board.clear();
                Ok(())
            }
            WhiteboardCommand::Undo => {
                board.undo();
                Ok(())
            }
            WhiteboardCommand::Redo => {
                board.redo();
                Ok(())
            }
        };

        match result {
            Ok(()) => self.send_whiteboard(),
            Err(e) => {
                warn!("Rejected whiteboard command: {}", e);
                self.send_error(e.to_string());
            }
        }
    }

    //=========================================================================================
    // Outbound
    //=========================================================================================

    fn send(&self, message: ServerMessage) {
        if self.out.send(Outbound::Message(message)).is_err() {
            debug!("Connection writer is gone; dropping message");
        }
    }

    fn send_error(&self, message: String) {
        self.send(ServerMessage::Error { message });
    }

    fn send_step(&self, index: usize) {
        let plan = self.session.plan();
        if let Some(step) = plan.steps.get(index) {
            self.send(ServerMessage::StepChanged {
                index,
                total_steps: plan.steps.len(),
                step: step.clone(),
            });
        }
    }

    fn send_whiteboard(&self) {
        self.send(ServerMessage::WhiteboardUpdated {
            view: self.whiteboard.view(),
        });
    }

    fn send_engagement(&self) {
        self.send(ServerMessage::Engagement {
            level: self.monitor.level(),
            mode: self.monitor.mode(),
            camera_on: self.monitor.camera_on(),
            banner: self.monitor.banner().map(str::to_string),
            camera_error: self.monitor.camera_error().map(str::to_string),
            events: self.monitor.window().events().cloned().collect(),
        });
    }
}

#[cfg(test)]
mod tests;
