//! crates/classroom_core/src/session.rs
//!
//! The lesson session controller.
//!
//! `LessonSession` is a synchronous state machine owned by exactly one task.
//! Every transition mutates the session and returns the [`Effect`]s the runtime
//! must carry out: speech, timers, AI requests and client notifications. Timers
//! and AI requests are tagged with the `epoch` they were issued under; the epoch
//! moves on every step change or in-place step rewrite, so a completion that
//! arrives late is recognised and dropped.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::domain::{ChatMessage, EngagementLevel, LessonPlan, LessonResult, LessonStep, PlanError};
use crate::ports::PortResult;

pub const RAISE_HAND_REPLY: &str = "I see you've raised your hand! What's your question?";
pub const ACCEPT_SUGGESTION_REPLY: &str = "Great! Let's rephrase this...";
pub const SUGGESTION_FALLBACK: &str = "Let's try looking at this from a different angle!";
pub const REGENERATION_FALLBACK: &str =
    "I had a great new idea, but it slipped my mind! Let's continue with our current plan for now.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid lesson plan: {0}")]
    InvalidPlan(#[from] PlanError),
    #[error("The lesson has already finished")]
    Finished,
    #[error("Step {0} is not a quiz")]
    NotAQuiz(usize),
    #[error("Quiz step {0} was already answered")]
    AlreadyAnswered(usize),
}

/// Fixed delays used by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// Pause after a quiz answer before moving on.
    pub quiz_review: Duration,
    /// How long engagement must stay low before a suggestion is requested.
    pub engagement_debounce: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            quiz_review: Duration::from_secs(2),
            engagement_debounce: Duration::from_secs(2),
        }
    }
}

/// Work the runtime performs on behalf of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StopSpeech,
    Speak(String),
    /// Start a one-second ticker; ticks are reported back with this generation.
    StartAutoplay { generation: u64 },
    CancelAutoplay,
    AutoplayProgress(u32),
    AutoplayChanged(bool),
    MuteChanged(bool),
    ScheduleAdvance { epoch: u64, delay: Duration },
    ScheduleEngagementCheck { epoch: u64, delay: Duration },
    RequestSuggestion {
        epoch: u64,
        content: String,
        engagement: EngagementLevel,
    },
    RequestRegeneration {
        epoch: u64,
        step_index: usize,
        step: LessonStep,
        engagement: EngagementLevel,
    },
    StepChanged { index: usize },
    StepUpdated { index: usize, step: LessonStep },
    ChatAppended(ChatMessage),
    Adapting(bool),
    Finished(LessonResult),
}

#[derive(Debug, Clone)]
pub struct LessonSession {
    plan: LessonPlan,
    step_index: usize,
    quiz_answers: Vec<bool>,
    answered_steps: HashSet<usize>,
    review_pending: bool,
    autoplay: bool,
    autoplay_generation: u64,
    autoplay_elapsed: u32,
    muted: bool,
    has_interacted: bool,
    suggestion_made_for_step: bool,
    adapting: bool,
    engagement: EngagementLevel,
    messages: Vec<ChatMessage>,
    result: Option<LessonResult>,
    epoch: u64,
    timings: SessionTimings,
}

impl LessonSession {
    pub fn new(plan: LessonPlan, timings: SessionTimings) -> Result<Self, SessionError> {
        plan.validate()?;
        Ok(Self {
            plan,
            step_index: 0,
            quiz_answers: Vec::new(),
            answered_steps: HashSet::new(),
            review_pending: false,
            autoplay: false,
            autoplay_generation: 0,
            autoplay_elapsed: 0,
            muted: false,
            has_interacted: false,
            suggestion_made_for_step: false,
            adapting: false,
            engagement: EngagementLevel::High,
            messages: Vec::new(),
            result: None,
            epoch: 0,
            timings,
        })
    }

    //=========================================================================================
    // Accessors
    //=========================================================================================

    pub fn plan(&self) -> &LessonPlan {
        &self.plan
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn current_step(&self) -> &LessonStep {
        &self.plan.steps[self.step_index]
    }

    pub fn quiz_answers(&self) -> &[bool] {
        &self.quiz_answers
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    /// Share of the current step's autoplay countdown already elapsed, in percent.
    pub fn autoplay_percent(&self) -> u32 {
        let total = self.current_step().duration_seconds();
        (self.autoplay_elapsed.saturating_mul(100) / total).min(100)
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn has_interacted(&self) -> bool {
        self.has_interacted
    }

    pub fn adapting(&self) -> bool {
        self.adapting
    }

    pub fn engagement(&self) -> EngagementLevel {
        self.engagement
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    pub fn result(&self) -> Option<&LessonResult> {
        self.result.as_ref()
    }

    /// `"<topic> - <step title>"`, the context handed to the AI tutor.
    pub fn lesson_context(&self) -> String {
        format!("{} - {}", self.plan.topic, self.current_step().title)
    }

    //=========================================================================================
    // Navigation
    //=========================================================================================

    pub fn next_step(&mut self) -> Vec<Effect> {
        if self.is_finished() {
            return Vec::new();
        }
        self.mark_interacted();
        let mut fx = vec![Effect::StopSpeech];
        self.stop_autoplay_timer(&mut fx);
        self.review_pending = false;

        if self.step_index + 1 < self.plan.steps.len() {
            self.change_step(self.step_index + 1, &mut fx);
            self.speak_current(&mut fx);
        } else {
            self.finish(&mut fx);
        }
        fx
    }

    pub fn prev_step(&mut self) -> Vec<Effect> {
        if self.is_finished() {
            return Vec::new();
        }
        let first_interaction = self.mark_interacted();
        let mut fx = vec![Effect::StopSpeech];
        self.stop_autoplay_timer(&mut fx);
        self.review_pending = false;

        let moved = self.step_index > 0;
        if moved {
            self.change_step(self.step_index - 1, &mut fx);
        } else if self.autoplay {
            self.start_autoplay_timer(&mut fx);
        }
        if moved || first_interaction {
            self.speak_current(&mut fx);
        }
        fx
    }

    /// Finishes the lesson right away, whatever step it is on.
    pub fn end_lesson(&mut self) -> Vec<Effect> {
        if self.is_finished() {
            return Vec::new();
        }
        self.mark_interacted();
        let mut fx = vec![Effect::StopSpeech];
        self.stop_autoplay_timer(&mut fx);
        self.finish(&mut fx);
        fx
    }

    //=========================================================================================
    // Quizzes
    //=========================================================================================

    /// Records the answer for the current quiz step and opens the review window.
    pub fn answer_quiz(&mut self, is_correct: bool) -> Result<Vec<Effect>, SessionError> {
        if self.is_finished() {
            return Err(SessionError::Finished);
        }
        if !self.current_step().is_quiz() {
            return Err(SessionError::NotAQuiz(self.step_index));
        }
        if !self.answered_steps.insert(self.step_index) {
            return Err(SessionError::AlreadyAnswered(self.step_index));
        }
        self.quiz_answers.push(is_correct);
        self.review_pending = true;
        Ok(vec![Effect::ScheduleAdvance {
            epoch: self.epoch,
            delay: self.timings.quiz_review,
        }])
    }

    /// The quiz review window closed.
    pub fn review_elapsed(&mut self, epoch: u64) -> Vec<Effect> {
        if epoch != self.epoch || !self.review_pending {
            debug!(epoch, current = self.epoch, "Dropping stale quiz review timer");
            return Vec::new();
        }
        self.review_pending = false;
        self.next_step()
    }

    //=========================================================================================
    // Autoplay, speech
    //=========================================================================================

    pub fn toggle_autoplay(&mut self) -> Vec<Effect> {
        if self.is_finished() {
            return Vec::new();
        }
        let first_interaction = self.mark_interacted();
        self.autoplay = !self.autoplay;
        let mut fx = vec![Effect::AutoplayChanged(self.autoplay)];
        if self.autoplay {
            self.start_autoplay_timer(&mut fx);
        } else {
            self.stop_autoplay_timer(&mut fx);
        }
        if first_interaction {
            self.speak_current(&mut fx);
        }
        fx
    }

    /// One second of autoplay passed.
    pub fn autoplay_tick(&mut self, generation: u64) -> Vec<Effect> {
        if !self.autoplay || self.is_finished() || generation != self.autoplay_generation {
            return Vec::new();
        }
        self.autoplay_elapsed += 1;
        let mut fx = vec![Effect::AutoplayProgress(self.autoplay_percent())];
        if self.autoplay_elapsed >= self.current_step().duration_seconds() {
            fx.extend(self.next_step());
        }
        fx
    }

    pub fn toggle_mute(&mut self) -> Vec<Effect> {
        self.mark_interacted();
        self.muted = !self.muted;
        let mut fx = vec![Effect::MuteChanged(self.muted)];
        if self.muted {
            fx.push(Effect::StopSpeech);
        } else {
            self.speak_current(&mut fx);
        }
        fx
    }

    //=========================================================================================
    // Engagement and adaptation
    //=========================================================================================

    /// Takes a new engagement reading; a low one arms the debounced check.
    pub fn set_engagement(&mut self, level: EngagementLevel) -> Vec<Effect> {
        self.engagement = level;
        self.engagement_check(Vec::new())
    }

    /// The engagement debounce elapsed. Requests at most one suggestion per step.
    pub fn engagement_check_elapsed(&mut self, epoch: u64) -> Vec<Effect> {
        if epoch != self.epoch
            || self.is_finished()
            || self.adapting
            || self.suggestion_made_for_step
            || self.engagement != EngagementLevel::Low
        {
            return Vec::new();
        }
        self.suggestion_made_for_step = true;
        let mut fx = vec![Effect::StopSpeech];
        self.pause_autoplay(&mut fx);
        fx.push(Effect::RequestSuggestion {
            epoch: self.epoch,
            content: self.current_step().content.clone(),
            engagement: self.engagement,
        });
        fx
    }

    /// Adds the adaptive suggestion to the chat, offering a rewrite of the step.
    pub fn suggestion_received(&mut self, epoch: u64, suggestion: PortResult<String>) -> Vec<Effect> {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "Dropping stale adaptive suggestion");
            return Vec::new();
        }
        let text = suggestion.unwrap_or_else(|_| SUGGESTION_FALLBACK.to_string());
        vec![self.append(ChatMessage::ai_with_regenerate_offer(text))]
    }

    /// Asks the AI to rewrite the current step in place.
    pub fn regenerate_step(&mut self) -> Vec<Effect> {
        if self.is_finished() || self.adapting || self.review_pending {
            return Vec::new();
        }
        self.mark_interacted();
        self.adapting = true;
        vec![
            Effect::StopSpeech,
            Effect::Adapting(true),
            Effect::RequestRegeneration {
                epoch: self.epoch,
                step_index: self.step_index,
                step: self.current_step().clone(),
                engagement: self.engagement,
            },
        ]
    }

    /// Applies rewritten step content. Title, type and duration are kept.
    pub fn regeneration_received(
        &mut self,
        epoch: u64,
        step_index: usize,
        content: PortResult<String>,
    ) -> Vec<Effect> {
        if !self.adapting {
            return Vec::new();
        }
        self.adapting = false;
        let mut fx = vec![Effect::Adapting(false)];

        if epoch != self.epoch || step_index != self.step_index {
            debug!(epoch, current = self.epoch, "Dropping stale step rewrite");
            return fx;
        }
        match content {
            Ok(content) => {
                self.plan.steps[step_index].content = content;
                self.epoch += 1;
                fx.push(Effect::StepUpdated {
                    index: step_index,
                    step: self.plan.steps[step_index].clone(),
                });
                self.speak_current(&mut fx);
            }
            Err(_) => fx.push(self.append(ChatMessage::ai(REGENERATION_FALLBACK))),
        }
        fx
    }

    pub fn accept_suggestion(&mut self) -> Vec<Effect> {
        if self.is_finished() {
            return Vec::new();
        }
        let mut fx = vec![self.append(ChatMessage::ai(ACCEPT_SUGGESTION_REPLY))];
        fx.extend(self.regenerate_step());
        fx
    }

    //=========================================================================================
    // Chat
    //=========================================================================================

    pub fn raise_hand(&mut self) -> Vec<Effect> {
        self.mark_interacted();
        let mut fx = vec![Effect::StopSpeech];
        self.pause_autoplay(&mut fx);
        fx.push(self.append(ChatMessage::ai(RAISE_HAND_REPLY)));
        fx
    }

    pub fn post_user_message(&mut self, text: &str, image_url: Option<String>) -> Vec<Effect> {
        vec![self.append(ChatMessage::user(text, image_url))]
    }

    pub fn post_ai_message(&mut self, text: &str) -> Vec<Effect> {
        vec![self.append(ChatMessage::ai(text))]
    }

    //=========================================================================================
    // Internals
    //=========================================================================================

    /// Returns true the first time the learner interacts.
    fn mark_interacted(&mut self) -> bool {
        !std::mem::replace(&mut self.has_interacted, true)
    }

    fn change_step(&mut self, index: usize, fx: &mut Vec<Effect>) {
        self.step_index = index;
        self.epoch += 1;
        self.suggestion_made_for_step = false;
        fx.push(Effect::StepChanged { index });
        if self.autoplay {
            self.start_autoplay_timer(fx);
        }
        let checks = self.engagement_check(Vec::new());
        fx.extend(checks);
    }

    fn engagement_check(&self, mut fx: Vec<Effect>) -> Vec<Effect> {
        if self.engagement == EngagementLevel::Low && !self.is_finished() {
            fx.push(Effect::ScheduleEngagementCheck {
                epoch: self.epoch,
                delay: self.timings.engagement_debounce,
            });
        }
        fx
    }

    fn speak_current(&self, fx: &mut Vec<Effect>) {
        if self.has_interacted && !self.muted && !self.is_finished() {
            fx.push(Effect::Speak(self.current_step().spoken_text()));
        }
    }

    fn start_autoplay_timer(&mut self, fx: &mut Vec<Effect>) {
        self.autoplay_generation += 1;
        self.autoplay_elapsed = 0;
        fx.push(Effect::AutoplayProgress(0));
        fx.push(Effect::StartAutoplay {
            generation: self.autoplay_generation,
        });
    }

    fn stop_autoplay_timer(&mut self, fx: &mut Vec<Effect>) {
        self.autoplay_generation += 1;
        self.autoplay_elapsed = 0;
        fx.push(Effect::CancelAutoplay);
        fx.push(Effect::AutoplayProgress(0));
    }

    fn pause_autoplay(&mut self, fx: &mut Vec<Effect>) {
        if self.autoplay {
            self.autoplay = false;
            self.stop_autoplay_timer(fx);
            fx.push(Effect::AutoplayChanged(false));
        }
    }

    fn finish(&mut self, fx: &mut Vec<Effect>) {
        if self.autoplay {
            self.autoplay = false;
            fx.push(Effect::AutoplayChanged(false));
        }
        self.adapting = false;
        self.review_pending = false;
        let result = LessonResult::from_plan(&self.plan, &self.quiz_answers, Utc::now());
        self.result = Some(result.clone());
        fx.push(Effect::Finished(result));
    }

    fn append(&mut self, message: ChatMessage) -> Effect {
        self.messages.push(message.clone());
        Effect::ChatAppended(message)
    }
}
