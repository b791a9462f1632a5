//! crates/classroom_core/src/domain.rs
//!
//! Defines the pure, core data structures for the classroom.
//! These structs carry serde derives so they can cross the wire to the browser
//! client unchanged, but they hold no I/O of their own.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// XP needed to climb one level.
pub const XP_PER_LEVEL: u32 = 100;

/// Longest step a lesson plan may ask for, in minutes.
pub const MAX_STEP_MINUTES: u32 = 180;

//=========================================================================================
// Lesson Plans
//=========================================================================================

/// The kind of content a lesson step carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonStepType {
    Lecture,
    Image,
    Quiz,
    Activity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOption {
    pub option: String,
    pub is_correct: bool,
}

/// A single step of a generated lesson.
///
/// `content` is the lecture text for lectures, an image prompt for image steps,
/// the question for quizzes and the instructions for activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonStep {
    pub title: String,
    #[serde(rename = "type")]
    pub step_type: LessonStepType,
    pub content: String,
    /// Estimated duration in minutes.
    pub duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_options: Option<Vec<QuizOption>>,
}

impl LessonStep {
    pub fn is_quiz(&self) -> bool {
        self.step_type == LessonStepType::Quiz
    }

    /// The text read aloud for this step. Quiz steps append their options.
    pub fn spoken_text(&self) -> String {
        match (&self.step_type, &self.quiz_options) {
            (LessonStepType::Quiz, Some(options)) if !options.is_empty() => {
                let listed: Vec<&str> = options.iter().map(|o| o.option.as_str()).collect();
                format!("{} Your options are: {}", self.content, listed.join(", "))
            }
            _ => self.content.clone(),
        }
    }

    /// Autoplay length of the step. A zero duration counts as one minute.
    pub fn duration_seconds(&self) -> u32 {
        self.duration.max(1).saturating_mul(60)
    }
}

/// Reasons a generated lesson plan is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("Lesson plan has no steps")]
    NoSteps,
    #[error("Quiz step {0} needs at least two options")]
    TooFewOptions(usize),
    #[error("Quiz step {index} must have exactly one correct option, found {found}")]
    CorrectOptionCount { index: usize, found: usize },
    #[error("Step {index} lasts {minutes} minutes, longer than the {MAX_STEP_MINUTES} minute limit")]
    StepTooLong { index: usize, minutes: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPlan {
    pub subject: String,
    pub grade: String,
    pub topic: String,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    pub steps: Vec<LessonStep>,
}

impl LessonPlan {
    pub fn quiz_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_quiz()).count()
    }

    /// Checks the structural invariants the generator is asked for but never enforces.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.steps.is_empty() {
            return Err(PlanError::NoSteps);
        }
        if let Some((index, step)) = self
            .steps
            .iter()
            .enumerate()
            .find(|(_, s)| s.duration > MAX_STEP_MINUTES)
        {
            return Err(PlanError::StepTooLong {
                index,
                minutes: step.duration,
            });
        }
        for (index, step) in self.steps.iter().enumerate().filter(|(_, s)| s.is_quiz()) {
            let options = step.quiz_options.as_deref().unwrap_or_default();
            if options.len() < 2 {
                return Err(PlanError::TooFewOptions(index));
            }
            let found = options.iter().filter(|o| o.is_correct).count();
            if found != 1 {
                return Err(PlanError::CorrectOptionCount { index, found });
            }
        }
        Ok(())
    }
}

//=========================================================================================
// Results and Progress
//=========================================================================================

/// Snapshot of a completed session, appended to the learner's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonResult {
    pub id: Uuid,
    pub topic: String,
    pub subject: String,
    pub grade: String,
    pub score: u32,
    pub correct_answers: u32,
    pub total_quizzes: u32,
    pub completed_at: DateTime<Utc>,
    pub lesson_plan: LessonPlan,
    pub xp_earned: u32,
}

impl LessonResult {
    /// Short human-readable report of the result.
    pub fn report(&self) -> String {
        format!(
            "Report for {}:\nScore: {}%\nXP Earned: {}\nCompleted: {}",
            self.topic,
            self.score,
            self.xp_earned,
            self.completed_at.format("%Y-%m-%d %H:%M UTC"),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub xp: u32,
    pub level: u32,
    pub streak: u32,
    pub last_lesson_date: Option<NaiveDate>,
}

impl Default for UserStats {
    fn default() -> Self {
        Self {
            xp: 0,
            level: 1,
            streak: 0,
            last_lesson_date: None,
        }
    }
}

impl UserStats {
    /// XP collected inside the current level.
    pub fn level_progress(&self) -> u32 {
        self.xp % XP_PER_LEVEL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Preferences {
    pub theme: Theme,
}

//=========================================================================================
// Chat
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionAction {
    Regenerate,
}

/// An action offered alongside an AI chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub label: String,
    pub action: SuggestionAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Suggestion>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>, image_url: Option<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            image_url,
            suggestion: None,
        }
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Ai,
            text: text.into(),
            image_url: None,
            suggestion: None,
        }
    }

    /// An AI line offering to rewrite the current step.
    pub fn ai_with_regenerate_offer(text: impl Into<String>) -> Self {
        Self {
            suggestion: Some(Suggestion {
                label: "Yes, let's try another way!".to_string(),
                action: SuggestionAction::Regenerate,
            }),
            ..Self::ai(text)
        }
    }
}

//=========================================================================================
// Engagement
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngagementLevel {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EngagementLevel::High => "High",
            EngagementLevel::Medium => "Medium",
            EngagementLevel::Low => "Low",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorEventKind {
    Positive,
    Neutral,
    Distracted,
}

impl BehaviorEventKind {
    /// Weight used by the rolling engagement average.
    pub fn weight(self) -> f64 {
        match self {
            BehaviorEventKind::Positive => 2.0,
            BehaviorEventKind::Neutral => 1.0,
            BehaviorEventKind::Distracted => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehavioralEvent {
    #[serde(rename = "type")]
    pub kind: BehaviorEventKind,
    pub description: String,
    pub icon: String,
    pub timestamp: DateTime<Utc>,
}

impl BehavioralEvent {
    pub fn new(kind: BehaviorEventKind, description: impl Into<String>, icon: &str) -> Self {
        Self {
            kind,
            description: description.into(),
            icon: icon.to_string(),
            timestamp: Utc::now(),
        }
    }
}
