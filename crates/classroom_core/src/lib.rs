pub mod domain;
pub mod engagement;
pub mod ports;
pub mod progress;
pub mod scoring;
pub mod session;
pub mod speech;
pub mod whiteboard;

pub use domain::{
    BehaviorEventKind, BehavioralEvent, ChatMessage, EngagementLevel, LessonPlan, LessonResult,
    LessonStep, LessonStepType, Preferences, QuizOption, Theme, UserStats,
};
pub use ports::{
    AccountService, LessonContentService, PortError, PortResult, ProgressStore,
    SpeechToTextService, TextToSpeechService,
};
pub use session::{Effect, LessonSession, SessionError, SessionTimings};
pub use whiteboard::{ToolCall, Whiteboard, WhiteboardState};
