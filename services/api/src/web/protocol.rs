//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser classroom and the
//! API server.

use classroom_core::domain::{
    BehavioralEvent, ChatMessage, EngagementLevel, LessonPlan, LessonResult, LessonStep,
    UserStats,
};
use classroom_core::engagement::{FaceObservation, MonitorMode, Point};
use classroom_core::whiteboard::{
    ImageOptions, ObjectId, ShapeOptions, ShapeType, TextOptions, Tool, VideoAction,
    WhiteboardView,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================
// NOTE: Voice questions are sent as raw Binary PCM16 frames between `voice_started`
// and `voice_ended`, not as part of this enum.
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Starts the lesson. This must be the first message sent on the connection.
    Init { lesson_plan: LessonPlan },

    NextStep,
    PrevStep,
    AnswerQuiz { is_correct: bool },
    ToggleAutoplay,
    ToggleMute,
    RaiseHand,
    RegenerateStep,
    AcceptSuggestion,
    /// Ends the lesson early and shows the result.
    EndLesson,
    /// Leaves the classroom, saving the result if the lesson finished.
    FinishSession,

    /// A typed question, optionally with an uploaded picture as a data URL.
    Chat {
        text: String,
        #[serde(default)]
        image: Option<String>,
    },

    /// The learner pressed the microphone; PCM frames follow.
    VoiceStarted,
    VoiceEnded,

    Camera { on: bool },
    CameraDenied,
    ModelStatus { loaded: bool },
    FaceObservation(FaceObservation),

    Whiteboard { command: WhiteboardCommand },
    /// A PNG screenshot of the canvas, used as context for the tutor.
    WhiteboardRendered { image: String },
}

/// Learner edits to the shared whiteboard.
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WhiteboardCommand {
    AddText {
        text: String,
        #[serde(default)]
        options: TextOptions,
    },
    AddShape {
        shape_type: ShapeType,
        #[serde(default)]
        options: ShapeOptions,
    },
    AddImage {
        url: String,
        #[serde(default)]
        options: ImageOptions,
    },
    AddVideo { url: String },
    DrawPath { points: Vec<Point> },
    Select { id: Option<ObjectId> },
    Move { id: ObjectId, left: f64, top: f64 },
    Erase { id: ObjectId },
    DeleteSelected,
    KeyDown { key: String },
    SetTool { tool: Tool },
    SetColor { color: String },
    SetBrushWidth { width: f64 },
    Video { id: ObjectId, control: VideoAction },
    Clear,
    Undo,
    Redo,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================
// NOTE: The tutor's voice is sent as raw Binary MP3 frames right after
// `speech_started`. These messages provide context for that audio.
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Confirms the lesson plan was accepted.
    SessionInitialized {
        session_id: Uuid,
        total_steps: usize,
        guest: bool,
    },

    StepChanged {
        index: usize,
        total_steps: usize,
        step: LessonStep,
    },
    /// The current step was rewritten in place.
    StepUpdated { index: usize, step: LessonStep },

    AutoplayProgress { percent: u32 },
    AutoplayChanged { on: bool },
    MuteChanged { muted: bool },

    /// An MP3 frame for this utterance follows.
    SpeechStarted { utterance: u64 },
    /// The utterance was cancelled; the client should stop playback.
    SpeechEnded { utterance: u64 },

    ChatMessage { message: ChatMessage },
    /// The tutor is composing an answer.
    ChatTyping { typing: bool },
    Adapting { active: bool },

    Engagement {
        level: EngagementLevel,
        mode: MonitorMode,
        camera_on: bool,
        banner: Option<String>,
        camera_error: Option<String>,
        events: Vec<BehavioralEvent>,
    },

    WhiteboardUpdated { view: WhiteboardView },

    LessonFinished { result: LessonResult, report: String },
    ProgressSaved { stats: UserStats },
    GuestNotice { message: String },
    /// The auth token is no longer valid; the client must sign in again.
    LoggedOut,

    /// Reports an error to the client, which should display it.
    Error { message: String },
}

//=========================================================================================
// Outbound Frames
//=========================================================================================

/// A frame queued for the connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    Message(ServerMessage),
    Audio(Bytes),
}

pub type OutboundSender = UnboundedSender<Outbound>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_snake_case_tags_and_camel_case_fields() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"answer_quiz","isCorrect":true}"#).unwrap();
        assert!(matches!(msg, ClientMessage::AnswerQuiz { is_correct: true }));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"chat","text":"Why?"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Chat { image: None, .. }));
    }

    #[test]
    fn face_observations_are_flattened_into_the_message() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"face_observation","landmarks":null,"expressions":{"happy":0.9}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::FaceObservation(observation) => {
                assert!(observation.landmarks.is_none());
                assert_eq!(observation.expressions.get("happy"), Some(&0.9));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn whiteboard_commands_parse() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"whiteboard","command":{"action":"add_shape","shapeType":"circle","options":{"radius":30}}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Whiteboard {
                command: WhiteboardCommand::AddShape { shape_type, options },
            } => {
                assert_eq!(shape_type, ShapeType::Circle);
                assert_eq!(options.radius, Some(30.0));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn server_messages_serialize_with_type_tag() {
        let json = serde_json::to_value(ServerMessage::AutoplayProgress { percent: 40 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "autoplay_progress", "percent": 40}));

        let json = serde_json::to_value(ServerMessage::LoggedOut).unwrap();
        assert_eq!(json, serde_json::json!({"type": "logged_out"}));
    }
}
