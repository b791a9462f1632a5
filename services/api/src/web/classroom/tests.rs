use super::*;
use crate::test_support::{offline_context, online_context, sample_plan, FakeContent, TestContext};
use classroom_core::domain::{EngagementLevel, Sender};
use classroom_core::engagement::{FaceObservation, MonitorMode, Point};
use classroom_core::ports::{AccountService, ProgressStore};
use classroom_core::whiteboard::{TextOptions, Tool, ToolCall};
use tokio::sync::mpsc::{self, UnboundedReceiver};

struct Harness {
    classroom: Classroom,
    out: UnboundedReceiver<Outbound>,
    events: UnboundedReceiver<SessionEvent>,
    ctx: TestContext,
}

impl Harness {
    fn new(ctx: TestContext, learner: Learner) -> Self {
        let (out_tx, out) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let mut classroom = Classroom::new(
            ctx.state.clone(),
            learner,
            sample_plan("Colours"),
            out_tx,
            events_tx,
        )
        .expect("valid plan");
        classroom.start();
        Self {
            classroom,
            out,
            events,
            ctx,
        }
    }

    async fn client(&mut self, message: ClientMessage) -> Flow {
        self.classroom.handle(SessionEvent::Client(message)).await
    }

    /// Handles the next event the session's timers or background tasks post.
    async fn pump(&mut self) {
        let event = tokio::time::timeout(Duration::from_secs(30), self.events.recv())
            .await
            .expect("an event within 30s")
            .expect("event channel open");
        self.classroom.handle(event).await;
    }

    /// Every JSON message sent so far; audio frames are skipped.
    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(frame) = self.out.try_recv() {
            if let Outbound::Message(message) = frame {
                messages.push(message);
            }
        }
        messages
    }

    fn chat_texts(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::ChatMessage { message } => Some(message.text),
                _ => None,
            })
            .collect()
    }
}

#[tokio::test]
async fn start_describes_the_classroom() {
    let mut h = Harness::new(offline_context(FakeContent::default()).await, Learner::Local);
    let messages = h.drain();

    assert!(matches!(
        messages[0],
        ServerMessage::SessionInitialized {
            total_steps: 3,
            guest: false,
            ..
        }
    ));
    assert!(matches!(
        messages[1],
        ServerMessage::StepChanged {
            index: 0,
            total_steps: 3,
            ..
        }
    ));
    assert!(matches!(messages[2], ServerMessage::WhiteboardUpdated { .. }));
    assert!(matches!(
        messages[3],
        ServerMessage::Engagement {
            level: EngagementLevel::High,
            mode: MonitorMode::Loading,
            camera_on: false,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn quiz_answer_advances_after_the_review_window() {
    let mut h = Harness::new(offline_context(FakeContent::default()).await, Learner::Local);
    h.client(ClientMessage::NextStep).await;
    h.client(ClientMessage::AnswerQuiz { is_correct: true }).await;
    h.drain();

    h.pump().await;
    assert_eq!(h.classroom.session().step_index(), 2);
    assert_eq!(h.classroom.session().quiz_answers(), &[true]);
    assert!(h
        .drain()
        .iter()
        .any(|m| matches!(m, ServerMessage::StepChanged { index: 2, .. })));

    h.client(ClientMessage::AnswerQuiz { is_correct: false }).await;
    assert!(h
        .drain()
        .iter()
        .any(|m| matches!(m, ServerMessage::Error { .. })));
}

#[tokio::test]
async fn finishing_saves_progress_for_the_local_learner() {
    let mut h = Harness::new(offline_context(FakeContent::default()).await, Learner::Local);
    h.client(ClientMessage::EndLesson).await;
    let result = h.classroom.session().result().cloned().expect("finished");
    assert!(h
        .drain()
        .iter()
        .any(|m| matches!(m, ServerMessage::LessonFinished { .. })));

    let flow = h.client(ClientMessage::FinishSession).await;
    assert_eq!(flow, Flow::Close);

    let saved = h.drain().into_iter().find_map(|m| match m {
        ServerMessage::ProgressSaved { stats } => Some(stats),
        _ => None,
    });
    let stats = saved.expect("progress_saved");
    assert_eq!(stats.xp, result.xp_earned);
    assert_eq!(stats.streak, 1);

    let history = h.ctx.store.get_history(LOCAL_ID).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].topic, "Colours");
}

const LOCAL_ID: Uuid = crate::adapters::LOCAL_LEARNER_ID;

#[tokio::test]
async fn guests_are_told_nothing_is_saved() {
    let mut h = Harness::new(offline_context(FakeContent::default()).await, Learner::Guest);
    h.client(ClientMessage::EndLesson).await;
    h.client(ClientMessage::FinishSession).await;

    let notices = h
        .drain()
        .into_iter()
        .filter(|m| matches!(m, ServerMessage::GuestNotice { .. }))
        .count();
    assert_eq!(notices, 1);
    assert!(h.ctx.store.get_history(LOCAL_ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn an_expired_token_logs_the_learner_out() {
    let ctx = online_context(FakeContent::default()).await;
    let accounts = ctx.accounts.clone().expect("accounts");
    let user_id = Uuid::new_v4();
    accounts
        .create_auth_token("live-token", user_id, Utc::now() + chrono::Duration::days(1))
        .await
        .unwrap();
    let learner = Learner::Account {
        user_id,
        token: "live-token".to_string(),
    };

    let mut h = Harness::new(ctx, learner);
    h.client(ClientMessage::EndLesson).await;
    accounts.expire_all();
    h.client(ClientMessage::FinishSession).await;

    assert!(h
        .drain()
        .iter()
        .any(|m| matches!(m, ServerMessage::LoggedOut)));
    assert!(h.ctx.store.get_history(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn tutor_replies_can_draw_on_the_whiteboard() {
    let content = FakeContent {
        chat: std::sync::Mutex::new(Some(ChatReply {
            text: "Red and blue make purple!".to_string(),
            tool_calls: vec![
                ToolCall::AddText {
                    text: "red + blue = purple".to_string(),
                    options: TextOptions::default(),
                },
                ToolCall::AddImage {
                    prompt: "a purple paint splash".to_string(),
                    options: ImageOptions::default(),
                },
            ],
        })),
        image: Some("data:image/png;base64,AAAA".to_string()),
        ..FakeContent::default()
    };
    let mut h = Harness::new(offline_context(content).await, Learner::Local);
    h.drain();

    h.client(ClientMessage::Chat {
        text: "What makes purple?".to_string(),
        image: None,
    })
    .await;
    let messages = h.drain();
    assert!(matches!(
        &messages[0],
        ServerMessage::ChatMessage { message } if message.sender == Sender::User
    ));
    assert!(matches!(messages[1], ServerMessage::ChatTyping { typing: true }));

    h.pump().await;
    let messages = h.drain();
    assert!(matches!(messages[0], ServerMessage::ChatTyping { typing: false }));
    assert!(messages
        .iter()
        .any(|m| matches!(m, ServerMessage::WhiteboardUpdated { view } if view.objects.len() == 1)));
    assert!(messages.iter().any(|m| matches!(
        m,
        ServerMessage::ChatMessage { message } if message.text == "Red and blue make purple!"
    )));

    h.pump().await;
    assert_eq!(h.classroom.whiteboard.objects().len(), 2);

    let requests = h.ctx.content.chat_requests.lock().unwrap();
    assert_eq!(requests[0].lesson_context, "Colours - Welcome");
    assert!(requests[0].whiteboard.is_none());
}

#[tokio::test]
async fn failed_ai_calls_fall_back_to_friendly_messages() {
    let content = FakeContent {
        chat: std::sync::Mutex::new(Some(ChatReply {
            text: String::new(),
            tool_calls: vec![ToolCall::AddImage {
                prompt: "a volcano".to_string(),
                options: ImageOptions::default(),
            }],
        })),
        ..FakeContent::default()
    };
    let mut h = Harness::new(offline_context(content).await, Learner::Local);
    h.client(ClientMessage::Chat {
        text: "Show me a volcano".to_string(),
        image: None,
    })
    .await;
    h.pump().await;
    h.pump().await;
    assert!(h.chat_texts().contains(&IMAGE_FALLBACK.to_string()));

    *h.ctx.content.chat.lock().unwrap() = None;
    h.client(ClientMessage::Chat {
        text: "Are you there?".to_string(),
        image: None,
    })
    .await;
    h.pump().await;
    assert!(h.chat_texts().contains(&CHAT_FALLBACK.to_string()));
}

#[tokio::test(start_paused = true)]
async fn sustained_low_engagement_offers_a_suggestion() {
    let content = FakeContent {
        suggestion: Some("Let's paint a rainbow together!".to_string()),
        ..FakeContent::default()
    };
    let mut h = Harness::new(offline_context(content).await, Learner::Local);
    h.client(ClientMessage::ModelStatus { loaded: true }).await;
    h.client(ClientMessage::Camera { on: true }).await;
    h.client(ClientMessage::FaceObservation(FaceObservation::default()))
        .await;
    assert_eq!(h.classroom.session().engagement(), EngagementLevel::Low);
    h.drain();

    h.pump().await; // debounce elapsed
    h.pump().await; // suggestion arrived
    let suggestion = h.drain().into_iter().find_map(|m| match m {
        ServerMessage::ChatMessage { message } => Some(message),
        _ => None,
    });
    let suggestion = suggestion.expect("suggestion message");
    assert_eq!(suggestion.text, "Let's paint a rainbow together!");
    assert!(suggestion.suggestion.is_some());
}

#[tokio::test]
async fn simulator_runs_only_while_the_camera_is_on() {
    let mut h = Harness::new(offline_context(FakeContent::default()).await, Learner::Local);
    h.client(ClientMessage::ModelStatus { loaded: false }).await;
    assert!(!h.classroom.simulator.is_active());

    h.client(ClientMessage::Camera { on: true }).await;
    assert!(h.classroom.simulator.is_active());
    assert!(h.drain().iter().any(|m| matches!(
        m,
        ServerMessage::Engagement { mode: MonitorMode::Simulated, banner: Some(_), .. }
    )));

    h.client(ClientMessage::Camera { on: false }).await;
    assert!(!h.classroom.simulator.is_active());
}

#[tokio::test]
async fn voice_questions_are_transcribed_into_chat() {
    let mut h = Harness::new(offline_context(FakeContent::default()).await, Learner::Local);
    h.client(ClientMessage::VoiceStarted).await;
    h.classroom
        .handle(SessionEvent::VoiceFrame(Bytes::from(vec![0u8; 3200])))
        .await;
    h.client(ClientMessage::VoiceEnded).await;
    h.drain();

    h.pump().await; // transcription
    h.pump().await; // tutor reply (unscripted, so the fallback)
    let texts = h.chat_texts();
    assert_eq!(texts, ["What is purple?", CHAT_FALLBACK]);
}

#[tokio::test]
async fn whiteboard_commands_are_validated() {
    let mut h = Harness::new(offline_context(FakeContent::default()).await, Learner::Local);
    h.drain();
    let stroke = vec![Point { x: 1.0, y: 1.0 }, Point { x: 20.0, y: 30.0 }];

    h.client(ClientMessage::Whiteboard {
        command: WhiteboardCommand::DrawPath {
            points: stroke.clone(),
        },
    })
    .await;
    assert!(matches!(h.drain()[0], ServerMessage::Error { .. }));

    h.client(ClientMessage::Whiteboard {
        command: WhiteboardCommand::SetTool { tool: Tool::Pen },
    })
    .await;
    h.client(ClientMessage::Whiteboard {
        command: WhiteboardCommand::DrawPath { points: stroke },
    })
    .await;
    h.client(ClientMessage::Whiteboard {
        command: WhiteboardCommand::Undo,
    })
    .await;

    let last_view = h.drain().into_iter().rev().find_map(|m| match m {
        ServerMessage::WhiteboardUpdated { view } => Some(view),
        _ => None,
    });
    let view = last_view.expect("whiteboard view");
    assert!(view.objects.is_empty());
    assert!(view.can_redo);
}
