//! services/api/src/web/ws_handler.rs
//!
//! The entry point for a classroom WebSocket connection. It waits for the
//! lesson plan, then pumps socket frames and session events into the
//! `Classroom` actor until either side closes.

use crate::web::{
    classroom::{Classroom, Flow, SessionEvent},
    middleware::Learner,
    protocol::{ClientMessage, Outbound, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, SplitStream, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{error, info, warn};

/// How long the writer gets to flush the last messages after the session ends.
const WRITER_DRAIN: Duration = Duration::from_secs(2);

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(learner): Extension<Learner>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, learner))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, learner: Learner) {
    info!(learner = %learner.label(), "New WebSocket connection established");

    let (sender, mut receiver) = socket.split();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_outbound(sender, out_rx));

    // --- 1. Initialization Phase ---
    let plan = match receiver.next().await {
        Some(Ok(Message::Text(init_json))) => {
            match serde_json::from_str::<ClientMessage>(&init_json) {
                Ok(ClientMessage::Init { lesson_plan }) => Some(lesson_plan),
                Ok(_) => {
                    error!("First message was not an Init message.");
                    None
                }
                Err(e) => {
                    error!("Failed to deserialize Init message: {}", e);
                    None
                }
            }
        }
        _ => {
            info!("Client disconnected before sending Init message.");
            return;
        }
    };
    let Some(plan) = plan else {
        let _ = out_tx.send(Outbound::Message(ServerMessage::Error {
            message: "The first message must start a lesson.".to_string(),
        }));
        drop(out_tx);
        finish_writer(writer).await;
        return;
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut classroom =
        match Classroom::new(app_state, learner, plan, out_tx.clone(), events_tx.clone()) {
            Ok(classroom) => classroom,
            Err(e) => {
                warn!("Rejected lesson plan: {}", e);
                let _ = out_tx.send(Outbound::Message(ServerMessage::Error {
                    message: format!("This lesson cannot be started: {}", e),
                }));
                drop(out_tx);
                finish_writer(writer).await;
                return;
            }
        };
    classroom.start();

    // --- 2. Main Event Loop ---
    run_session(&mut classroom, &mut receiver, &mut events_rx).await;

    // --- 3. Cleanup ---
    classroom.shutdown();
    drop(classroom);
    drop(events_tx);
    drop(out_tx);
    finish_writer(writer).await;
    info!("WebSocket connection closed.");
}

async fn run_session(
    classroom: &mut Classroom,
    receiver: &mut SplitStream<WebSocket>,
    events_rx: &mut UnboundedReceiver<SessionEvent>,
) {
    loop {
        let event = tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Init { .. }) => {
                            warn!("Received subsequent Init message, which is ignored.");
                            continue;
                        }
                        Ok(msg) => SessionEvent::Client(msg),
                        Err(e) => {
                            warn!("Failed to deserialize client message: {}", e);
                            continue;
                        }
                    }
                }
                Some(Ok(Message::Binary(data))) => SessionEvent::VoiceFrame(data),
                Some(Ok(Message::Close(_))) => {
                    info!("Client sent close message.");
                    break;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
                None => {
                    info!("Client disconnected.");
                    break;
                }
            },
            Some(event) = events_rx.recv() => event,
        };

        if classroom.handle(event).await == Flow::Close {
            break;
        }
    }
}

/// Owns the socket's write half. Everything the session produces funnels
/// through here in order.
async fn write_outbound(
    mut sender: SplitSink<WebSocket, Message>,
    mut out_rx: UnboundedReceiver<Outbound>,
) {
    while let Some(outbound) = out_rx.recv().await {
        let message = match outbound {
            Outbound::Message(msg) => match serde_json::to_string(&msg) {
                Ok(json) => Message::Text(json.into()),
                Err(e) => {
                    error!("Failed to serialize server message: {}", e);
                    continue;
                }
            },
            Outbound::Audio(audio) => Message::Binary(audio),
        };
        if sender.send(message).await.is_err() {
            warn!("Client went away while sending; dropping remaining output.");
            return;
        }
    }
    let _ = sender.close().await;
}

async fn finish_writer(writer: tokio::task::JoinHandle<()>) {
    if tokio::time::timeout(WRITER_DRAIN, writer).await.is_err() {
        warn!("Timed out flushing the last messages to the client.");
    }
}
