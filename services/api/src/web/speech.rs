//! services/api/src/web/speech.rs
//!
//! The speech bridge: turns the tutor's lines into audio for the client, one
//! utterance at a time.

use std::sync::Arc;

use bytes::Bytes;
use classroom_core::ports::TextToSpeechService;
use classroom_core::speech::clean_text_for_speech;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::web::protocol::{Outbound, OutboundSender, ServerMessage};

struct Utterance {
    id: u64,
    token: CancellationToken,
}

pub struct SpeechBridge {
    tts: Arc<dyn TextToSpeechService>,
    out: OutboundSender,
    current: Option<Utterance>,
    next_id: u64,
}

impl SpeechBridge {
    pub fn new(tts: Arc<dyn TextToSpeechService>, out: OutboundSender) -> Self {
        Self {
            tts,
            out,
            current: None,
            next_id: 0,
        }
    }

    /// Cancels whatever is playing, then synthesizes and sends `text`.
    pub fn speak(&mut self, text: &str) {
        self.stop();
        let cleaned = clean_text_for_speech(text);
        if cleaned.is_empty() {
            return;
        }

        self.next_id += 1;
        let id = self.next_id;
        let token = CancellationToken::new();
        self.current = Some(Utterance {
            id,
            token: token.clone(),
        });

        let tts = self.tts.clone();
        let out = self.out.clone();
        tokio::spawn(async move {
            let audio = tokio::select! {
                _ = token.cancelled() => return,
                audio = tts.generate_audio(&cleaned) => audio,
            };
            if token.is_cancelled() {
                return;
            }
            match audio {
                Ok(audio) => {
                    let _ = out.send(Outbound::Message(ServerMessage::SpeechStarted { utterance: id }));
                    let _ = out.send(Outbound::Audio(Bytes::from(audio)));
                }
                Err(e) => error!(utterance = id, "Failed to synthesize speech: {:?}", e),
            }
        });
    }

    /// Cancels the in-flight utterance and tells the client to stop playback.
    pub fn stop(&mut self) {
        if let Some(utterance) = self.current.take() {
            debug!(utterance = utterance.id, "Stopping speech");
            utterance.token.cancel();
            let _ = self.out.send(Outbound::Message(ServerMessage::SpeechEnded {
                utterance: utterance.id,
            }));
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.current.is_some()
    }
}

impl Drop for SpeechBridge {
    fn drop(&mut self) {
        if let Some(utterance) = self.current.take() {
            utterance.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use classroom_core::ports::PortResult;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Echoes the text back as audio after a delay, remembering what it was asked.
    struct SlowTts {
        delay: Duration,
        spoken: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextToSpeechService for SlowTts {
        async fn generate_audio(&self, text: &str) -> PortResult<Vec<u8>> {
            self.spoken.lock().unwrap().push(text.to_string());
            tokio::time::sleep(self.delay).await;
            Ok(text.as_bytes().to_vec())
        }
    }

    fn bridge(delay: Duration) -> (SpeechBridge, Arc<SlowTts>, mpsc::UnboundedReceiver<Outbound>) {
        let tts = Arc::new(SlowTts {
            delay,
            spoken: Mutex::new(Vec::new()),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        (SpeechBridge::new(tts.clone(), tx), tts, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn speaks_cleaned_text() {
        let (mut bridge, tts, mut rx) = bridge(Duration::from_millis(10));
        bridge.speak("**Hello** there 🎉");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(tts.spoken.lock().unwrap().as_slice(), ["Hello there"]);
        assert!(matches!(
            rx.recv().await,
            Some(Outbound::Message(ServerMessage::SpeechStarted { utterance: 1 }))
        ));
        match rx.recv().await {
            Some(Outbound::Audio(audio)) => assert_eq!(&audio[..], b"Hello there"),
            other => panic!("expected audio, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn a_new_utterance_cancels_the_previous_one() {
        let (mut bridge, _tts, mut rx) = bridge(Duration::from_secs(1));
        bridge.speak("First line");
        bridge.speak("Second line");
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(matches!(
            rx.recv().await,
            Some(Outbound::Message(ServerMessage::SpeechEnded { utterance: 1 }))
        ));
        assert!(matches!(
            rx.recv().await,
            Some(Outbound::Message(ServerMessage::SpeechStarted { utterance: 2 }))
        ));
        match rx.recv().await {
            Some(Outbound::Audio(audio)) => assert_eq!(&audio[..], b"Second line"),
            other => panic!("expected audio, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_text_is_not_spoken() {
        let (mut bridge, tts, mut rx) = bridge(Duration::from_millis(10));
        bridge.speak("🎉 ---");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!bridge.is_speaking());
        assert!(tts.spoken.lock().unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }
}
