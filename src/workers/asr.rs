use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audio::AudioFrame;
use crate::bus::{
    publish_json, AudioFrameMessage, BusMessage, MessageBus, MessageHandler, StreamCategory,
    Subscription, TranscriptMessage,
};

/// Durable consumer name of the recognition worker
pub const ASR_CONSUMER: &str = "asr-worker";

/// One recognition result
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub is_final: bool,
    pub confidence: f32,
}

/// Streaming speech recognition service
#[async_trait::async_trait]
pub trait Recognizer: Send + Sync {
    /// Feed one frame; may return an interim or final result
    async fn recognize(&self, session_id: &str, frame: &AudioFrame) -> Result<Option<Transcript>>;

    /// The session's audio ended; flush whatever is left
    async fn finish(&self, session_id: &str) -> Result<Option<Transcript>>;
}

/// Stand-in recognizer that only acknowledges the audio it receives
///
/// Emits an interim result every `ack_every` frames per session and a final
/// result when the session's audio ends.
pub struct StubRecognizer {
    ack_every: u64,
    frames_seen: Mutex<HashMap<String, u64>>,
}

impl StubRecognizer {
    pub const TEXT: &'static str = "[Simulated transcript]";

    pub fn new(ack_every: u64) -> Self {
        Self {
            ack_every: ack_every.max(1),
            frames_seen: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for StubRecognizer {
    fn default() -> Self {
        Self::new(50) // one acknowledgment per second of 20ms frames
    }
}

#[async_trait::async_trait]
impl Recognizer for StubRecognizer {
    async fn recognize(&self, session_id: &str, _frame: &AudioFrame) -> Result<Option<Transcript>> {
        let count = {
            let mut seen = self.frames_seen.lock();
            let count = seen.entry(session_id.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if count % self.ack_every != 0 {
            return Ok(None);
        }

        Ok(Some(Transcript {
            text: Self::TEXT.to_string(),
            is_final: false,
            confidence: 0.95,
        }))
    }

    async fn finish(&self, session_id: &str) -> Result<Option<Transcript>> {
        let frames = self.frames_seen.lock().remove(session_id).unwrap_or(0);
        debug!("Session {}: recognizer saw {} frames", session_id, frames);

        Ok(Some(Transcript {
            text: Self::TEXT.to_string(),
            is_final: true,
            confidence: 0.95,
        }))
    }
}

/// Consumes audio frames from the bus and publishes transcripts
pub struct AsrWorker {
    bus: Arc<dyn MessageBus>,
    recognizer: Arc<dyn Recognizer>,
}

impl AsrWorker {
    pub fn new(bus: Arc<dyn MessageBus>, recognizer: Arc<dyn Recognizer>) -> Self {
        Self { bus, recognizer }
    }

    /// Subscribe to every session's audio
    pub async fn start(self) -> Result<Subscription> {
        let bus = Arc::clone(&self.bus);
        let filter = bus.subjects().wildcard(StreamCategory::Audio);

        info!("ASR worker consuming {}", filter);
        bus.subscribe(&filter, ASR_CONSUMER, Arc::new(self)).await
    }
}

#[async_trait::async_trait]
impl MessageHandler for AsrWorker {
    async fn handle(&self, message: BusMessage) -> Result<()> {
        let frame_message: AudioFrameMessage = match serde_json::from_slice(&message.payload) {
            Ok(m) => m,
            Err(e) => {
                // Redelivering a malformed message cannot help
                warn!("Failed to parse audio frame on {}: {}", message.subject, e);
                return Ok(());
            }
        };

        let session_id = frame_message.session_id.clone();

        let transcript = if frame_message.final_frame {
            self.recognizer.finish(&session_id).await?
        } else {
            let frame = match frame_message.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Dropping undecodable frame on {}: {:#}", message.subject, e);
                    return Ok(());
                }
            };
            self.recognizer.recognize(&session_id, &frame).await?
        };

        let Some(transcript) = transcript else {
            return Ok(());
        };

        let subject = self.bus.subjects().subject(StreamCategory::Text, &session_id);
        let outgoing = TranscriptMessage {
            session_id: session_id.clone(),
            text: transcript.text,
            is_final: transcript.is_final,
            confidence: Some(transcript.confidence),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        publish_json(self.bus.as_ref(), &subject, &outgoing).await?;

        debug!(
            "Published transcript to {} (final={})",
            subject, outgoing.is_final
        );

        Ok(())
    }
}
