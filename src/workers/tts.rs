use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audio::{AudioFrame, FRAME_DURATION_20MS, PCM_SAMPLE_RATE};
use crate::bus::{
    publish_json, AudioFrameMessage, BusMessage, MessageBus, MessageHandler, StreamCategory,
    Subscription, TranscriptMessage,
};

/// Durable consumer name of the synthesis worker
pub const TTS_CONSUMER: &str = "tts-worker";

/// Durable consumer name of the in-process playback sink
pub const PLAYBACK_CONSUMER: &str = "playback";

/// Text-to-speech service
#[async_trait::async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into a sequence of frames
    async fn synthesize(&self, text: &str) -> Result<Vec<AudioFrame>>;
}

/// Stand-in synthesizer that acknowledges each request with one silent frame
pub struct StubSynthesizer {
    sample_rate: u32,
    frame_duration: Duration,
}

impl StubSynthesizer {
    pub fn new(sample_rate: u32, frame_duration: Duration) -> Self {
        Self {
            sample_rate,
            frame_duration,
        }
    }
}

impl Default for StubSynthesizer {
    fn default() -> Self {
        Self::new(PCM_SAMPLE_RATE, FRAME_DURATION_20MS)
    }
}

#[async_trait::async_trait]
impl Synthesizer for StubSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<AudioFrame>> {
        debug!("Synthesizing {} characters", text.len());

        let samples = (self.sample_rate as f64 * self.frame_duration.as_secs_f64()).round() as usize;
        Ok(vec![AudioFrame::from_samples(
            0,
            self.sample_rate,
            0,
            &vec![0i16; samples],
        )])
    }
}

/// Consumes final transcripts from the bus and publishes synthesized audio
pub struct TtsWorker {
    bus: Arc<dyn MessageBus>,
    synthesizer: Arc<dyn Synthesizer>,
}

impl TtsWorker {
    pub fn new(bus: Arc<dyn MessageBus>, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self { bus, synthesizer }
    }

    /// Subscribe to every session's transcripts
    pub async fn start(self) -> Result<Subscription> {
        let bus = Arc::clone(&self.bus);
        let filter = bus.subjects().wildcard(StreamCategory::Text);

        info!("TTS worker consuming {}", filter);
        bus.subscribe(&filter, TTS_CONSUMER, Arc::new(self)).await
    }
}

#[async_trait::async_trait]
impl MessageHandler for TtsWorker {
    async fn handle(&self, message: BusMessage) -> Result<()> {
        let transcript: TranscriptMessage = match serde_json::from_slice(&message.payload) {
            Ok(t) => t,
            Err(e) => {
                warn!("Failed to parse transcript on {}: {}", message.subject, e);
                return Ok(());
            }
        };

        // Only complete utterances are spoken
        if !transcript.is_final || transcript.text.trim().is_empty() {
            return Ok(());
        }

        info!(
            "Session {}: synthesizing {:?}",
            transcript.session_id, transcript.text
        );

        let frames = self.synthesizer.synthesize(&transcript.text).await?;
        let subject = self
            .bus
            .subjects()
            .subject(StreamCategory::Tts, &transcript.session_id);

        let mut sample_rate = PCM_SAMPLE_RATE;
        for frame in &frames {
            sample_rate = frame.sample_rate;
            let outgoing = AudioFrameMessage::from_frame(&transcript.session_id, frame);
            publish_json(self.bus.as_ref(), &subject, &outgoing).await?;
        }

        let marker =
            AudioFrameMessage::final_marker(&transcript.session_id, frames.len() as u64, sample_rate);
        publish_json(self.bus.as_ref(), &subject, &marker).await?;

        debug!("Published {} synthesized frame(s) to {}", frames.len(), subject);

        Ok(())
    }
}

/// Takes synthesized audio off the bus when no media engine plays it back
///
/// Without a taker, synthesized frames would sit on the in-process bus until
/// they expire.
#[derive(Default)]
pub struct PlaybackSink;

impl PlaybackSink {
    /// Subscribe to every session's synthesized audio
    pub async fn start(bus: &dyn MessageBus) -> Result<Subscription> {
        let filter = bus.subjects().wildcard(StreamCategory::Tts);

        info!("Playback sink consuming {}", filter);
        bus.subscribe(&filter, PLAYBACK_CONSUMER, Arc::new(PlaybackSink)).await
    }
}

#[async_trait::async_trait]
impl MessageHandler for PlaybackSink {
    async fn handle(&self, message: BusMessage) -> Result<()> {
        match serde_json::from_slice::<AudioFrameMessage>(&message.payload) {
            Ok(frame) if frame.final_frame => debug!(
                "Session {}: synthesized reply complete ({} frame(s))",
                frame.session_id, frame.sequence
            ),
            Ok(_) => {}
            Err(e) => warn!("Failed to parse synthesized frame on {}: {}", message.subject, e),
        }
        Ok(())
    }
}
