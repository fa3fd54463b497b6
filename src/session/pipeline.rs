use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::config::PipelineConfig;
use super::session::Session;
use super::stats::{PipelineCounters, SessionStats};
use crate::audio::{AudioChunker, AudioFrame, FanOutDistributor, SpeechEvent, VoiceActivityDetector};

/// What one inbound payload produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Complete frames emitted and distributed
    pub frames: usize,

    /// Frames dropped across all destinations because their queues were full
    pub dropped: usize,

    /// Speech edges detected while classifying those frames
    pub events: Vec<SpeechEvent>,
}

/// Inbound audio path of one session: chunker, detector, distributor
///
/// Driven by exactly one caller at a time; the detector's speech edges are
/// reported but never change the session's lifecycle state.
pub struct SessionPipeline {
    session: Arc<Session>,
    chunker: AudioChunker,
    vad: VoiceActivityDetector,
    distributor: FanOutDistributor,
    capacity: usize,
    counters: PipelineCounters,
    closed: bool,
}

impl SessionPipeline {
    pub fn new(session: Arc<Session>, config: &PipelineConfig) -> Result<Self> {
        let chunker = AudioChunker::new(config.sample_rate, config.frame_duration)?;
        let vad = VoiceActivityDetector::new(config.vad_threshold, config.min_silence);
        let distributor = FanOutDistributor::new(session.id().to_string());

        debug!(
            "Session {}: pipeline ready ({}Hz, {:?} frames, {} samples/frame)",
            session.id(),
            config.sample_rate,
            config.frame_duration,
            chunker.samples_per_frame()
        );

        Ok(Self {
            session,
            chunker,
            vad,
            distributor,
            capacity: config.consumer_capacity,
            counters: PipelineCounters::default(),
            closed: false,
        })
    }

    /// Add a downstream consumer with the configured queue capacity
    pub fn add_consumer(&mut self, name: &str) -> mpsc::Receiver<AudioFrame> {
        self.distributor.register(name, self.capacity)
    }

    /// Feed one decoded media payload through the pipeline
    ///
    /// Never waits on a consumer. Once the pipeline is closed the payload is
    /// ignored and an empty report is returned.
    pub fn ingest(&mut self, payload: &[u8]) -> IngestReport {
        let mut report = IngestReport::default();
        if self.closed {
            return report;
        }

        self.counters.payloads += 1;
        self.counters.payload_bytes += payload.len() as u64;

        for frame in self.chunker.push(payload) {
            let outcome = self.vad.process(&frame.pcm);

            if let Some(event) = outcome.event {
                match event {
                    SpeechEvent::Started => {
                        self.counters.speech_started += 1;
                        info!(
                            "Session {}: speech started (energy {:.4})",
                            self.session.id(),
                            outcome.energy
                        );
                    }
                    SpeechEvent::Ended => {
                        self.counters.speech_ended += 1;
                        info!("Session {}: speech ended", self.session.id());
                    }
                }
                report.events.push(event);
            }

            let dispatch = self.distributor.dispatch(&frame);
            report.dropped += dispatch.dropped;
            report.frames += 1;
            self.counters.frames += 1;
        }

        report
    }

    /// Stop accepting payloads and signal end-of-stream to every consumer
    ///
    /// Returns `true` only the first time.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }

        self.closed = true;
        self.distributor.close();

        info!(
            "Session {}: pipeline closed after {} frames ({} bytes left unframed)",
            self.session.id(),
            self.counters.frames,
            self.chunker.buffered().len()
        );

        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn counters(&self) -> &PipelineCounters {
        &self.counters
    }

    pub fn stats(&self) -> SessionStats {
        let (state, updated_at) = self.session.snapshot();
        let created_at = self.session.created_at();

        SessionStats {
            session_id: self.session.id(),
            state,
            created_at,
            updated_at,
            duration_secs: Utc::now()
                .signed_duration_since(created_at)
                .num_milliseconds() as f64
                / 1000.0,
            is_speaking: self.vad.is_speaking(),
            buffered_bytes: self.chunker.buffered().len(),
            counters: self.counters.clone(),
            destinations: self.distributor.stats(),
        }
    }
}
