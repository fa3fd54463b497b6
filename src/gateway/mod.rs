//! Boundary between the external media engine and the audio pipeline
//!
//! The media engine drives everything here: it accepts an offer, reports
//! transport and track events, and hands over each decoded payload. The
//! gateway owns the per-session pipelines and wires their downstream
//! consumers (bus publishing, recording, echo).

pub mod consumers;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::audio::AudioFrame;
use crate::bus::MessageBus;
use crate::session::{
    IngestReport, PipelineConfig, Session, SessionId, SessionPipeline, SessionRegistry,
    SessionState, SessionStats,
};

/// Which downstream consumers each session gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerSet {
    /// Write frames to a WAV recording
    pub record: bool,
    /// Publish frames to the audio stream for recognition
    pub publish: bool,
    /// Hand frames back to the media engine for transmission
    pub echo: bool,
}

impl Default for ConsumerSet {
    fn default() -> Self {
        Self {
            record: true,
            publish: true,
            echo: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub pipeline: PipelineConfig,
    pub consumers: ConsumerSet,
    pub recordings_dir: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            consumers: ConsumerSet::default(),
            recordings_dir: PathBuf::from("recordings"),
        }
    }
}

/// Events reported by the media engine for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// Transport connectivity established
    TransportConnected,
    /// First remote media track started delivering
    TrackStarted,
    /// Decoded payload of one inbound packet
    Payload(Vec<u8>),
    /// Transport closed by either side
    TransportClosed,
    /// Transport failed
    TransportFailed,
}

/// A newly accepted session
pub struct SessionHandle {
    pub session: Arc<Session>,
    /// Frames to transmit back to the caller, when echo is enabled
    pub outbound: Option<mpsc::Receiver<AudioFrame>>,
}

struct SessionEntry {
    pipeline: Arc<Mutex<SessionPipeline>>,
    consumers: Vec<JoinHandle<()>>,
}

pub struct Gateway {
    config: GatewayConfig,
    registry: SessionRegistry,
    entries: RwLock<HashMap<SessionId, SessionEntry>>,
    /// Consumer tasks of torn-down sessions that may still be finishing
    draining: Mutex<Vec<JoinHandle<()>>>,
    bus: Option<Arc<dyn MessageBus>>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, bus: Option<Arc<dyn MessageBus>>) -> Self {
        info!(
            "Gateway ready: {}Hz, {:?} frames, consumers {:?}",
            config.pipeline.sample_rate, config.pipeline.frame_duration, config.consumers
        );

        Self {
            config,
            registry: SessionRegistry::new(),
            entries: RwLock::new(HashMap::new()),
            draining: Mutex::new(Vec::new()),
            bus,
        }
    }

    /// Accept an inbound connection offer
    ///
    /// Creates the session, builds its pipeline and starts its consumers.
    /// Must be called from within a tokio runtime.
    pub fn accept_offer(&self) -> Result<SessionHandle> {
        let session = self.registry.create();
        let id = session.id();

        let mut pipeline = match SessionPipeline::new(Arc::clone(&session), &self.config.pipeline) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                session.disconnect();
                self.registry.delete(&id);
                return Err(e.context("Failed to build session pipeline"));
            }
        };

        let session_key = id.to_string();
        let sample_rate = self.config.pipeline.sample_rate;
        let mut tasks = Vec::new();

        if self.config.consumers.publish {
            match &self.bus {
                Some(bus) => {
                    let frames = pipeline.add_consumer("publish");
                    let bus = Arc::clone(bus);
                    let session_key = session_key.clone();
                    tasks.push(tokio::spawn(async move {
                        consumers::publish_frames(bus, session_key, sample_rate, frames).await;
                    }));
                }
                None => debug!("Session {}: no bus configured, not publishing", id),
            }
        }

        if self.config.consumers.record {
            let frames = pipeline.add_consumer("record");
            let dir = self.config.recordings_dir.clone();
            let session_key = session_key.clone();
            tasks.push(tokio::spawn(consumers::record_frames(
                dir,
                session_key,
                sample_rate,
                frames,
            )));
        }

        let outbound = if self.config.consumers.echo {
            Some(pipeline.add_consumer("echo"))
        } else {
            None
        };

        self.entries.write().insert(
            id,
            SessionEntry {
                pipeline: Arc::new(Mutex::new(pipeline)),
                consumers: tasks,
            },
        );

        info!("Session {}: offer accepted", id);

        Ok(SessionHandle { session, outbound })
    }

    /// Apply a media-engine event
    ///
    /// Returns `false` when a state change or payload names an unknown
    /// session. Close and failure signals always succeed; a repeated one is
    /// absorbed.
    pub fn handle_event(&self, id: &SessionId, event: MediaEvent) -> bool {
        match event {
            MediaEvent::TransportConnected => self.transition(id, SessionState::Connected),
            MediaEvent::TrackStarted => self.transition(id, SessionState::Listening),
            MediaEvent::Payload(payload) => self.ingest(id, &payload).is_some(),
            MediaEvent::TransportClosed | MediaEvent::TransportFailed => {
                self.teardown(id);
                true
            }
        }
    }

    fn transition(&self, id: &SessionId, state: SessionState) -> bool {
        match self.registry.get(id) {
            Some(session) => {
                session.update_state(state);
                true
            }
            None => {
                debug!("Session {}: {} for unknown session", id, state);
                false
            }
        }
    }

    /// Feed one inbound payload into the session's pipeline
    ///
    /// Returns `None` when the session is unknown or already torn down.
    pub fn ingest(&self, id: &SessionId, payload: &[u8]) -> Option<IngestReport> {
        let pipeline = self
            .entries
            .read()
            .get(id)
            .map(|entry| Arc::clone(&entry.pipeline))?;

        let mut pipeline = pipeline.lock();
        if pipeline.is_closed() {
            return None;
        }
        Some(pipeline.ingest(payload))
    }

    /// Tear a session down
    ///
    /// Marks it disconnected, stops its pipeline, ends every consumer's stream
    /// and removes it from the registry. Returns `true` only for the call that
    /// did the work; repeated signals are absorbed.
    pub fn teardown(&self, id: &SessionId) -> bool {
        let disconnected = self
            .registry
            .get(id)
            .map_or(false, |session| session.disconnect());

        let entry = self.entries.write().remove(id);
        let closed = match entry {
            Some(entry) => {
                let closed = entry.pipeline.lock().close();
                let mut draining = self.draining.lock();
                draining.retain(|task| !task.is_finished());
                draining.extend(entry.consumers);
                closed
            }
            None => false,
        };

        let removed = self.registry.delete(id);

        let first = disconnected || closed || removed;
        if first {
            info!("Session {}: torn down", id);
        } else {
            debug!("Session {}: duplicate teardown ignored", id);
        }
        first
    }

    pub fn stats(&self, id: &SessionId) -> Option<SessionStats> {
        let pipeline = self
            .entries
            .read()
            .get(id)
            .map(|entry| Arc::clone(&entry.pipeline))?;

        let stats = pipeline.lock().stats();
        Some(stats)
    }

    pub fn session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.registry.get(id)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Consumer tasks of torn-down sessions not yet known to have finished
    pub fn pending_consumers(&self) -> usize {
        self.draining.lock().len()
    }

    /// Wait for the consumers of torn-down sessions to finish
    pub async fn drain(&self) {
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.draining.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!("Consumer task panicked: {}", e);
            }
        }
    }

    /// Tear down every session and wait for their consumers
    pub async fn shutdown(&self) {
        let ids = self.registry.ids();
        info!("Shutting down gateway ({} active sessions)", ids.len());

        for id in ids {
            self.teardown(&id);
        }
        self.drain().await;
    }
}
