use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::{SessionId, SessionState};
use crate::audio::DestinationStats;

/// Running counters of one session's inbound audio path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCounters {
    /// Payloads delivered by the media engine
    pub payloads: u64,

    /// Total payload bytes received
    pub payload_bytes: u64,

    /// Complete frames produced by the chunker
    pub frames: u64,

    /// Number of speech-started edges
    pub speech_started: u64,

    /// Number of speech-ended edges
    pub speech_ended: u64,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: SessionId,

    pub state: SessionState,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// When the state last changed
    pub updated_at: DateTime<Utc>,

    /// Seconds since creation
    pub duration_secs: f64,

    /// Whether the detector currently hears speech
    pub is_speaking: bool,

    /// Bytes waiting for the rest of their frame
    pub buffered_bytes: usize,

    #[serde(flatten)]
    pub counters: PipelineCounters,

    /// Delivery counters per downstream consumer
    pub destinations: Vec<DestinationStats>,
}
