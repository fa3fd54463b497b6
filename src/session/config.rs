use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::{FRAME_DURATION_20MS, PCM_SAMPLE_RATE};

/// Per-session audio pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Sample rate of the decoded payloads fed to the chunker
    pub sample_rate: u32,

    /// Duration of each emitted frame (20ms or 40ms)
    pub frame_duration: Duration,

    /// Normalized RMS energy above which a frame counts as speech
    pub vad_threshold: f64,

    /// Continuous silence needed before speech is considered ended
    pub min_silence: Duration,

    /// Queue capacity of each downstream consumer
    pub consumer_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: PCM_SAMPLE_RATE,
            frame_duration: FRAME_DURATION_20MS,
            vad_threshold: 0.02,
            min_silence: Duration::from_millis(300),
            consumer_capacity: 100, // 2s of 20ms frames
        }
    }
}
