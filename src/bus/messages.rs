use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::audio::AudioFrame;

/// Audio frame message published on the audio and tts streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub sequence: u64,
    pub pcm: String,  // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String,  // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

impl AudioFrameMessage {
    pub fn from_frame(session_id: &str, frame: &AudioFrame) -> Self {
        Self {
            session_id: session_id.to_string(),
            sequence: frame.sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(&frame.pcm),
            sample_rate: frame.sample_rate,
            channels: 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: false,
        }
    }

    /// Empty marker announcing the end of a session's frames
    pub fn final_marker(session_id: &str, sequence: u64, sample_rate: u32) -> Self {
        Self {
            session_id: session_id.to_string(),
            sequence,
            pcm: String::new(),
            sample_rate,
            channels: 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: true,
        }
    }

    pub fn decode_pcm(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.pcm)
            .context("Invalid base64 PCM payload")
    }

    pub fn to_frame(&self) -> Result<AudioFrame> {
        let pcm = self.decode_pcm()?;
        let frame_ms = if self.sample_rate == 0 {
            0
        } else {
            (pcm.len() / 2) as u64 * 1000 / self.sample_rate as u64
        };

        Ok(AudioFrame {
            sequence: self.sequence,
            sample_rate: self.sample_rate,
            timestamp_ms: self.sequence * frame_ms,
            pcm,
        })
    }
}

/// Transcript message published by the recognition worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub text: String,
    pub is_final: bool,
    #[serde(default)]
    pub confidence: Option<f32>,
    pub timestamp: String,
}
