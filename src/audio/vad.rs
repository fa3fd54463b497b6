//! Energy-based voice activity detection with silence hysteresis.
//!
//! A frame is active when its normalized RMS energy exceeds the threshold.
//! Speech starts on the first active frame. Speech only ends once inactive
//! frames have continued for at least `min_silence` of wall-clock time since
//! the first inactive frame of the run; any active frame in between cancels
//! the pending end.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Edge notification emitted when the detector changes state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechEvent {
    Started,
    Ended,
}

/// Result of classifying one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadOutcome {
    /// Normalized RMS energy of the frame
    pub energy: f64,
    /// Whether this frame's energy exceeded the threshold
    pub active: bool,
    /// State change caused by this frame, if any
    pub event: Option<SpeechEvent>,
}

/// Stateful speech/silence classifier scoped to one session's audio stream
#[derive(Debug, Clone)]
pub struct VoiceActivityDetector {
    threshold: f64,
    min_silence: Duration,
    is_speaking: bool,
    silence_start: Option<Instant>,
}

impl VoiceActivityDetector {
    /// Create a detector
    ///
    /// - `threshold`: normalized RMS (0-1) above which a frame counts as speech.
    /// - `min_silence`: continuous silence needed to confirm the end of speech.
    pub fn new(threshold: f64, min_silence: Duration) -> Self {
        Self {
            threshold,
            min_silence,
            is_speaking: false,
            silence_start: None,
        }
    }

    /// Classify one frame of 16-bit little-endian PCM at the current time
    pub fn process(&mut self, pcm: &[u8]) -> VadOutcome {
        self.process_at(pcm, Instant::now())
    }

    /// Classify one frame as if it arrived at `now`
    pub fn process_at(&mut self, pcm: &[u8], now: Instant) -> VadOutcome {
        let energy = rms_energy(pcm);

        if energy > self.threshold {
            self.silence_start = None;

            let event = if self.is_speaking {
                None
            } else {
                self.is_speaking = true;
                Some(SpeechEvent::Started)
            };

            return VadOutcome {
                energy,
                active: true,
                event,
            };
        }

        let mut event = None;
        if self.is_speaking {
            match self.silence_start {
                None => self.silence_start = Some(now),
                Some(start) => {
                    if now.saturating_duration_since(start) >= self.min_silence {
                        self.is_speaking = false;
                        self.silence_start = None;
                        event = Some(SpeechEvent::Ended);
                    }
                }
            }
        }

        VadOutcome {
            energy,
            active: false,
            event,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn min_silence(&self) -> Duration {
        self.min_silence
    }

    /// Forget any speech in progress
    pub fn reset(&mut self) {
        self.is_speaking = false;
        self.silence_start = None;
    }
}

/// Root-mean-square energy of 16-bit little-endian PCM, normalized to [0, 1]
///
/// Anything shorter than one whole sample has zero energy.
pub fn rms_energy(pcm: &[u8]) -> f64 {
    let samples = pcm.len() / 2;
    if samples == 0 {
        return 0.0;
    }

    let sum: f64 = pcm
        .chunks_exact(2)
        .map(|pair| {
            let normalized = i16::from_le_bytes([pair[0], pair[1]]) as f64 / 32768.0;
            normalized * normalized
        })
        .sum();

    (sum / samples as f64).sqrt()
}
