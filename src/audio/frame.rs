use std::time::Duration;

/// Standard frame durations for the detection and distribution paths
pub const FRAME_DURATION_20MS: Duration = Duration::from_millis(20);
pub const FRAME_DURATION_40MS: Duration = Duration::from_millis(40);

/// Sample rate of the media-transport path (Opus/WebRTC default)
pub const TRANSPORT_SAMPLE_RATE: u32 = 48000;

/// Sample rate of the detection and recognition paths
pub const PCM_SAMPLE_RATE: u32 = 16000;

/// Bytes per 16-bit PCM sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// One fixed-duration slice of decoded audio (16-bit PCM, little-endian, mono)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Position of this frame in its stream, starting at 0
    pub sequence: u64,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Offset of the first sample in milliseconds since the stream started
    pub timestamp_ms: u64,
    /// Raw little-endian PCM bytes
    pub pcm: Vec<u8>,
}

impl AudioFrame {
    /// Number of whole samples carried by this frame
    pub fn sample_count(&self) -> usize {
        self.pcm.len() / BYTES_PER_SAMPLE
    }

    /// Decode the PCM bytes into samples
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.pcm
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }

    /// Playback duration of this frame
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.sample_count() as f64 / self.sample_rate as f64)
    }

    /// Build a frame from decoded samples (used by synthesizers and tests)
    pub fn from_samples(sequence: u64, sample_rate: u32, timestamp_ms: u64, samples: &[i16]) -> Self {
        Self {
            sequence,
            sample_rate,
            timestamp_ms,
            pcm: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
        }
    }
}
