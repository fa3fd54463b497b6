use anyhow::Result;
use std::time::Duration;
use tracing::debug;

use super::frame::{AudioFrame, BYTES_PER_SAMPLE};

/// Reassembles arbitrarily sized media payloads into fixed-duration frames
///
/// Bytes beyond the last complete frame stay buffered until the next call, so
/// no frame is ever emitted short and no input byte is lost or duplicated.
/// One chunker belongs to exactly one session's inbound path.
#[derive(Debug)]
pub struct AudioChunker {
    sample_rate: u32,
    frame_duration: Duration,
    samples_per_frame: usize,
    bytes_per_frame: usize,
    buffer: Vec<u8>,
    next_sequence: u64,
}

impl AudioChunker {
    pub fn new(sample_rate: u32, frame_duration: Duration) -> Result<Self> {
        let samples_per_frame =
            (sample_rate as f64 * frame_duration.as_secs_f64()).round() as usize;

        if samples_per_frame == 0 {
            anyhow::bail!(
                "Frame of {:?} at {}Hz holds no samples",
                frame_duration,
                sample_rate
            );
        }

        let bytes_per_frame = samples_per_frame * BYTES_PER_SAMPLE;

        Ok(Self {
            sample_rate,
            frame_duration,
            samples_per_frame,
            bytes_per_frame,
            buffer: Vec::with_capacity(bytes_per_frame * 2),
            next_sequence: 0,
        })
    }

    /// Append one payload and return every frame it completes
    ///
    /// Runs in time proportional to the frames produced; an empty payload
    /// simply produces nothing.
    pub fn push(&mut self, payload: &[u8]) -> Vec<AudioFrame> {
        self.buffer.extend_from_slice(payload);

        let complete = self.buffer.len() / self.bytes_per_frame;
        if complete == 0 {
            return Vec::new();
        }

        let mut frames = Vec::with_capacity(complete);
        let frame_ms = self.frame_duration.as_millis() as u64;

        for chunk in self.buffer.chunks_exact(self.bytes_per_frame) {
            frames.push(AudioFrame {
                sequence: self.next_sequence,
                sample_rate: self.sample_rate,
                timestamp_ms: self.next_sequence * frame_ms,
                pcm: chunk.to_vec(),
            });
            self.next_sequence += 1;
        }

        // Keep only the partial remainder
        self.buffer.drain(..complete * self.bytes_per_frame);

        debug!(
            "Chunked {} frame(s), {} byte(s) carried over",
            frames.len(),
            self.buffer.len()
        );

        frames
    }

    /// Bytes waiting for the rest of their frame
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames emitted so far
    pub fn frames_emitted(&self) -> u64 {
        self.next_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::{FRAME_DURATION_20MS, FRAME_DURATION_40MS, PCM_SAMPLE_RATE, TRANSPORT_SAMPLE_RATE};

    #[test]
    fn test_frame_sizes() {
        let chunker = AudioChunker::new(PCM_SAMPLE_RATE, FRAME_DURATION_20MS).unwrap();
        assert_eq!(chunker.samples_per_frame(), 320);
        assert_eq!(chunker.bytes_per_frame(), 640);

        let chunker = AudioChunker::new(TRANSPORT_SAMPLE_RATE, FRAME_DURATION_40MS).unwrap();
        assert_eq!(chunker.samples_per_frame(), 1920);
        assert_eq!(chunker.bytes_per_frame(), 3840);
    }

    #[test]
    fn test_samples_per_frame_is_rounded() {
        // 11025 * 0.02 = 220.5
        let chunker = AudioChunker::new(11025, FRAME_DURATION_20MS).unwrap();
        assert_eq!(chunker.samples_per_frame(), 221);
    }

    #[test]
    fn test_zero_sample_frame_rejected() {
        assert!(AudioChunker::new(0, FRAME_DURATION_20MS).is_err());
        assert!(AudioChunker::new(16000, Duration::ZERO).is_err());
    }

    #[test]
    fn test_empty_payload_produces_nothing() {
        let mut chunker = AudioChunker::new(PCM_SAMPLE_RATE, FRAME_DURATION_20MS).unwrap();
        assert!(chunker.push(&[]).is_empty());
        assert!(chunker.buffered().is_empty());
    }

    #[test]
    fn test_odd_byte_payload_is_buffered() {
        let mut chunker = AudioChunker::new(PCM_SAMPLE_RATE, FRAME_DURATION_20MS).unwrap();
        assert!(chunker.push(&[7]).is_empty());
        assert_eq!(chunker.buffered(), &[7]);
    }

    #[test]
    fn test_remainder_carries_across_calls() {
        let mut chunker = AudioChunker::new(PCM_SAMPLE_RATE, FRAME_DURATION_20MS).unwrap();

        // 1.5 frames, then another half
        let frames = chunker.push(&vec![1u8; 960]);
        assert_eq!(frames.len(), 1);
        assert_eq!(chunker.buffered().len(), 320);

        let frames = chunker.push(&vec![2u8; 320]);
        assert_eq!(frames.len(), 1);
        assert!(chunker.buffered().is_empty());
        assert_eq!(&frames[0].pcm[..320], &[1u8; 320][..]);
        assert_eq!(&frames[0].pcm[320..], &[2u8; 320][..]);
    }

    #[test]
    fn test_sequence_and_timestamps() {
        let mut chunker = AudioChunker::new(PCM_SAMPLE_RATE, FRAME_DURATION_20MS).unwrap();
        let frames = chunker.push(&vec![0u8; 640 * 3]);

        let sequences: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
        let timestamps: Vec<u64> = frames.iter().map(|f| f.timestamp_ms).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(timestamps, vec![0, 20, 40]);
        assert_eq!(chunker.frames_emitted(), 3);
    }

    #[test]
    fn test_no_byte_loss_over_irregular_fragments() {
        let mut chunker = AudioChunker::new(PCM_SAMPLE_RATE, FRAME_DURATION_20MS).unwrap();

        let mut input = Vec::new();
        let mut output = Vec::new();

        // Deterministic fragment sizes including empty and odd-length payloads
        for i in 0..200usize {
            let len = (i * 37 + 11) % 1500;
            let fragment: Vec<u8> = (0..len).map(|b| ((i + b) % 251) as u8).collect();
            input.extend_from_slice(&fragment);

            for frame in chunker.push(&fragment) {
                assert_eq!(frame.pcm.len(), chunker.bytes_per_frame(), "short frame emitted");
                output.extend_from_slice(&frame.pcm);
            }
        }

        output.extend_from_slice(chunker.buffered());
        assert_eq!(output, input);
        assert!(chunker.buffered().len() < chunker.bytes_per_frame());
    }
}
