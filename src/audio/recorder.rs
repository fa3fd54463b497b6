use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::frame::{AudioFrame, BYTES_PER_SAMPLE};

/// Metadata written next to a session recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_count: u64,
    pub total_audio_bytes: u64,
}

/// Records one session's frames to `<dir>/<session_id>/audio.wav`
///
/// `metadata.json` is written once the frame stream ends.
pub struct SessionRecorder {
    session_id: String,
    session_dir: PathBuf,
    sample_rate: u32,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    started_at: DateTime<Utc>,
    frame_count: u64,
    total_audio_bytes: u64,
}

impl SessionRecorder {
    pub fn new(recordings_dir: impl AsRef<Path>, session_id: &str, sample_rate: u32) -> Result<Self> {
        let session_dir = recordings_dir.as_ref().join(session_id);
        fs::create_dir_all(&session_dir)
            .with_context(|| format!("Failed to create recording directory: {:?}", session_dir))?;

        let audio_path = session_dir.join("audio.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&audio_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", audio_path))?;

        info!("Session {}: recording to {:?}", session_id, audio_path);

        Ok(Self {
            session_id: session_id.to_string(),
            session_dir,
            sample_rate,
            writer: Some(writer),
            started_at: Utc::now(),
            frame_count: 0,
            total_audio_bytes: 0,
        })
    }

    /// Consume frames until the stream ends, then finalize the recording
    pub async fn record(mut self, mut frames: mpsc::Receiver<AudioFrame>) -> Result<RecordingMetadata> {
        while let Some(frame) = frames.recv().await {
            self.write_frame(&frame)?;
        }

        self.finish()
    }

    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if frame.sample_rate != self.sample_rate {
            warn!(
                "Session {}: frame sample rate mismatch: expected {}, got {}. Skipping frame.",
                self.session_id, self.sample_rate, frame.sample_rate
            );
            return Ok(());
        }

        if let Some(writer) = &mut self.writer {
            for sample in frame.samples() {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }

            self.frame_count += 1;
            self.total_audio_bytes += (frame.sample_count() * BYTES_PER_SAMPLE) as u64;
        }

        Ok(())
    }

    /// Finalize the WAV file and write `metadata.json`
    pub fn finish(mut self) -> Result<RecordingMetadata> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        let samples = self.total_audio_bytes / BYTES_PER_SAMPLE as u64;
        let metadata = RecordingMetadata {
            session_id: self.session_id.clone(),
            start_time: self.started_at,
            end_time: Utc::now(),
            duration_seconds: samples as f64 / self.sample_rate as f64,
            sample_rate: self.sample_rate,
            channels: 1,
            frame_count: self.frame_count,
            total_audio_bytes: self.total_audio_bytes,
        };

        let meta_path = self.session_dir.join("metadata.json");
        let json = serde_json::to_vec_pretty(&metadata)?;
        fs::write(&meta_path, json)
            .with_context(|| format!("Failed to write metadata: {:?}", meta_path))?;

        info!(
            "Session {}: recording complete ({} frames, {:.1}s)",
            self.session_id, metadata.frame_count, metadata.duration_seconds
        );

        Ok(metadata)
    }

    pub fn audio_path(&self) -> PathBuf {
        self.session_dir.join("audio.wav")
    }
}

impl Drop for SessionRecorder {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
