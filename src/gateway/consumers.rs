use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::audio::{AudioFrame, SessionRecorder};
use crate::bus::{publish_json, AudioFrameMessage, MessageBus, StreamCategory};

/// Publish every frame to the session's audio subject, then a final marker
///
/// Returns the number of frames published. Publish failures are logged and
/// the stream keeps going.
pub async fn publish_frames(
    bus: Arc<dyn MessageBus>,
    session_id: String,
    sample_rate: u32,
    mut frames: mpsc::Receiver<AudioFrame>,
) -> u64 {
    let subject = bus.subjects().subject(StreamCategory::Audio, &session_id);
    let mut published = 0u64;
    let mut next_sequence = 0u64;

    info!("Session {}: publishing frames to {}", session_id, subject);

    while let Some(frame) = frames.recv().await {
        next_sequence = frame.sequence + 1;
        let message = AudioFrameMessage::from_frame(&session_id, &frame);

        match publish_json(bus.as_ref(), &subject, &message).await {
            Ok(()) => {
                published += 1;
                debug!("Published frame {} to {}", frame.sequence, subject);
            }
            Err(e) => {
                error!("Failed to publish audio frame: {:#}", e);
                // Continue even if a publish fails
            }
        }
    }

    // Send final frame marker
    let marker = AudioFrameMessage::final_marker(&session_id, next_sequence, sample_rate);
    if let Err(e) = publish_json(bus.as_ref(), &subject, &marker).await {
        error!("Failed to publish final frame marker: {:#}", e);
    }

    info!(
        "Session {}: publishing finished ({} frames)",
        session_id, published
    );

    published
}

/// Record the session's frames to disk until the stream ends
pub async fn record_frames(
    recordings_dir: PathBuf,
    session_id: String,
    sample_rate: u32,
    frames: mpsc::Receiver<AudioFrame>,
) {
    let recorder = match SessionRecorder::new(&recordings_dir, &session_id, sample_rate) {
        Ok(recorder) => recorder,
        Err(e) => {
            // Dropping the receiver detaches this consumer from the distributor
            error!("Session {}: recording disabled: {:#}", session_id, e);
            return;
        }
    };

    if let Err(e) = recorder.record(frames).await {
        error!("Session {}: recording failed: {:#}", session_id, e);
    }
}
