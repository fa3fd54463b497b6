//! Stand-in recognition and synthesis workers
//!
//! Both run as bus consumers: the ASR worker turns audio frames into
//! transcripts, the TTS worker turns final transcripts into audio. The real
//! services sit behind the `Recognizer` and `Synthesizer` traits.

pub mod asr;
pub mod tts;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::bus::{MessageBus, Subscription};

pub use asr::{AsrWorker, Recognizer, StubRecognizer, Transcript, ASR_CONSUMER};
pub use tts::{
    PlaybackSink, StubSynthesizer, Synthesizer, TtsWorker, PLAYBACK_CONSUMER, TTS_CONSUMER,
};

/// Run the whole stub pipeline inside this process
///
/// Takes every category the gateway and the workers publish, so nothing
/// accumulates on a bus that has no external consumers.
pub async fn start_local(
    bus: Arc<dyn MessageBus>,
    sample_rate: u32,
    frame_duration: Duration,
) -> Result<Vec<Subscription>> {
    let asr = AsrWorker::new(Arc::clone(&bus), Arc::new(StubRecognizer::default()))
        .start()
        .await?;
    let tts = TtsWorker::new(
        Arc::clone(&bus),
        Arc::new(StubSynthesizer::new(sample_rate, frame_duration)),
    )
    .start()
    .await?;
    let playback = PlaybackSink::start(bus.as_ref()).await?;

    Ok(vec![asr, tts, playback])
}
