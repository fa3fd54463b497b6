pub mod chunker;
pub mod fanout;
pub mod frame;
pub mod reader;
pub mod recorder;
pub mod vad;

pub use chunker::AudioChunker;
pub use fanout::{DestinationStats, DispatchReport, FanOutDistributor};
pub use frame::{
    AudioFrame, BYTES_PER_SAMPLE, FRAME_DURATION_20MS, FRAME_DURATION_40MS, PCM_SAMPLE_RATE,
    TRANSPORT_SAMPLE_RATE,
};
pub use reader::FrameReader;
pub use recorder::{RecordingMetadata, SessionRecorder};
pub use vad::{rms_energy, SpeechEvent, VadOutcome, VoiceActivityDetector};
