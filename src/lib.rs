pub mod audio;
pub mod bus;
pub mod config;
pub mod gateway;
pub mod http;
pub mod session;
pub mod workers;

pub use audio::{
    AudioChunker, AudioFrame, DestinationStats, DispatchReport, FanOutDistributor, FrameReader,
    RecordingMetadata, SessionRecorder, SpeechEvent, VadOutcome, VoiceActivityDetector,
};
pub use bus::{
    AudioFrameMessage, BusMessage, MemoryBus, MessageBus, MessageHandler, NatsBus,
    StreamCategory, SubjectScheme, Subscription, TranscriptMessage,
};
pub use config::Config;
pub use gateway::{ConsumerSet, Gateway, GatewayConfig, MediaEvent, SessionHandle};
pub use http::{create_router, AppState};
pub use session::{
    IngestReport, PipelineConfig, Session, SessionId, SessionPipeline, SessionRegistry,
    SessionState, SessionStats,
};
pub use workers::{AsrWorker, Recognizer, StubRecognizer, StubSynthesizer, Synthesizer, TtsWorker};
