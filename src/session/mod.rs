//! Call session management
//!
//! This module provides:
//! - `Session`: the lifecycle state machine of one call
//! - `SessionRegistry`: the directory that owns every live session
//! - `SessionPipeline`: the inbound audio path (chunking, voice activity, fan-out)
//! - Session statistics snapshots

mod config;
mod pipeline;
mod registry;
mod session;
mod stats;

pub use config::PipelineConfig;
pub use pipeline::{IngestReport, SessionPipeline};
pub use registry::SessionRegistry;
pub use session::{Session, SessionId, SessionState};
pub use stats::{PipelineCounters, SessionStats};
