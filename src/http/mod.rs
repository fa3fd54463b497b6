//! HTTP API for driving the gateway without a media engine
//!
//! - GET /health - Health check
//! - POST /sessions - Accept a new session
//! - GET /sessions/:id - Session statistics
//! - POST /sessions/:id/events - Report a transport or track event
//! - POST /sessions/:id/audio - Ingest raw PCM bytes
//! - DELETE /sessions/:id - Tear a session down

mod handlers;
mod routes;
mod state;

pub use handlers::{CreateSessionResponse, ErrorResponse, SessionEventRequest};
pub use routes::create_router;
pub use state::AppState;
