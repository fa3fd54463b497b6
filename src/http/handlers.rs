use super::state::AppState;
use crate::gateway::MediaEvent;
use crate::session::{SessionId, SessionState};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub state: SessionState,
}

/// Transport and track events a client may report for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEventRequest {
    TransportConnected,
    TrackStarted,
    TransportClosed,
    TransportFailed,
}

impl From<SessionEventRequest> for MediaEvent {
    fn from(event: SessionEventRequest) -> Self {
        match event {
            SessionEventRequest::TransportConnected => MediaEvent::TransportConnected,
            SessionEventRequest::TrackStarted => MediaEvent::TrackStarted,
            SessionEventRequest::TransportClosed => MediaEvent::TransportClosed,
            SessionEventRequest::TransportFailed => MediaEvent::TransportFailed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn not_found(session_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Session {} not found", session_id),
        }),
    )
        .into_response()
}

/// Unparseable ids cannot name a live session
fn parse_id(raw: &str) -> Result<SessionId, Response> {
    raw.parse().map_err(|_| not_found(raw))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions
/// Accept a new session
pub async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let handle = match state.gateway.accept_offer() {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to create session: {:#}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to create session: {}", e),
                }),
            )
                .into_response();
        }
    };

    // No media engine transmits for HTTP sessions; keep the echo queue empty
    if let Some(mut outbound) = handle.outbound {
        let id = handle.session.id();
        tokio::spawn(async move {
            let mut discarded = 0u64;
            while outbound.recv().await.is_some() {
                discarded += 1;
            }
            debug!("Session {}: discarded {} echo frames", id, discarded);
        });
    }

    info!("Session {} created over HTTP", handle.session.id());

    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: handle.session.id(),
            state: handle.session.state(),
        }),
    )
        .into_response()
}

/// GET /sessions/:session_id
/// Get statistics of a session
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.gateway.stats(&id) {
        Some(stats) => (StatusCode::OK, Json(stats)).into_response(),
        None => not_found(&session_id),
    }
}

/// POST /sessions/:session_id/events
/// Report a transport or track event; repeated close or failure reports succeed
pub async fn post_event(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(event): Json<SessionEventRequest>,
) -> impl IntoResponse {
    let id = match parse_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    if state.gateway.handle_event(&id, event.into()) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found(&session_id)
    }
}

/// POST /sessions/:session_id/audio
/// Ingest raw 16-bit little-endian PCM
pub async fn post_audio(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let id = match parse_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.gateway.ingest(&id, &body) {
        Some(report) => (StatusCode::OK, Json(report)).into_response(),
        None => not_found(&session_id),
    }
}

/// DELETE /sessions/:session_id
/// Tear a session down; repeated deletes succeed
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    if let Ok(id) = session_id.parse::<SessionId>() {
        state.gateway.teardown(&id);
    }
    StatusCode::NO_CONTENT
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
