use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Opaque, globally unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle state of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, transport not yet established
    New,
    /// Transport connectivity established
    Connected,
    /// Remote media is being received
    Listening,
    /// Reserved for synthesized-audio playback; nothing transitions here yet
    Speaking,
    /// Terminal
    Disconnected,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self == SessionState::Disconnected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::New => "new",
            SessionState::Connected => "connected",
            SessionState::Listening => "listening",
            SessionState::Speaking => "speaking",
            SessionState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct Status {
    state: SessionState,
    updated_at: DateTime<Utc>,
}

/// Lifecycle record for one call
///
/// State and update time change together under one lock, so readers never
/// observe a torn pair.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    status: RwLock<Status>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            created_at: now,
            status: RwLock::new(Status {
                state: SessionState::New,
                updated_at: now,
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.status.read().state
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.status.read().updated_at
    }

    /// Current state and the time it was last updated, read atomically
    pub fn snapshot(&self) -> (SessionState, DateTime<Utc>) {
        let status = self.status.read();
        (status.state, status.updated_at)
    }

    /// Move to `state`, refreshing the update time
    ///
    /// Returns `false` without changing anything once the session is
    /// disconnected; nothing leaves the terminal state.
    pub fn update_state(&self, state: SessionState) -> bool {
        let mut status = self.status.write();

        if status.state.is_terminal() {
            debug!(
                "Session {}: ignoring transition to {} after disconnect",
                self.id, state
            );
            return false;
        }

        let previous = status.state;
        status.state = state;
        status.updated_at = Utc::now();
        drop(status);

        info!("Session {}: {} -> {}", self.id, previous, state);
        true
    }

    /// Enter the terminal state; `true` only for the call that actually disconnected
    pub fn disconnect(&self) -> bool {
        self.update_state(SessionState::Disconnected)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_starts_new() {
        let session = Session::new();
        let (state, updated_at) = session.snapshot();
        assert_eq!(state, SessionState::New);
        assert_eq!(updated_at, session.created_at());
    }

    #[test]
    fn test_transitions_refresh_update_time() {
        let session = Session::new();
        let before = session.updated_at();

        assert!(session.update_state(SessionState::Connected));
        assert!(session.update_state(SessionState::Listening));
        assert_eq!(session.state(), SessionState::Listening);
        assert!(session.updated_at() >= before);
    }

    #[test]
    fn test_disconnected_is_terminal() {
        let session = Session::new();
        assert!(session.disconnect());
        let (_, disconnected_at) = session.snapshot();

        for state in [
            SessionState::New,
            SessionState::Connected,
            SessionState::Listening,
            SessionState::Speaking,
            SessionState::Disconnected,
        ] {
            assert!(!session.update_state(state));
        }

        assert_eq!(session.snapshot(), (SessionState::Disconnected, disconnected_at));
    }

    #[test]
    fn test_early_failure_goes_straight_to_disconnected() {
        let session = Session::new();
        assert!(session.disconnect());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_session_id_round_trips_through_string() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-session".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&SessionState::Disconnected).unwrap();
        assert_eq!(json, "\"disconnected\"");
    }
}
