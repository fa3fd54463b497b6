use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::session::{Session, SessionId};

/// Directory of live sessions
///
/// The only owner of session records; everything else refers to a session by
/// its id or holds a shared handle returned from here. Many concurrent
/// readers, one writer at a time, and no lock is held across anything that
/// can block.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh session in the `New` state
    pub fn create(&self) -> Arc<Session> {
        let session = Arc::new(Session::new());
        let id = session.id();

        self.sessions.write().insert(id, Arc::clone(&session));

        info!("Created new session: {}", id);
        session
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Remove a session; deleting an unknown id is a no-op
    ///
    /// Returns whether an entry was removed.
    pub fn delete(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().remove(id).is_some();
        if removed {
            info!("Removed session: {}", id);
        }
        removed
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
