use crate::gateway::Gateway;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}
