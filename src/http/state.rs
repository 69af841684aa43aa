use crate::session::{SessionConfig, SessionDeps, SessionHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Live recording sessions (session_id → handle)
    pub sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,

    /// Collaborators every new session is started with
    pub deps: SessionDeps,

    /// Session settings before per-request overrides
    pub defaults: SessionConfig,
}

impl AppState {
    pub fn new(deps: SessionDeps, defaults: SessionConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            deps,
            defaults,
        }
    }
}
