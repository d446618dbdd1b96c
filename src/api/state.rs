//! Application state for the API server

use crate::{Config, Orchestrator};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clones) and provides
/// access to the orchestrator and configuration.
#[derive(Clone)]
pub struct AppState {
    /// Task orchestrator (registry, pool and engine)
    pub orchestrator: Orchestrator,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(orchestrator: Orchestrator, config: Arc<Config>) -> Self {
        Self {
            orchestrator,
            config,
        }
    }
}
