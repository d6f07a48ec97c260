//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use chrono::Duration;
use reading_progress_core::tracker::ProgressTracker;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub tracker: ProgressTracker,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(tracker: ProgressTracker, config: Arc<Config>) -> Self {
        Self { tracker, config }
    }

    /// How long an open reading session may go without activity before it is closed.
    pub fn session_idle_limit(&self) -> Duration {
        Duration::minutes(self.config.session_idle_minutes)
    }
}
