use std::sync::Arc;
use axum::extract::FromRef;

use crate::metrics::RelayMetrics;
use crate::services::ChatRelay;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<ChatRelay>,
    pub metrics: Arc<RelayMetrics>,
}

impl AppState {
    pub fn new(relay: Arc<ChatRelay>, metrics: Arc<RelayMetrics>) -> Self {
        Self { relay, metrics }
    }

    /// Refresh the history gauge after a request touched the store.
    pub fn observe_history(&self) {
        self.metrics.set_history_turns(self.relay.history().len());
    }
}

impl FromRef<AppState> for Arc<ChatRelay> {
    fn from_ref(state: &AppState) -> Self {
        state.relay.clone()
    }
}

impl FromRef<AppState> for Arc<RelayMetrics> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}
