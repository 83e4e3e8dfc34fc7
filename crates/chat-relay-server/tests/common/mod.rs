#![allow(dead_code)]

use async_trait::async_trait;
use chat_relay_server::metrics::RelayMetrics;
use chat_relay_server::models::Turn;
use chat_relay_server::services::{ChatRelay, HistoryStore, LlmProvider, TokenCache, TokenSink};
use chat_relay_server::utils::ApiError;
use chat_relay_server::{build_router, AppState};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;

/// Backend double that replays fixed fragments or fails with a fixed error.
pub struct ScriptedProvider {
    fragments: Vec<&'static str>,
    failure: Option<fn() -> ApiError>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn replying(fragments: Vec<&'static str>) -> Self {
        Self {
            fragments,
            failure: None,
            delay: None,
        }
    }

    /// Pause before every fragment, like a slow backend.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(failure: fn() -> ApiError) -> Self {
        Self {
            fragments: Vec::new(),
            failure: Some(failure),
            delay: None,
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(&self, _turns: &[Turn], _max_tokens: usize) -> Result<String, ApiError> {
        match self.failure {
            Some(make) => Err(make()),
            None => Ok(self.fragments.concat()),
        }
    }

    async fn generate_stream(
        &self,
        _turns: &[Turn],
        _max_tokens: usize,
        sink: &mut dyn TokenSink,
    ) -> Result<String, ApiError> {
        if let Some(make) = self.failure {
            return Err(make());
        }
        let mut full = String::new();
        for fragment in &self.fragments {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            sink.on_token(fragment).await?;
            full.push_str(fragment);
        }
        Ok(full)
    }
}

pub fn test_state(provider: ScriptedProvider) -> AppState {
    let relay = ChatRelay::new(
        Arc::new(HistoryStore::new(20)),
        TokenCache::disabled(),
        Arc::new(provider),
        256,
    );
    AppState::new(Arc::new(relay), Arc::new(RelayMetrics::new().unwrap()))
}

pub fn test_app(provider: ScriptedProvider) -> (Router, AppState) {
    let state = test_state(provider);
    (build_router(state.clone()), state)
}
