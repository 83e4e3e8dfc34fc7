use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::models::chat::{ChatRequest, Turn};
use crate::services::history::HistoryStore;
use crate::services::llm_service::LlmProvider;
use crate::services::sink::TokenSink;
use crate::services::token_cache::TokenCache;
use crate::services::validation::validate_messages;
use crate::utils::error::ApiError;

/// Runs one request through validate, history read, backend call and
/// history append.
pub struct ChatRelay {
    history: Arc<HistoryStore>,
    token_cache: TokenCache,
    llm: Arc<dyn LlmProvider>,
    max_tokens: usize,
}

impl ChatRelay {
    pub fn new(
        history: Arc<HistoryStore>,
        token_cache: TokenCache,
        llm: Arc<dyn LlmProvider>,
        max_tokens: usize,
    ) -> Self {
        Self {
            history,
            token_cache,
            llm,
            max_tokens,
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Validate, publish the user turn, and build the outbound list.
    ///
    /// The user turn goes into the live store before the backend is called,
    /// so concurrent requests may already see it. It is kept even if the
    /// backend later fails.
    fn prepare(&self, request: &ChatRequest) -> Result<Vec<Turn>, ApiError> {
        let user_turn = validate_messages(&request.messages)?;

        let mut outbound = self.history.snapshot();
        self.history.append(user_turn.clone());
        outbound.push(user_turn);

        // Accounting only; never awaited
        let _ = self.token_cache.spawn_resolve(outbound.clone());

        debug!(messages = outbound.len(), "Outbound conversation prepared");
        Ok(outbound)
    }

    fn complete(&self, text: &str) {
        self.history.append(Turn::assistant(text));
        info!(chars = text.len(), "Exchange completed");
    }

    pub async fn process_chat(&self, request: &ChatRequest) -> Result<String, ApiError> {
        let span = info_span!("relay", request_id = %Uuid::new_v4());

        async move {
            let outbound = self.prepare(request)?;

            let text = self
                .llm
                .generate(&outbound, self.max_tokens)
                .await
                .inspect_err(|e| warn!(kind = e.kind(), "Backend call failed: {}", e))?;

            self.complete(&text);
            Ok(text)
        }
        .instrument(span)
        .await
    }

    /// Streaming variant: fragments reach `sink` as they are generated and
    /// the concatenated text is returned once the backend finishes.
    pub async fn process_chat_stream(
        &self,
        request: &ChatRequest,
        sink: &mut dyn TokenSink,
    ) -> Result<String, ApiError> {
        let span = info_span!("relay", request_id = %Uuid::new_v4());

        async move {
            let outbound = self.prepare(request)?;

            let text = self
                .llm
                .generate_stream(&outbound, self.max_tokens, sink)
                .await
                .inspect_err(|e| warn!(kind = e.kind(), "Backend stream failed: {}", e))?;

            self.complete(&text);
            Ok(text)
        }
        .instrument(span)
        .await
    }
}
