use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;
use tracing::warn;

use crate::models::chat::Turn;
use crate::utils::token_estimator::estimate_tokens;

/// Per-message framing overhead (role + separators) added on top of content.
const MESSAGE_OVERHEAD: usize = 4;

static ENCODER: Lazy<Option<CoreBPE>> = Lazy::new(|| match tiktoken_rs::cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        warn!("cl100k_base unavailable, falling back to word estimate: {}", e);
        None
    }
});

pub struct TokenCounter;

impl TokenCounter {
    pub fn count_text(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        match ENCODER.as_ref() {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => estimate_tokens(text),
        }
    }

    /// Prompt size of an outbound message list. Pure function of content.
    pub fn count_turns(turns: &[Turn]) -> usize {
        turns
            .iter()
            .map(|turn| Self::count_text(turn.content()) + MESSAGE_OVERHEAD)
            .sum()
    }
}
