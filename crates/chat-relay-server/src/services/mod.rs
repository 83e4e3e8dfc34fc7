pub mod history;
pub mod llm_service;
pub mod relay;
pub mod sink;
pub mod token_cache;
pub mod token_counter;
pub mod validation;

pub use history::HistoryStore;
pub use llm_service::{LlmProvider, LlmService};
pub use relay::ChatRelay;
pub use sink::{BufferSink, ChannelSink, SinkError, StreamEvent, TokenSink};
pub use token_cache::{CacheBackend, TokenCache};
pub use token_counter::TokenCounter;
pub use validation::validate_messages;
