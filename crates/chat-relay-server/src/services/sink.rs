use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::utils::error::ApiError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("client disconnected")]
    Closed,

    #[error("transport write failed: {0}")]
    Transport(String),
}

impl From<SinkError> for ApiError {
    fn from(err: SinkError) -> Self {
        ApiError::Delivery(err.to_string())
    }
}

/// Receives streamed fragments, in generation order, for one request.
///
/// An `Err` aborts delivery for that request only.
#[async_trait]
pub trait TokenSink: Send {
    async fn on_token(&mut self, fragment: &str) -> Result<(), SinkError>;
}

/// What a streaming transport writes out, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token(String),
    Done,
    Failed(String),
}

/// Forwards fragments into a bounded channel drained by the transport.
pub struct ChannelSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl TokenSink for ChannelSink {
    async fn on_token(&mut self, fragment: &str) -> Result<(), SinkError> {
        self.tx
            .send(StreamEvent::Token(fragment.to_string()))
            .await
            .map_err(|_| SinkError::Closed)
    }
}

/// Collects fragments in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    pub fragments: Vec<String>,
}

#[async_trait]
impl TokenSink for BufferSink {
    async fn on_token(&mut self, fragment: &str) -> Result<(), SinkError> {
        self.fragments.push(fragment.to_string());
        Ok(())
    }
}
