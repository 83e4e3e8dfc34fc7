use crate::config::LlmConfig;
use crate::models::chat::Turn;
use crate::services::sink::TokenSink;
use crate::utils::error::ApiError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Chat-completions backend as seen by the relay.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Single round trip returning the full completion.
    async fn generate(&self, turns: &[Turn], max_tokens: usize) -> Result<String, ApiError>;

    /// Push each fragment to `sink` in generation order, then return the
    /// accumulated text. A sink error aborts the call.
    async fn generate_stream(
        &self,
        turns: &[Turn],
        max_tokens: usize,
        sink: &mut dyn TokenSink,
    ) -> Result<String, ApiError>;
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Turn],
    pub max_tokens: usize,
    pub temperature: f32,
    pub stream: bool,
}

// Local response structs
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChoiceChunk>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceChunk {
    #[serde(default)]
    pub delta: Option<Delta>,
    #[serde(default)]
    pub message: Option<Delta>,
}

#[derive(Debug, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

/// One line of the upstream event stream.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamLine {
    Content(String),
    Done,
    Skip,
}

pub fn parse_stream_line(raw: &str) -> StreamLine {
    let line = raw.trim_end_matches(['\r', '\n']);
    let payload = line
        .strip_prefix("data:")
        .map(str::trim_start)
        .unwrap_or(line);

    if payload.is_empty() {
        return StreamLine::Skip;
    }
    if payload == "[DONE]" {
        return StreamLine::Done;
    }

    let Ok(chunk) = serde_json::from_str::<ChatCompletionChunk>(payload) else {
        return StreamLine::Skip;
    };

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.or(choice.message))
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty())
        .map(StreamLine::Content)
        .unwrap_or(StreamLine::Skip)
}

/// Split complete lines off the front of `buffer`, leaving any partial tail.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line).into_owned());
    }
    lines
}

fn classify_transport(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::BackendTimeout(err.to_string())
    } else {
        ApiError::Backend(format!("Failed to call LLM API: {}", err))
    }
}

fn classify_status(status: StatusCode, body: &str) -> ApiError {
    let detail = format!("status {} - {}", status.as_u16(), body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::BackendAuth(detail),
        StatusCode::TOO_MANY_REQUESTS => ApiError::BackendRateLimit(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ApiError::BackendTimeout(detail)
        }
        _ => ApiError::Backend(detail),
    }
}

/// OpenAI-compatible chat completions client (Groq by default).
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ApiError::InternalError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn send(
        &self,
        turns: &[Turn],
        max_tokens: usize,
        stream: bool,
    ) -> Result<Response, ApiError> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: turns,
            max_tokens,
            temperature: self.config.temperature,
            stream,
        };

        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for LlmService {
    async fn generate(&self, turns: &[Turn], max_tokens: usize) -> Result<String, ApiError> {
        debug!("Starting chat generation with {} messages", turns.len());

        let response = self.send(turns, max_tokens, false).await?;

        let chat_response: ChatCompletionChunk = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::BackendTimeout(e.to_string())
            } else {
                ApiError::BackendProtocol(format!("Failed to parse LLM response: {}", e))
            }
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ApiError::BackendProtocol("No response content in LLM response".to_string()))
    }

    async fn generate_stream(
        &self,
        turns: &[Turn],
        max_tokens: usize,
        sink: &mut dyn TokenSink,
    ) -> Result<String, ApiError> {
        debug!("Starting chat stream with {} messages", turns.len());

        let response = self.send(turns, max_tokens, true).await?;
        let mut stream = response.bytes_stream();

        let mut buffer: Vec<u8> = Vec::new();
        let mut full = String::new();
        let mut finished = false;

        while !finished {
            let lines = match stream.next().await {
                Some(chunk) => {
                    buffer.extend_from_slice(&chunk.map_err(classify_transport)?);
                    drain_lines(&mut buffer)
                }
                // Body ended; whatever is left is the final unterminated line
                None => {
                    finished = true;
                    vec![String::from_utf8_lossy(&std::mem::take(&mut buffer)).into_owned()]
                }
            };

            for line in lines {
                match parse_stream_line(&line) {
                    StreamLine::Content(content) => {
                        full.push_str(&content);
                        if let Err(e) = sink.on_token(&content).await {
                            debug!("Token sink closed, aborting LLM stream: {}", e);
                            return Err(e.into());
                        }
                    }
                    StreamLine::Done => {
                        finished = true;
                        break;
                    }
                    StreamLine::Skip => {}
                }
            }
        }

        if full.is_empty() {
            return Err(ApiError::BackendProtocol(
                "LLM stream ended without content".to_string(),
            ));
        }
        Ok(full)
    }
}
