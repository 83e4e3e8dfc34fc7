use crate::models::chat::ChatRequest;
use crate::services::sink::{ChannelSink, StreamEvent};
use crate::services::validate_messages;
use crate::state::AppState;
use crate::utils::error::ApiError;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use std::borrow::Cow;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tracing::{debug, info_span, Instrument};

use super::decode_request;

/// Fragments buffered between the relay task and the HTTP body.
const STREAM_BUFFER: usize = 64;

/// SSE readers treat a bare `\r` as a line break, so line endings are
/// normalised to `\n` before framing.
fn event_data(fragment: &str) -> Cow<'_, str> {
    if fragment.contains('\r') {
        Cow::Owned(fragment.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(fragment)
    }
}

/// POST /chat/stream
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let request = decode_request(payload).inspect_err(|e| state.metrics.record_failure(e))?;
    sse_response(state, request)
}

/// Validate up front, then run the relay on its own task and turn its
/// events into SSE frames.
///
/// Dropping the response body closes the channel, which the relay sees as
/// a sink error and stops reading from the backend.
pub(crate) fn sse_response(
    state: AppState,
    request: ChatRequest,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    state.metrics.record_request("sse");
    validate_messages(&request.messages)
        .map_err(ApiError::from)
        .inspect_err(|e| state.metrics.record_failure(e))?;

    let (tx, mut rx) = mpsc::channel::<StreamEvent>(STREAM_BUFFER);

    tokio::spawn(
        async move {
            let mut sink = ChannelSink::new(tx.clone());
            let outcome = state.relay.process_chat_stream(&request, &mut sink).await;
            state.observe_history();

            let last = match outcome {
                Ok(_) => StreamEvent::Done,
                Err(e) => {
                    state.metrics.record_failure(&e);
                    StreamEvent::Failed(e.to_json())
                }
            };
            if tx.send(last).await.is_err() {
                debug!("SSE client went away before completion");
            }
        }
        .instrument(info_span!("chat", mode = "sse")),
    );

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Token(fragment) => {
                    yield Ok(Event::default().data(event_data(&fragment)));
                }
                StreamEvent::Done => {
                    yield Ok(Event::default().data("[DONE]"));
                    break;
                }
                StreamEvent::Failed(body) => {
                    yield Ok(Event::default().event("error").data(body));
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_data_normalises_carriage_returns() {
        assert_eq!(event_data("plain"), "plain");
        assert!(matches!(event_data("plain"), Cow::Borrowed(_)));
        assert_eq!(event_data("line one\r\nline two"), "line one\nline two");
        assert_eq!(event_data("a\rb\r\n"), "a\nb\n");
    }
}
