use crate::models::chat::{ChatRequest, ChatResponse};
use crate::state::AppState;
use crate::utils::error::ApiError;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header::ACCEPT, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use tracing::{info, info_span, Instrument};

use super::{decode_request, stream::sse_response};

fn wants_event_stream(query: &HashMap<String, String>, headers: &HeaderMap) -> bool {
    let by_query = query
        .get("stream")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let by_accept = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false);

    by_query || by_accept
}

/// POST /chat
///
/// JSON reply unless the caller asks for an event stream (Accept header,
/// `?stream=true`, or `"stream": true` in the body).
pub async fn chat_handler(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = decode_request(payload).inspect_err(|e| state.metrics.record_failure(e))?;

    if request.stream || wants_event_stream(&query, &headers) {
        return sse_response(state, request).map(IntoResponse::into_response);
    }

    state.metrics.record_request("json");
    info!(messages = request.messages.len(), "Chat request");

    let outcome = state
        .relay
        .process_chat(&request)
        .instrument(info_span!("chat", mode = "json"))
        .await;
    state.observe_history();

    let response = outcome.inspect_err(|e| state.metrics.record_failure(e))?;
    Ok(Json(ChatResponse { response }).into_response())
}
