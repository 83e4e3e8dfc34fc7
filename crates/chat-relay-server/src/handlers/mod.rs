pub mod chat;
pub mod health;
pub mod history;
pub mod metrics;
pub mod stream;
pub mod ws;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::models::chat::ChatRequest;
use crate::utils::error::ApiError;

/// Undecodable bodies are reported like any other caller fault.
pub(crate) fn decode_request(
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<ChatRequest, ApiError> {
    payload
        .map(|Json(request)| request)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}
