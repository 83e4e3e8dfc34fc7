use crate::models::chat::HistoryResponse;
use crate::services::history::count_exchanges;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use tracing::info;

/// GET /history
pub async fn get_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    let messages = state.relay.history().snapshot();
    let exchanges = count_exchanges(&messages);

    Json(HistoryResponse {
        messages,
        exchanges,
    })
}

/// DELETE /history
pub async fn clear_history(State(state): State<AppState>) -> StatusCode {
    state.relay.history().clear();
    state.observe_history();
    info!("History cleared by request");
    StatusCode::NO_CONTENT
}
