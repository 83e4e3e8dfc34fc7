//! WebSocket transport for the relay.
//!
//! Every text frame from the client is one chat request. Replies are
//! `{"token": ..}` frames followed by `{"done": true}` or an error body.
//! The socket stays open for further requests until the client closes it.

use crate::models::chat::{ChatRequest, SocketFrame};
use crate::services::sink::{SinkError, TokenSink};
use crate::state::AppState;
use crate::utils::error::ApiError;
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

type SocketSender = SplitSink<WebSocket, Message>;

/// GET /chat (upgrade)
pub async fn chat_ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("WebSocket client connected");
    let (mut sender, mut receiver) = socket.split();

    while let Some(msg_result) = receiver.next().await {
        let text = match msg_result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket receive error: {}", e);
                break;
            }
        };

        if !relay_frame(&state, text.as_str(), &mut sender).await {
            break;
        }
    }

    info!("WebSocket client disconnected");
}

/// Handle one request frame. Returns `false` once the socket is unusable.
async fn relay_frame(state: &AppState, text: &str, sender: &mut SocketSender) -> bool {
    state.metrics.record_request("ws");

    let request: ChatRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            let err = ApiError::BadRequest(format!("invalid request JSON: {}", e));
            state.metrics.record_failure(&err);
            return send_text(sender, err.to_json()).await;
        }
    };

    let outcome = {
        let mut sink = SocketSink { sender: &mut *sender };
        state
            .relay
            .process_chat_stream(&request, &mut sink)
            .instrument(info_span!("chat", mode = "ws"))
            .await
    };
    state.observe_history();

    match outcome {
        Ok(_) => send_json(sender, &SocketFrame::Done { done: true }).await,
        Err(e) => {
            state.metrics.record_failure(&e);
            if matches!(e, ApiError::Delivery(_)) {
                return false;
            }
            send_text(sender, e.to_json()).await
        }
    }
}

async fn send_json<T: Serialize>(sender: &mut SocketSender, frame: &T) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => send_text(sender, json).await,
        Err(e) => {
            warn!("Failed to serialize frame: {}", e);
            true
        }
    }
}

async fn send_text(sender: &mut SocketSender, json: String) -> bool {
    sender.send(Message::Text(json.into())).await.is_ok()
}

/// Writes each fragment straight to the socket as a token frame.
struct SocketSink<'a> {
    sender: &'a mut SocketSender,
}

#[async_trait]
impl<'a> TokenSink for SocketSink<'a> {
    async fn on_token(&mut self, fragment: &str) -> Result<(), SinkError> {
        let frame = SocketFrame::Token {
            token: fragment.to_string(),
        };
        let json =
            serde_json::to_string(&frame).map_err(|e| SinkError::Transport(e.to_string()))?;

        self.sender
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))
    }
}
