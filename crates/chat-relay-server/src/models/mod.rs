pub mod chat;

pub use chat::{ChatMessage, ChatRequest, ChatResponse, HistoryResponse, Role, SocketFrame, Turn};
