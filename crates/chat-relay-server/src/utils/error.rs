use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Caller input rejected before any history or backend interaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("messages cannot be empty")]
    EmptyInput,

    #[error("invalid role '{role}' at index {index}: must be 'user' or 'assistant'")]
    InvalidRole { index: usize, role: String },

    #[error("empty content at index {index}")]
    EmptyContent { index: usize },

    #[error("last message must be from user, got '{role}'")]
    NotUserTerminated { role: String },
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("LLM authentication failed: {0}")]
    BackendAuth(String),

    #[error("LLM rate limit exceeded: {0}")]
    BackendRateLimit(String),

    #[error("LLM request timed out: {0}")]
    BackendTimeout(String),

    #[error("LLM returned a malformed response: {0}")]
    BackendProtocol(String),

    #[error("LLM error: {0}")]
    Backend(String),

    #[error("Token delivery aborted: {0}")]
    Delivery(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    /// Stable machine-readable kind, used as `type`/`code` in error bodies
    /// and as the metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => "validation_error",
            ApiError::BackendAuth(_) => "unauthorized_error",
            ApiError::BackendRateLimit(_) => "rate_limit_error",
            ApiError::BackendTimeout(_) => "timeout_error",
            ApiError::BackendProtocol(_) => "protocol_error",
            ApiError::Backend(_) => "llm_error",
            ApiError::Delivery(_) | ApiError::InternalError(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::BackendAuth(_) => StatusCode::UNAUTHORIZED,
            ApiError::BackendRateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BackendTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::BackendProtocol(_) | ApiError::Backend(_) => StatusCode::BAD_GATEWAY,
            ApiError::Delivery(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, ApiError::Validation(_) | ApiError::BadRequest(_))
    }

    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                error_type: self.kind(),
                message: self.to_string(),
                code: self.kind(),
            },
        }
    }

    /// Serialized error body, for transports that write frames themselves.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.to_body()).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub message: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.is_client_error() {
            tracing::warn!(kind = self.kind(), "{}", self);
        } else {
            tracing::error!(kind = self.kind(), "{}", self);
        }

        (self.status_code(), Json(self.to_body())).into_response()
    }
}
