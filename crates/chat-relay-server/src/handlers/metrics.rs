use crate::metrics::RelayMetrics;
use crate::utils::error::ApiError;
use axum::{
    extract::State,
    http::header::CONTENT_TYPE,
    response::IntoResponse,
};
use std::sync::Arc;

/// GET /metrics
pub async fn metrics_handler(
    State(metrics): State<Arc<RelayMetrics>>,
) -> Result<impl IntoResponse, ApiError> {
    let body = metrics.render()?;
    Ok(([(CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
