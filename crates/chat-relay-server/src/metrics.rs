use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::utils::error::ApiError;

/// Relay counters, exposed at `/metrics`.
pub struct RelayMetrics {
    registry: Registry,
    requests: IntCounterVec,
    failures: IntCounterVec,
    history_turns: IntGauge,
}

impl RelayMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("chat_requests_total", "Chat requests received, by transport mode"),
            &["mode"],
        )?;
        let failures = IntCounterVec::new(
            Opts::new("chat_failures_total", "Failed chat requests, by error kind"),
            &["kind"],
        )?;
        let history_turns = IntGauge::new("history_turns", "Turns currently held in history")?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(history_turns.clone()))?;

        Ok(Self {
            registry,
            requests,
            failures,
            history_turns,
        })
    }

    pub fn record_request(&self, mode: &str) {
        self.requests.with_label_values(&[mode]).inc();
    }

    pub fn record_failure(&self, error: &ApiError) {
        self.failures.with_label_values(&[error.kind()]).inc();
    }

    pub fn set_history_turns(&self, turns: usize) {
        self.history_turns.set(turns as i64);
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String, ApiError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| ApiError::InternalError(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| ApiError::InternalError(format!("Metrics are not UTF-8: {}", e)))
    }
}
