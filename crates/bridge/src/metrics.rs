//! Metrics instrumentation for bridge decisions and transport calls.

use crate::confirmation::ConfirmationState;
use std::time::Instant;
use widget_bridge_core::{Category, DecisionReason, OnExceeded};

/// Count one permission decision.
pub fn record_decision(category: Category, reason: DecisionReason) {
    metrics::counter!(
        "bridge_decisions_total",
        1,
        "category" => category.as_str(),
        "reason" => reason.as_str()
    );
}

/// Count one call refused by a rate limit.
pub fn record_rate_limited(category: Category, mode: OnExceeded) {
    metrics::counter!(
        "bridge_rate_limited_total",
        1,
        "category" => category.as_str(),
        "mode" => mode.as_str()
    );
}

/// Count one terminal confirmation outcome.
pub fn record_confirmation(state: ConfirmationState) {
    metrics::counter!("bridge_confirmations_total", 1, "result" => state.as_str());
}

/// Record backend transport latency.
pub fn record_transport_latency(category: Category, duration_ms: f64) {
    metrics::histogram!("bridge_transport_latency", duration_ms, "category" => category.as_str());
}

/// RAII timer for transport latency.
pub struct MetricTimer {
    start: Instant,
    category: Category,
}

impl MetricTimer {
    pub fn new(category: Category) -> Self {
        Self {
            start: Instant::now(),
            category,
        }
    }
}

impl Drop for MetricTimer {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        record_transport_latency(self.category, duration_ms);
    }
}
