//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Sessions**: streams opened, closed (by reason) and currently active
//! - **Quotes**: responses served, split by lookup outcome
//! - **Lookups**: provider latency and failures by kind
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns [`BuildError`] if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "forex_quote_sessions_opened_total",
        "Total quote streams opened by clients"
    );
    describe_counter!(
        "forex_quote_sessions_closed_total",
        "Total quote streams closed, by reason"
    );
    describe_gauge!(
        "forex_quote_sessions_active",
        "Number of quote streams currently open"
    );

    describe_counter!(
        "forex_quote_responses_total",
        "Total quote responses written, by lookup outcome"
    );

    describe_counter!(
        "forex_quote_lookup_failures_total",
        "Total failed price lookups, by failure kind"
    );
    describe_histogram!(
        "forex_quote_lookup_seconds",
        "Time spent resolving a symbol against the price provider"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for a served quote.
const fn outcome_label(resolved: bool) -> &'static str {
    if resolved { "resolved" } else { "fallback" }
}

/// Record a new session.
pub fn record_session_opened() {
    counter!("forex_quote_sessions_opened_total").increment(1);
}

/// Record a session ending.
pub fn record_session_closed(reason: &'static str) {
    counter!("forex_quote_sessions_closed_total", "reason" => reason).increment(1);
}

/// Update the active session gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_sessions(count: usize) {
    gauge!("forex_quote_sessions_active").set(count as f64);
}

/// Record one response written to a client.
pub fn record_quote_served(resolved: bool) {
    counter!("forex_quote_responses_total", "outcome" => outcome_label(resolved)).increment(1);
}

/// Record a failed lookup.
pub fn record_lookup_failure(kind: &'static str) {
    counter!("forex_quote_lookup_failures_total", "kind" => kind).increment(1);
}

/// Record lookup duration.
pub fn record_lookup_duration(duration: Duration) {
    histogram!("forex_quote_lookup_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
