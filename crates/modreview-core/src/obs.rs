//! Structured observability hooks for the review exchange lifecycle.
//!
//! This module provides:
//! - An exchange-scoped tracing span via the `ExchangeSpan` RAII guard
//! - Emission functions for lifecycle events: submitted, transition,
//!   resolved, failed, cancelled, protocol anomaly
//!
//! Verbosity follows `RUST_LOG`; pass `--json` to the CLI for JSON output.

use tracing::{info, warn};

/// RAII guard that enters a task-scoped span for the duration of a review.
///
/// ```ignore
/// let _span = ExchangeSpan::enter("42");
/// // tracing calls are now associated with task_id = "42"
/// ```
pub struct ExchangeSpan {
    _span: tracing::span::EnteredSpan,
}

impl ExchangeSpan {
    pub fn enter(task_id: &str) -> Self {
        let span = tracing::info_span!("modreview.exchange", task_id = %task_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a submission was accepted and the channel is being opened.
pub fn emit_exchange_submitted(exchange_id: &str, task_id: &str, classification: &str) {
    info!(
        event = "exchange.submitted",
        exchange_id = %exchange_id,
        task_id = %task_id,
        classification = %classification,
    );
}

/// Emit event: the state machine moved between two states.
pub fn emit_state_transition(exchange_id: &str, from: &str, to: &str) {
    info!(event = "exchange.transition", exchange_id = %exchange_id, from = %from, to = %to);
}

/// Emit event: the worker returned a correction.
pub fn emit_exchange_resolved(
    exchange_id: &str,
    task_id: &str,
    original: &str,
    corrected: &str,
    updated_confidence: f64,
) {
    info!(
        event = "exchange.resolved",
        exchange_id = %exchange_id,
        task_id = %task_id,
        original = %original,
        corrected = %corrected,
        updated_confidence = updated_confidence,
    );
}

/// Emit event: the exchange failed (warning level).
pub fn emit_exchange_failed(exchange_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "exchange.failed", exchange_id = %exchange_id, error = %error);
}

/// Emit event: the reviewer cancelled the exchange.
pub fn emit_exchange_cancelled(exchange_id: &str, from: &str) {
    info!(event = "exchange.cancelled", exchange_id = %exchange_id, from = %from);
}

/// Emit event: unrecognized frames reached the warning threshold.
pub fn emit_protocol_anomaly(exchange_id: &str, count: u32, last_error: &dyn std::fmt::Display) {
    warn!(
        event = "exchange.protocol_anomaly",
        exchange_id = %exchange_id,
        count = count,
        last_error = %last_error,
    );
}
