//! Global atomic counters for exchange observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when the CLI exits).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Process-wide exchange counters.
pub struct Metrics {
    exchanges_started: AtomicU64,
    exchanges_resolved: AtomicU64,
    exchanges_failed: AtomicU64,
    exchanges_cancelled: AtomicU64,
    protocol_errors: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            exchanges_started: AtomicU64::new(0),
            exchanges_resolved: AtomicU64::new(0),
            exchanges_failed: AtomicU64::new(0),
            exchanges_cancelled: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
        }
    }

    pub fn inc_started(&self) {
        self.exchanges_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "exchanges_started", "counter incremented");
    }

    pub fn inc_resolved(&self) {
        self.exchanges_resolved.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "exchanges_resolved", "counter incremented");
    }

    pub fn inc_failed(&self) {
        self.exchanges_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "exchanges_failed", "counter incremented");
    }

    pub fn inc_cancelled(&self) {
        self.exchanges_cancelled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "exchanges_cancelled", "counter incremented");
    }

    pub fn inc_protocol_errors(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "protocol_errors", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            exchanges_started = self.exchanges_started(),
            exchanges_resolved = self.exchanges_resolved(),
            exchanges_failed = self.exchanges_failed(),
            exchanges_cancelled = self.exchanges_cancelled(),
            protocol_errors = self.protocol_errors(),
            in_flight = self.in_flight(),
        );
    }

    /// Exchanges started but not yet resolved, failed or cancelled.
    pub fn in_flight(&self) -> u64 {
        self.exchanges_started().saturating_sub(
            self.exchanges_resolved() + self.exchanges_failed() + self.exchanges_cancelled(),
        )
    }

    pub fn exchanges_started(&self) -> u64 {
        self.exchanges_started.load(Ordering::Relaxed)
    }

    pub fn exchanges_resolved(&self) -> u64 {
        self.exchanges_resolved.load(Ordering::Relaxed)
    }

    pub fn exchanges_failed(&self) -> u64 {
        self.exchanges_failed.load(Ordering::Relaxed)
    }

    pub fn exchanges_cancelled(&self) -> u64 {
        self.exchanges_cancelled.load(Ordering::Relaxed)
    }

    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.exchanges_started.store(0, Ordering::Relaxed);
        self.exchanges_resolved.store(0, Ordering::Relaxed);
        self.exchanges_failed.store(0, Ordering::Relaxed);
        self.exchanges_cancelled.store(0, Ordering::Relaxed);
        self.protocol_errors.store(0, Ordering::Relaxed);
    }
}
