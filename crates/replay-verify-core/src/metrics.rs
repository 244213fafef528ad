//! Global atomic counters for a verification run.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] once at the end of a run to emit them as a single
//! `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    attempts_started: AtomicU64,
    retries: AtomicU64,
    integrity_failures: AtomicU64,
    retries_exhausted: AtomicU64,
    partitions_succeeded: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            attempts_started: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            integrity_failures: AtomicU64::new(0),
            retries_exhausted: AtomicU64::new(0),
            partitions_succeeded: AtomicU64::new(0),
        }
    }

    pub fn inc_attempts(&self) {
        self.attempts_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "attempts_started", "counter incremented");
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "retries", "counter incremented");
    }

    pub fn inc_integrity_failures(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "integrity_failures", "counter incremented");
    }

    pub fn inc_retries_exhausted(&self) {
        self.retries_exhausted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "retries_exhausted", "counter incremented");
    }

    pub fn inc_succeeded(&self) {
        self.partitions_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "partitions_succeeded", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            attempts_started = self.attempts_started(),
            retries = self.retries(),
            integrity_failures = self.integrity_failures(),
            retries_exhausted = self.retries_exhausted(),
            partitions_succeeded = self.partitions_succeeded(),
        );
    }

    pub fn attempts_started(&self) -> u64 {
        self.attempts_started.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn integrity_failures(&self) -> u64 {
        self.integrity_failures.load(Ordering::Relaxed)
    }

    pub fn retries_exhausted(&self) -> u64 {
        self.retries_exhausted.load(Ordering::Relaxed)
    }

    pub fn partitions_succeeded(&self) -> u64 {
        self.partitions_succeeded.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.attempts_started.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);
        self.integrity_failures.store(0, Ordering::Relaxed);
        self.retries_exhausted.store(0, Ordering::Relaxed);
        self.partitions_succeeded.store(0, Ordering::Relaxed);
    }
}
