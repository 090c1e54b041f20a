//! Observability counters for the logging pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters describing what the pipeline did with captured requests.
///
/// All counters use relaxed atomics; they are cheap to bump on the request
/// path and can be read at any time. Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Events written to the store
    events_recorded: AtomicU64,
    /// Events dropped by the dedupe gate
    events_suppressed: AtomicU64,
    /// Captured requests that matched no rule
    events_unclassified: AtomicU64,
    /// Event inserts that failed
    write_failures: AtomicU64,
    /// Dedupe store calls that failed (handled fail-open)
    dedupe_failures: AtomicU64,
    /// Completed pruning runs
    cleanup_runs: AtomicU64,
    /// Events removed by pruning
    events_pruned: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_recorded(&self) {
        self.inner.events_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed(&self) {
        self.inner.events_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unclassified(&self) {
        self.inner
            .events_unclassified
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.inner.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dedupe_failure(&self) {
        self.inner.dedupe_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cleanup(&self, pruned: usize) {
        self.inner.cleanup_runs.fetch_add(1, Ordering::Relaxed);
        self.inner
            .events_pruned
            .fetch_add(pruned as u64, Ordering::Relaxed);
    }

    pub fn events_recorded(&self) -> u64 {
        self.inner.events_recorded.load(Ordering::Relaxed)
    }

    pub fn events_suppressed(&self) -> u64 {
        self.inner.events_suppressed.load(Ordering::Relaxed)
    }

    pub fn events_unclassified(&self) -> u64 {
        self.inner.events_unclassified.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.inner.write_failures.load(Ordering::Relaxed)
    }

    pub fn dedupe_failures(&self) -> u64 {
        self.inner.dedupe_failures.load(Ordering::Relaxed)
    }

    pub fn cleanup_runs(&self) -> u64 {
        self.inner.cleanup_runs.load(Ordering::Relaxed)
    }

    pub fn events_pruned(&self) -> u64 {
        self.inner.events_pruned.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_recorded: self.events_recorded(),
            events_suppressed: self.events_suppressed(),
            events_unclassified: self.events_unclassified(),
            write_failures: self.write_failures(),
            dedupe_failures: self.dedupe_failures(),
            cleanup_runs: self.cleanup_runs(),
            events_pruned: self.events_pruned(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.events_recorded.store(0, Ordering::Relaxed);
        self.inner.events_suppressed.store(0, Ordering::Relaxed);
        self.inner.events_unclassified.store(0, Ordering::Relaxed);
        self.inner.write_failures.store(0, Ordering::Relaxed);
        self.inner.dedupe_failures.store(0, Ordering::Relaxed);
        self.inner.cleanup_runs.store(0, Ordering::Relaxed);
        self.inner.events_pruned.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_recorded: u64,
    pub events_suppressed: u64,
    pub events_unclassified: u64,
    pub write_failures: u64,
    pub dedupe_failures: u64,
    pub cleanup_runs: u64,
    pub events_pruned: u64,
}

impl MetricsSnapshot {
    /// Share of classified events that the dedupe gate dropped (0.0 to 1.0).
    ///
    /// Failed writes count as classified. Returns 0.0 if nothing was
    /// classified yet.
    pub fn suppression_rate(&self) -> f64 {
        let total = self.classified_events();
        if total == 0 {
            0.0
        } else {
            self.events_suppressed as f64 / total as f64
        }
    }

    /// Events that matched a rule, whatever happened to them afterwards.
    pub fn classified_events(&self) -> u64 {
        self.events_recorded
            .saturating_add(self.events_suppressed)
            .saturating_add(self.write_failures)
    }
}
