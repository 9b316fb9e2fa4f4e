//! Coordinator counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters of a [`Coordinator`](crate::Coordinator)
///
/// Updated with relaxed atomics outside any open transaction; a snapshot
/// is not a consistent cut across counters.
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    committed: AtomicU64,
    transient_aborts: AtomicU64,
    persistent_aborts: AtomicU64,
    contended: AtomicU64,
    fallbacks: AtomicU64,
    explicit_aborts: AtomicU64,
    internal_failures: AtomicU64,
}

impl CoordinatorMetrics {
    pub(crate) fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transient(&self) {
        self.transient_aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persistent(&self, explicit: bool) {
        self.persistent_aborts.fetch_add(1, Ordering::Relaxed);
        if explicit {
            self.explicit_aborts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_contended(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_internal_failure(&self) {
        self.internal_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            committed: self.committed.load(Ordering::Relaxed),
            transient_aborts: self.transient_aborts.load(Ordering::Relaxed),
            persistent_aborts: self.persistent_aborts.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            explicit_aborts: self.explicit_aborts.load(Ordering::Relaxed),
            internal_failures: self.internal_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of coordinator counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Hardware transactions committed
    pub committed: u64,
    /// Aborts the hardware flagged as retryable
    pub transient_aborts: u64,
    /// Aborts that sent the call to the fallback path (or to an error)
    pub persistent_aborts: u64,
    /// Attempts aborted because a fallback for the same section was running
    pub contended: u64,
    /// Fallback blocks executed
    pub fallbacks: u64,
    /// Persistent aborts that were explicit
    pub explicit_aborts: u64,
    /// Atomic blocks that failed inside an open transaction
    pub internal_failures: u64,
}

impl MetricsSnapshot {
    /// Total speculative attempts that finished, committed or not
    pub fn attempts(&self) -> u64 {
        self.committed
            + self.transient_aborts
            + self.persistent_aborts
            + self.contended
            + self.internal_failures
    }

    /// Share of attempts that committed (0.0 - 1.0)
    pub fn commit_rate(&self) -> f64 {
        let attempts = self.attempts();
        if attempts == 0 {
            0.0
        } else {
            self.committed as f64 / attempts as f64
        }
    }
}
