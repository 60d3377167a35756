//! Dispatcher statistics for observability

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running counters of one dispatcher.
///
/// `total_calls` and `dropped_calls` are only mutated while the dispatcher
/// state lock is held, so a snapshot taken under that lock is consistent
/// with the queue contents. Execution counters are bumped outside the lock.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Every `submit`, accepted or not
    total_calls: AtomicU64,
    /// Rejections, evictions and cleared calls
    dropped_calls: AtomicU64,
    /// Calls that ran (successfully or not)
    executed_calls: AtomicU64,
    /// Calls that returned an error or panicked
    failed_calls: AtomicU64,
    /// Resumes handed to the scheduler
    deferred_resumes: AtomicU64,
}

impl DispatchStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    pub fn inc_total_calls(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_calls(&self) -> u64 {
        self.dropped_calls.load(Ordering::Relaxed)
    }

    pub fn add_dropped_calls(&self, n: u64) {
        self.dropped_calls.fetch_add(n, Ordering::Relaxed);
    }

    pub fn executed_calls(&self) -> u64 {
        self.executed_calls.load(Ordering::Relaxed)
    }

    pub fn inc_executed_calls(&self) {
        self.executed_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed_calls(&self) -> u64 {
        self.failed_calls.load(Ordering::Relaxed)
    }

    pub fn inc_failed_calls(&self) {
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deferred_resumes(&self) -> u64 {
        self.deferred_resumes.load(Ordering::Relaxed)
    }

    pub fn inc_deferred_resumes(&self) {
        self.deferred_resumes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of dispatcher statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Calls waiting across all keys
    pub total_queued_items: usize,
    /// Keys with a non-empty queue
    pub active_queues: usize,
    pub total_calls: u64,
    pub dropped_calls: u64,
    pub executed_calls: u64,
    pub failed_calls: u64,
    pub deferred_resumes: u64,
    /// `dropped_calls / max(1, total_calls)`
    pub drop_rate: f64,
    /// Queue length per non-empty key
    pub queue_details: BTreeMap<String, usize>,
}

impl StatsSnapshot {
    pub(crate) fn from_counters(stats: &DispatchStats, queue_details: BTreeMap<String, usize>) -> Self {
        let total_calls = stats.total_calls();
        let dropped_calls = stats.dropped_calls();
        Self {
            total_queued_items: queue_details.values().sum(),
            active_queues: queue_details.len(),
            total_calls,
            dropped_calls,
            executed_calls: stats.executed_calls(),
            failed_calls: stats.failed_calls(),
            deferred_resumes: stats.deferred_resumes(),
            drop_rate: dropped_calls as f64 / total_calls.max(1) as f64,
            queue_details,
        }
    }
}
