//! Scheduler counters and snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time view of scheduler activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Records accepted by `schedule`.
    pub scheduled: u64,
    /// Scheduled records that entered the working set immediately.
    pub admitted: u64,
    /// Scheduled records left in the durable store for backfill.
    pub deferred: u64,
    /// Records pushed out of the working set to make room.
    pub evicted: u64,
    /// Records handed to the transport successfully.
    pub dispatched: u64,
    /// Records dropped after a transport or template failure.
    pub failed: u64,
    /// Records loaded from the durable store by backfill.
    pub backfilled: u64,
    /// Durable store operations that failed.
    pub store_errors: u64,
    /// Records resident in memory when the snapshot was taken.
    pub in_memory: usize,
}

/// Internal counters (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct SchedulerCounters {
    pub scheduled: AtomicU64,
    pub admitted: AtomicU64,
    pub deferred: AtomicU64,
    pub evicted: AtomicU64,
    pub dispatched: AtomicU64,
    pub failed: AtomicU64,
    pub backfilled: AtomicU64,
    pub store_errors: AtomicU64,
}

impl SchedulerCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub(crate) fn snapshot(&self, in_memory: usize) -> SchedulerStats {
        SchedulerStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            backfilled: self.backfilled.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            in_memory,
        }
    }
}
