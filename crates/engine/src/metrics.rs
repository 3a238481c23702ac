//! Shard counters
//!
//! Counters use Relaxed ordering: they are observational only and do not
//! synchronize any other memory.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of a shard's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardMetrics {
    /// Immediate writes completed
    pub immediate_completed: u64,
    /// PREPARE writes answered PREPARED
    pub prepared: u64,
    /// Plans executed to COMPLETED
    pub planned: u64,
    /// Requests and plans that ended in a failure status
    pub rejected: u64,
    /// Pending transactions dropped because their window elapsed
    pub expired: u64,
    /// Prepared transactions currently awaiting a plan
    pub pending: u64,
    /// Prepared-transaction cache hits
    pub cache_hits: u64,
    /// Prepared-transaction cache misses
    pub cache_misses: u64,
}

#[derive(Debug, Default)]
pub(crate) struct ShardCounters {
    immediate_completed: AtomicU64,
    prepared: AtomicU64,
    planned: AtomicU64,
    rejected: AtomicU64,
    expired: AtomicU64,
}

impl ShardCounters {
    pub(crate) fn immediate_completed(&self) {
        self.immediate_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn prepared(&self) {
        self.prepared.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn planned(&self) {
        self.planned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn expired(&self, count: u64) {
        self.expired.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ShardMetrics {
        ShardMetrics {
            immediate_completed: self.immediate_completed.load(Ordering::Relaxed),
            prepared: self.prepared.load(Ordering::Relaxed),
            planned: self.planned.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            ..ShardMetrics::default()
        }
    }
}
