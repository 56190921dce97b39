//! Store statistics.
//!
//! Counters are updated by [`MemoryDatabase`](crate::MemoryDatabase) as
//! transactions are created, committed and resolved.
//!
//! ```rust
//! use txretry_core::{ops, MemoryDatabase};
//!
//! let db = MemoryDatabase::new();
//! ops::increment_counter(&db, b"hits", 1).unwrap();
//!
//! let stats = db.stats();
//! assert_eq!(stats.transactions_committed, 1);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live store counters.
///
/// All counters are atomic and can be read while transactions are running.
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Transactions handed out by the factory.
    transactions_created: AtomicU64,
    /// Successful commits.
    transactions_committed: AtomicU64,
    /// Commits rejected by read-set validation.
    conflicts: AtomicU64,
    /// Commits rejected for any other reason.
    commit_failures: AtomicU64,
    /// Errors resolved as retryable by `on_error`.
    retries: AtomicU64,
    /// Keys written (set, clear or add) by committed transactions.
    mutations: AtomicU64,
}

impl StoreStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_transaction_created(&self) {
        self.transactions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self, mutations: u64) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
        self.mutations.fetch_add(mutations, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit_failure(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of retries granted so far.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            transactions_created: self.transactions_created.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            retries: self.retries(),
            mutations: self.mutations.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Transactions handed out by the factory.
    pub transactions_created: u64,
    /// Successful commits.
    pub transactions_committed: u64,
    /// Commits rejected by read-set validation.
    pub conflicts: u64,
    /// Commits rejected for any other reason.
    pub commit_failures: u64,
    /// Errors resolved as retryable.
    pub retries: u64,
    /// Keys written by committed transactions.
    pub mutations: u64,
}
