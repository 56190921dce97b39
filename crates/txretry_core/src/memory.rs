//! In-memory optimistic key-value store.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::stats::{StatsSnapshot, StoreStats};
use crate::store::{Database, KeyValue, Transaction};
use crate::transaction::{apply_mutations, Mutation, PendingState};
use crate::types::{SequenceNumber, TransactionId};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// A committed value and the sequence of the commit that wrote it.
#[derive(Debug, Clone)]
struct Versioned {
    value: Vec<u8>,
    version: SequenceNumber,
}

#[derive(Debug, Default)]
struct Committed {
    entries: BTreeMap<Vec<u8>, Versioned>,
    seq: SequenceNumber,
}

#[derive(Debug)]
struct Shared {
    config: Config,
    data: RwLock<Committed>,
    next_txid: AtomicU64,
    open_transactions: AtomicUsize,
    stats: StoreStats,
}

impl Shared {
    fn read(&self, key: &[u8]) -> (Option<Vec<u8>>, Option<SequenceNumber>) {
        let data = self.data.read();
        match data.entries.get(key) {
            Some(v) => (Some(v.value.clone()), Some(v.version)),
            None => (None, None),
        }
    }

    fn commit(
        &self,
        txid: TransactionId,
        started: Instant,
        pending: &PendingState,
    ) -> CoreResult<()> {
        let limit = self.config.transaction_timeout;
        let elapsed = started.elapsed();
        if elapsed > limit {
            self.stats.record_commit_failure();
            return Err(CoreError::TransactionTooOld {
                elapsed_ms: elapsed.as_millis() as u64,
                limit_ms: limit.as_millis() as u64,
            });
        }

        let p = self.config.conflict_probability;
        if p > 0.0 && rand::thread_rng().gen_bool(p.min(1.0)) {
            self.stats.record_commit_failure();
            return Err(CoreError::transient("injected commit failure"));
        }

        let mut data = self.data.write();

        for (key, observed) in pending.read_set() {
            let current = data.entries.get(key).map(|v| v.version);
            if current != *observed {
                self.stats.record_conflict();
                trace!(txn = %txid, ?observed, ?current, "read-set validation failed");
                return Err(CoreError::conflict(key.clone()));
            }
        }

        if pending.write_count() == 0 {
            self.stats.record_commit(0);
            return Ok(());
        }

        let sequence = data.seq.next();
        for (key, mutations) in pending.writes() {
            let base = data.entries.get(key).map(|v| v.value.as_slice());
            match apply_mutations(base, mutations) {
                Some(value) => {
                    data.entries.insert(
                        key.clone(),
                        Versioned {
                            value,
                            version: sequence,
                        },
                    );
                }
                None => {
                    data.entries.remove(key);
                }
            }
        }
        data.seq = sequence;

        self.stats.record_commit(pending.write_count() as u64);
        trace!(txn = %txid, %sequence, "committed");
        Ok(())
    }
}

/// An in-memory key-value store with optimistic concurrency control.
///
/// Writes are buffered per transaction and applied atomically at commit.
/// Every read records the version it observed; a commit fails with
/// [`CoreError::TransactionConflict`] if any of those versions changed.
/// Atomic [`add`](KeyValue::add) does not read, so concurrent increments of
/// the same key never conflict with each other.
///
/// Cloning is cheap and yields a handle to the same store.
///
/// ```rust
/// use txretry_core::{run_transaction, KeyValue, MemoryDatabase};
///
/// let db = MemoryDatabase::new();
/// run_transaction(&db, |tx| tx.set(b"greeting", b"hello")).unwrap();
///
/// let value = run_transaction(&db, |tx| tx.get(b"greeting")).unwrap();
/// assert_eq!(value.as_deref(), Some(&b"hello"[..]));
/// ```
#[derive(Clone)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// Creates an empty store with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an empty store with the given configuration.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                data: RwLock::new(Committed::default()),
                next_txid: AtomicU64::new(1),
                open_transactions: AtomicUsize::new(0),
                stats: StoreStats::new(),
            }),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Returns the sequence of the latest commit that wrote data.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        self.shared.data.read().seq
    }

    /// Returns the number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.data.read().entries.len()
    }

    /// Returns true if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of transactions currently open.
    #[must_use]
    pub fn open_transactions(&self) -> usize {
        self.shared.open_transactions.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of the store counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Database for MemoryDatabase {
    type Transaction = MemoryTransaction;

    fn create_transaction(&self) -> CoreResult<MemoryTransaction> {
        let limit = self.shared.config.max_open_transactions;
        self.shared
            .open_transactions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| {
                (limit == 0 || open < limit).then_some(open + 1)
            })
            .map_err(|open| {
                CoreError::resource_exhausted(format!("{open} transactions open, limit {limit}"))
            })?;

        let id = TransactionId::new(self.shared.next_txid.fetch_add(1, Ordering::SeqCst));
        self.shared.stats.record_transaction_created();

        Ok(MemoryTransaction {
            id,
            shared: Arc::clone(&self.shared),
            started: Instant::now(),
            pending: PendingState::new(),
        })
    }
}

impl std::fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDatabase")
            .field("committed_seq", &self.committed_seq())
            .field("open_transactions", &self.open_transactions())
            .finish_non_exhaustive()
    }
}

/// A transaction attempt against a [`MemoryDatabase`].
pub struct MemoryTransaction {
    id: TransactionId,
    shared: Arc<Shared>,
    started: Instant,
    pending: PendingState,
}

impl MemoryTransaction {
    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the buffered state.
    #[must_use]
    pub fn pending(&self) -> &PendingState {
        &self.pending
    }

    fn check_key(&self, key: &[u8]) -> CoreResult<()> {
        let limit = self.shared.config.max_key_size;
        if key.len() > limit {
            return Err(CoreError::KeyTooLarge {
                size: key.len(),
                limit,
            });
        }
        Ok(())
    }

    fn check_value(&self, value: &[u8]) -> CoreResult<()> {
        let limit = self.shared.config.max_value_size;
        if value.len() > limit {
            return Err(CoreError::ValueTooLarge {
                size: value.len(),
                limit,
            });
        }
        Ok(())
    }
}

impl Transaction for MemoryTransaction {
    fn commit(&mut self) -> CoreResult<()> {
        self.pending.ensure_active()?;
        match self.shared.commit(self.id, self.started, &self.pending) {
            Ok(()) => {
                self.pending.mark_committed();
                Ok(())
            }
            Err(e) => {
                self.pending.mark_failed();
                Err(e)
            }
        }
    }

    fn on_error(self, error: CoreError) -> CoreResult<()> {
        if error.is_retryable() {
            self.shared.stats.record_retry();
            debug!(txn = %self.id, %error, "commit failure is retryable");
            Ok(())
        } else {
            Err(error)
        }
    }
}

impl KeyValue for MemoryTransaction {
    fn get(&mut self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        self.pending.ensure_active()?;
        self.check_key(key)?;

        if self.pending.is_blind_write(key) {
            return Ok(apply_mutations(None, self.pending.mutations(key)));
        }

        let (value, version) = self.shared.read(key);
        self.pending.record_read(key, version);
        Ok(apply_mutations(value.as_deref(), self.pending.mutations(key)))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        self.check_key(key)?;
        self.check_value(value)?;
        self.pending.push(key, Mutation::Set(value.to_vec()))
    }

    fn clear(&mut self, key: &[u8]) -> CoreResult<()> {
        self.check_key(key)?;
        self.pending.push(key, Mutation::Clear)
    }

    fn add(&mut self, key: &[u8], operand: &[u8]) -> CoreResult<()> {
        self.check_key(key)?;
        self.check_value(operand)?;
        self.pending.push(key, Mutation::Add(operand.to_vec()))
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.shared.open_transactions.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MemoryTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransaction")
            .field("id", &self.id)
            .field("state", &self.pending.state())
            .field("writes", &self.pending.write_count())
            .finish_non_exhaustive()
    }
}
