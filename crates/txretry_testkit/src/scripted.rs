//! Scripted store with injectable failure sequences.
//!
//! [`ScriptedDatabase`] implements the store traits over a plain map and
//! fails `create_transaction`, `commit` and `on_error` exactly as queued.
//! Every call is recorded so tests can check which handle did what.
//!
//! ```rust
//! use txretry_core::{run_transaction, CoreError, KeyValue};
//! use txretry_testkit::scripted::{Event, ScriptedDatabase};
//!
//! let db = ScriptedDatabase::new().fail_commits(2, CoreError::transient("busy"));
//! run_transaction(&db, |tx| tx.set(b"k", b"v")).unwrap();
//!
//! assert_eq!(db.created_ids(), vec![1, 2, 3]);
//! assert_eq!(db.successful_commits(), 1);
//! assert!(matches!(db.events().last(), Some(Event::Committed { id: 3 })));
//! ```

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use txretry_core::{CoreError, CoreResult, Database, KeyValue, Transaction};

/// How `on_error` should answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Use [`CoreError::is_retryable`].
    Classify,
    /// Report retryable regardless of the error.
    Retry,
    /// Report this error as fatal.
    Fatal(CoreError),
}

/// A recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A handle was created.
    Created {
        /// Handle ID.
        id: u64,
    },
    /// Handle creation failed.
    CreateFailed {
        /// The injected error.
        error: CoreError,
    },
    /// A commit succeeded.
    Committed {
        /// Handle ID.
        id: u64,
    },
    /// A commit failed.
    CommitFailed {
        /// Handle ID.
        id: u64,
        /// The injected error.
        error: CoreError,
    },
    /// `on_error` was called.
    Resolved {
        /// Handle ID.
        id: u64,
        /// Whether the store asked for a retry.
        retry: bool,
    },
}

#[derive(Debug, Default)]
struct Script {
    create_failures: VecDeque<CoreError>,
    commit_failures: VecDeque<CoreError>,
    resolutions: VecDeque<Resolution>,
}

#[derive(Debug, Default)]
struct Inner {
    script: Mutex<Script>,
    events: Mutex<Vec<Event>>,
    data: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    committed_ids: Mutex<HashSet<u64>>,
    next_id: AtomicU64,
}

impl Inner {
    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }
}

/// A store whose failures are scripted by the test.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDatabase {
    inner: Arc<Inner>,
}

impl ScriptedDatabase {
    /// Creates a store where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `create_transaction` fail with `error`.
    #[must_use]
    pub fn fail_create(self, error: CoreError) -> Self {
        self.inner.script.lock().create_failures.push_back(error);
        self
    }

    /// Makes the next commit fail with `error`.
    #[must_use]
    pub fn fail_commit(self, error: CoreError) -> Self {
        self.inner.script.lock().commit_failures.push_back(error);
        self
    }

    /// Makes the next `count` commits fail with `error`.
    #[must_use]
    pub fn fail_commits(self, count: usize, error: CoreError) -> Self {
        {
            let mut script = self.inner.script.lock();
            script
                .commit_failures
                .extend(std::iter::repeat(error).take(count));
        }
        self
    }

    /// Queues an answer for the next `on_error` call.
    #[must_use]
    pub fn resolve(self, resolution: Resolution) -> Self {
        self.inner.script.lock().resolutions.push_back(resolution);
        self
    }

    /// Returns every recorded call, in order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.inner.events.lock().clone()
    }

    /// Returns the IDs of all handles created, in order.
    #[must_use]
    pub fn created_ids(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Created { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of commit calls, successful or not.
    #[must_use]
    pub fn commit_calls(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Committed { .. } | Event::CommitFailed { .. }))
            .count()
    }

    /// Returns the number of successful commits.
    #[must_use]
    pub fn successful_commits(&self) -> usize {
        self.inner.committed_ids.lock().len()
    }

    /// Returns the IDs of handles that had `commit` called on them, in order.
    #[must_use]
    pub fn commit_ids(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Committed { id } | Event::CommitFailed { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Returns the committed value of a key.
    #[must_use]
    pub fn value(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.data.lock().get(key).cloned()
    }

    /// Returns the number of scripted failures not yet consumed.
    #[must_use]
    pub fn pending_failures(&self) -> usize {
        let script = self.inner.script.lock();
        script.create_failures.len() + script.commit_failures.len()
    }
}

impl Database for ScriptedDatabase {
    type Transaction = ScriptedTransaction;

    fn create_transaction(&self) -> CoreResult<ScriptedTransaction> {
        let injected = self.inner.script.lock().create_failures.pop_front();
        if let Some(error) = injected {
            self.inner.record(Event::CreateFailed {
                error: error.clone(),
            });
            return Err(error);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.record(Event::Created { id });
        Ok(ScriptedTransaction {
            id,
            inner: Arc::clone(&self.inner),
            writes: BTreeMap::new(),
            committed: false,
        })
    }
}

/// A handle from a [`ScriptedDatabase`].
#[derive(Debug)]
pub struct ScriptedTransaction {
    id: u64,
    inner: Arc<Inner>,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    committed: bool,
}

impl ScriptedTransaction {
    /// Returns the handle ID.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Transaction for ScriptedTransaction {
    fn commit(&mut self) -> CoreResult<()> {
        if self.committed {
            return Err(CoreError::invalid_operation("handle committed twice"));
        }

        let injected = self.inner.script.lock().commit_failures.pop_front();
        if let Some(error) = injected {
            self.inner.record(Event::CommitFailed {
                id: self.id,
                error: error.clone(),
            });
            return Err(error);
        }

        {
            let mut data = self.inner.data.lock();
            for (key, value) in std::mem::take(&mut self.writes) {
                match value {
                    Some(v) => data.insert(key, v),
                    None => data.remove(&key),
                };
            }
        }
        self.committed = true;
        self.inner.committed_ids.lock().insert(self.id);
        self.inner.record(Event::Committed { id: self.id });
        Ok(())
    }

    fn on_error(self, error: CoreError) -> CoreResult<()> {
        let resolution = self
            .inner
            .script
            .lock()
            .resolutions
            .pop_front()
            .unwrap_or(Resolution::Classify);

        let outcome = match resolution {
            Resolution::Classify if error.is_retryable() => Ok(()),
            Resolution::Classify => Err(error),
            Resolution::Retry => Ok(()),
            Resolution::Fatal(fatal) => Err(fatal),
        };
        self.inner.record(Event::Resolved {
            id: self.id,
            retry: outcome.is_ok(),
        });
        outcome
    }
}

impl KeyValue for ScriptedTransaction {
    fn get(&mut self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }
        Ok(self.inner.data.lock().get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn clear(&mut self, key: &[u8]) -> CoreResult<()> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn add(&mut self, key: &[u8], operand: &[u8]) -> CoreResult<()> {
        let base = self.get(key)?;
        let sum = txretry_core::transaction::add_little_endian(base.as_deref(), operand);
        self.writes.insert(key.to_vec(), Some(sum));
        Ok(())
    }
}
