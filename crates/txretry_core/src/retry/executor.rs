//! Retrying transaction executor.

use crate::error::{CoreError, CoreResult};
use crate::retry::policy::RetryPolicy;
use crate::store::{Database, Transaction};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Phase of a retry loop.
///
/// ```text
/// Start -> Running -> Committing -> Done
///            |            |
///            v            v
///          Fatal <---- Resolving -> Start
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Obtaining a fresh transaction handle.
    Start,
    /// Executing the unit of work.
    Running,
    /// Waiting for the store to accept the commit.
    Committing,
    /// Asking the store whether the commit failure is retryable.
    Resolving,
    /// Committed. Terminal.
    Done,
    /// Gave up. Terminal.
    Fatal,
}

impl Phase {
    /// Returns true for `Done` and `Fatal`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Fatal)
    }
}

/// The loop's state, carrying what each phase owns.
///
/// A handle lives in exactly one of `Running`, `Committing` or `Resolving`
/// and is consumed by `on_error` on the way back to `Start`.
enum State<T, R> {
    Start,
    Running(T),
    Committing(T, R),
    Resolving(T, CoreError),
    Done(R),
    Fatal(CoreError),
}

impl<T, R> State<T, R> {
    fn phase(&self) -> Phase {
        match self {
            State::Start => Phase::Start,
            State::Running(_) => Phase::Running,
            State::Committing(..) => Phase::Committing,
            State::Resolving(..) => Phase::Resolving,
            State::Done(_) => Phase::Done,
            State::Fatal(_) => Phase::Fatal,
        }
    }
}

/// Counters for one executor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    /// Transaction handles obtained.
    pub attempts: u32,
    /// Commit failures the store resolved as retryable.
    pub retries: u32,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
    /// Terminal phase reached.
    pub outcome: Phase,
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            attempts: 0,
            retries: 0,
            elapsed: Duration::ZERO,
            outcome: Phase::Start,
        }
    }
}

/// Runs units of work against a store, retrying on retryable commit failures.
///
/// Each attempt gets a fresh handle from [`Database::create_transaction`].
/// The unit of work is re-run from scratch on every attempt, so it must not
/// have side effects outside the transaction.
///
/// Errors returned by the unit of work and errors from creating a handle are
/// terminal. Only commit failures go through [`Transaction::on_error`].
///
/// ```rust
/// use txretry_core::{Executor, KeyValue, MemoryDatabase, RetryPolicy};
///
/// let db = MemoryDatabase::new();
/// let executor = Executor::new(&db).with_policy(RetryPolicy::bounded(10));
/// let (result, stats) = executor.run_with_stats(|tx| tx.set(b"k", b"v"));
/// assert!(result.is_ok());
/// assert_eq!(stats.attempts, 1);
/// ```
#[derive(Debug)]
pub struct Executor<'a, D: Database> {
    db: &'a D,
    policy: RetryPolicy,
}

impl<'a, D: Database> Executor<'a, D> {
    /// Creates an executor with the unbounded default policy.
    pub fn new(db: &'a D) -> Self {
        Self {
            db,
            policy: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `unit_of_work` until it commits or fails fatally.
    pub fn run<R, F>(&self, unit_of_work: F) -> CoreResult<R>
    where
        F: FnMut(&mut D::Transaction) -> CoreResult<R>,
    {
        self.run_with_stats(unit_of_work).0
    }

    /// Like [`run`](Self::run), also returning the run's counters.
    pub fn run_with_stats<R, F>(&self, mut unit_of_work: F) -> (CoreResult<R>, RunStats)
    where
        F: FnMut(&mut D::Transaction) -> CoreResult<R>,
    {
        let started = Instant::now();
        let mut stats = RunStats::default();
        let mut state: State<D::Transaction, R> = State::Start;

        let result = loop {
            trace!(phase = ?state.phase(), attempt = stats.attempts, "transition");
            state = match state {
                State::Start => {
                    stats.attempts += 1;
                    match self.db.create_transaction() {
                        Ok(tx) => State::Running(tx),
                        Err(e) => State::Fatal(e),
                    }
                }
                State::Running(mut tx) => match unit_of_work(&mut tx) {
                    Ok(value) => State::Committing(tx, value),
                    Err(e) => State::Fatal(e),
                },
                State::Committing(mut tx, value) => match tx.commit() {
                    Ok(()) => State::Done(value),
                    Err(e) => State::Resolving(tx, e),
                },
                State::Resolving(tx, error) => {
                    warn!(attempt = stats.attempts, %error, "commit failed");
                    match tx.on_error(error.clone()) {
                        Ok(()) => self.retry_or_give_up(&mut stats, started, error),
                        Err(fatal) => State::Fatal(fatal),
                    }
                }
                State::Done(value) => {
                    stats.outcome = Phase::Done;
                    break Ok(value);
                }
                State::Fatal(error) => {
                    debug!(attempts = stats.attempts, %error, "transaction failed");
                    stats.outcome = Phase::Fatal;
                    break Err(error);
                }
            };
        };

        stats.elapsed = started.elapsed();
        (result, stats)
    }

    /// Applies the policy after the store resolved `error` as retryable.
    fn retry_or_give_up<T, R>(
        &self,
        stats: &mut RunStats,
        started: Instant,
        error: CoreError,
    ) -> State<T, R> {
        if !self.policy.allows_another(stats.attempts, started.elapsed()) {
            return give_up(stats, error);
        }

        let mut delay = self.policy.delay_for_retry(stats.retries + 1);
        if let Some(remaining) = self.policy.remaining(started.elapsed()) {
            delay = delay.min(remaining);
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
            if !self.policy.allows_another(stats.attempts, started.elapsed()) {
                return give_up(stats, error);
            }
        }

        stats.retries += 1;
        State::Start
    }
}

fn give_up<T, R>(stats: &RunStats, error: CoreError) -> State<T, R> {
    State::Fatal(CoreError::RetryLimitExceeded {
        attempts: stats.attempts,
        last_error: Box::new(error),
    })
}

/// Runs `unit_of_work` against `db` with the unbounded default policy.
///
/// Equivalent to `Executor::new(db).run(unit_of_work)`.
pub fn run_transaction<D, R, F>(db: &D, unit_of_work: F) -> CoreResult<R>
where
    D: Database,
    F: FnMut(&mut D::Transaction) -> CoreResult<R>,
{
    Executor::new(db).run(unit_of_work)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Commits fail with the queued errors, in order, then succeed.
    struct FlakyDb {
        commit_errors: Mutex<VecDeque<CoreError>>,
        created: AtomicU64,
        committed: AtomicU64,
    }

    impl FlakyDb {
        fn new(errors: Vec<CoreError>) -> Self {
            Self {
                commit_errors: Mutex::new(errors.into()),
                created: AtomicU64::new(0),
                committed: AtomicU64::new(0),
            }
        }
    }

    struct FlakyTx<'a> {
        db: &'a FlakyDb,
        id: u64,
    }

    /// Borrowing wrapper so transactions can point back at the test store.
    struct Flaky<'a>(&'a FlakyDb);

    impl<'a> Database for Flaky<'a> {
        type Transaction = FlakyTx<'a>;

        fn create_transaction(&self) -> CoreResult<FlakyTx<'a>> {
            let id = self.0.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(FlakyTx { db: self.0, id })
        }
    }

    impl Transaction for FlakyTx<'_> {
        fn commit(&mut self) -> CoreResult<()> {
            match self.db.commit_errors.lock().pop_front() {
                Some(e) => Err(e),
                None => {
                    self.db.committed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        }

        fn on_error(self, error: CoreError) -> CoreResult<()> {
            if error.is_retryable() {
                Ok(())
            } else {
                Err(error)
            }
        }
    }

    #[test]
    fn commits_first_time() {
        let inner = FlakyDb::new(vec![]);
        let db = Flaky(&inner);
        let (result, stats) = Executor::new(&db).run_with_stats(|tx| Ok(tx.id));
        assert_eq!(result.unwrap(), 1);
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.retries, 0);
        assert_eq!(stats.outcome, Phase::Done);
    }

    #[test]
    fn retries_with_fresh_handles() {
        let inner = FlakyDb::new(vec![
            CoreError::conflict(b"k".to_vec()),
            CoreError::transient("busy"),
        ]);
        let db = Flaky(&inner);
        let mut seen = Vec::new();
        let result = run_transaction(&db, |tx| {
            seen.push(tx.id);
            Ok(tx.id)
        });

        assert_eq!(result.unwrap(), 3);
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(inner.committed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unit_of_work_error_is_not_retried() {
        let inner = FlakyDb::new(vec![]);
        let db = Flaky(&inner);
        let mut calls = 0;
        let result: CoreResult<()> = run_transaction(&db, |_| {
            calls += 1;
            Err(CoreError::transient("raised by the unit of work"))
        });

        assert_eq!(
            result.unwrap_err(),
            CoreError::transient("raised by the unit of work")
        );
        assert_eq!(calls, 1);
        assert_eq!(inner.committed.load(Ordering::SeqCst), 0);
        // The commit queue was never consulted.
        assert_eq!(inner.commit_errors.lock().len(), 0);
    }

    #[test]
    fn fatal_commit_error_stops() {
        let fatal = CoreError::invalid_operation("malformed");
        let inner = FlakyDb::new(vec![fatal.clone(), CoreError::transient("unused")]);
        let db = Flaky(&inner);
        let (result, stats) = Executor::new(&db).run_with_stats(|_| Ok(()));

        assert_eq!(result.unwrap_err(), fatal);
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.outcome, Phase::Fatal);
        assert_eq!(inner.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bounded_policy_gives_up() {
        let inner = FlakyDb::new(vec![CoreError::transient("busy"); 5]);
        let db = Flaky(&inner);
        let executor = Executor::new(&db).with_policy(RetryPolicy::bounded(3));
        let (result, stats) = executor.run_with_stats(|_| Ok(()));

        match result.unwrap_err() {
            CoreError::RetryLimitExceeded {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(*last_error, CoreError::transient("busy"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.retries, 2);
        assert_eq!(inner.committed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn backoff_sleep_is_clamped_to_deadline() {
        let inner = FlakyDb::new(vec![CoreError::transient("busy")]);
        let db = Flaky(&inner);
        let policy = RetryPolicy::unbounded()
            .with_backoff(Duration::from_millis(500), Duration::from_millis(500))
            .with_deadline(Duration::from_millis(20));
        let executor = Executor::new(&db).with_policy(policy);
        assert_eq!(executor.policy().deadline, Some(Duration::from_millis(20)));

        let (result, stats) = executor.run_with_stats(|_| Ok(()));

        assert!(matches!(
            result,
            Err(CoreError::RetryLimitExceeded { attempts: 1, .. })
        ));
        assert_eq!(stats.retries, 0);
        assert!(stats.elapsed >= Duration::from_millis(20));
        assert!(stats.elapsed < Duration::from_millis(250), "{:?}", stats.elapsed);
        assert_eq!(inner.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn negative_multiplier_does_not_panic() {
        let inner = FlakyDb::new(vec![CoreError::transient("busy"); 2]);
        let db = Flaky(&inner);
        let policy = RetryPolicy::unbounded()
            .with_backoff(Duration::from_millis(1), Duration::from_millis(10))
            .with_backoff_multiplier(-2.0);
        let (result, stats) = Executor::new(&db).with_policy(policy).run_with_stats(|_| Ok(()));

        assert!(result.is_ok());
        assert_eq!(stats.attempts, 3);
    }

    #[test]
    fn terminal_phases() {
        assert!(Phase::Done.is_terminal());
        assert!(Phase::Fatal.is_terminal());
        assert!(!Phase::Resolving.is_terminal());
    }
}
