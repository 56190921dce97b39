//! Concurrent worker pool.
//!
//! Runs many independent executor loops at once, one thread per worker,
//! against a shared database. Each worker owns its transaction handles; the
//! database is the only shared resource.

use crate::error::CoreResult;
use crate::retry::{Executor, RetryPolicy};
use crate::store::Database;
use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Shape of a workload.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Executor runs per worker.
    pub iterations: usize,
    /// Policy applied to every run.
    pub policy: RetryPolicy,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            iterations: 1,
            policy: RetryPolicy::default(),
        }
    }
}

impl WorkloadConfig {
    /// Creates a configuration for `workers` × `iterations` runs.
    #[must_use]
    pub fn new(workers: usize, iterations: usize) -> Self {
        Self {
            workers,
            iterations,
            ..Self::default()
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the total number of runs.
    #[must_use]
    pub fn total_runs(&self) -> u64 {
        self.workers as u64 * self.iterations as u64
    }
}

/// Summary of a completed workload.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadReport {
    /// Runs that committed.
    pub operations: u64,
    /// Transaction attempts across all runs.
    pub attempts: u64,
    /// Retries across all runs.
    pub retries: u64,
    /// Wall-clock duration.
    pub duration: Duration,
    /// Committed runs per second.
    pub ops_per_second: f64,
}

impl WorkloadReport {
    fn new(operations: u64, attempts: u64, retries: u64, duration: Duration) -> Self {
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            operations as f64 / duration.as_secs_f64()
        } else {
            0.0
        };
        Self {
            operations,
            attempts,
            retries,
            duration,
            ops_per_second,
        }
    }
}

#[derive(Default)]
struct WorkerTally {
    operations: u64,
    attempts: u64,
    retries: u64,
}

/// Runs `unit_of_work` `iterations` times on each of `workers` threads.
///
/// A worker stops at its first error. All workers are joined before
/// returning; if any failed, the error of the lowest-numbered failing
/// worker is returned.
///
/// # Errors
///
/// Returns the first terminal error reported by any worker.
pub fn run_workers<D, F>(
    db: &D,
    config: &WorkloadConfig,
    unit_of_work: F,
) -> CoreResult<WorkloadReport>
where
    D: Database,
    F: Fn(&mut D::Transaction) -> CoreResult<()> + Sync,
{
    info!(
        workers = config.workers,
        iterations = config.iterations,
        "starting workload"
    );
    let start = Instant::now();
    let unit_of_work = &unit_of_work;

    let results: Vec<CoreResult<WorkerTally>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.workers)
            .map(|worker| {
                scope.spawn(move || {
                    let executor = Executor::new(db).with_policy(config.policy.clone());
                    let mut tally = WorkerTally::default();
                    for _ in 0..config.iterations {
                        let (result, stats) = executor.run_with_stats(|tx| unit_of_work(tx));
                        tally.attempts += u64::from(stats.attempts);
                        tally.retries += u64::from(stats.retries);
                        if let Err(e) = result {
                            debug!(worker, error = %e, "worker stopped");
                            return Err(e);
                        }
                        tally.operations += 1;
                    }
                    Ok(tally)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });

    let mut total = WorkerTally::default();
    for result in results {
        let tally = result?;
        total.operations += tally.operations;
        total.attempts += tally.attempts;
        total.retries += tally.retries;
    }

    let report = WorkloadReport::new(
        total.operations,
        total.attempts,
        total.retries,
        start.elapsed(),
    );
    info!(
        operations = report.operations,
        retries = report.retries,
        ops_per_second = report.ops_per_second,
        "workload finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::CoreError;
    use crate::memory::MemoryDatabase;
    use crate::ops;
    use crate::store::KeyValue;

    #[test]
    fn counts_every_run() {
        let db = MemoryDatabase::new();
        let report = run_workers(&db, &WorkloadConfig::new(4, 25), |tx| {
            ops::increment(tx, b"c", 2)
        })
        .unwrap();

        assert_eq!(report.operations, 100);
        assert_eq!(
            ops::read_value(&db, b"c").unwrap(),
            Some(ops::DecodedValue::Integer(200))
        );
    }

    #[test]
    fn injected_failures_are_retried() {
        let db = MemoryDatabase::with_config(Config::new().conflict_probability(0.3));
        let report = run_workers(&db, &WorkloadConfig::new(3, 50), |tx| {
            ops::increment(tx, b"c", 1)
        })
        .unwrap();

        assert_eq!(report.operations, 150);
        assert_eq!(report.attempts, 150 + report.retries);
        assert_eq!(db.stats().transactions_committed, 150);
        assert_eq!(
            ops::read_value(&db, b"c").unwrap(),
            Some(ops::DecodedValue::Integer(150))
        );
    }

    #[test]
    fn first_error_is_returned() {
        let db = MemoryDatabase::new();
        let result = run_workers(&db, &WorkloadConfig::new(2, 3), |tx| {
            tx.set(b"k", b"v")?;
            Err(CoreError::invalid_operation("boom"))
        });
        assert_eq!(result.unwrap_err(), CoreError::invalid_operation("boom"));
        assert!(db.is_empty());
    }

    #[test]
    fn zero_workers_is_empty() {
        let db = MemoryDatabase::new();
        let report = run_workers(&db, &WorkloadConfig::new(0, 10), |_| Ok(())).unwrap();
        assert_eq!(report.operations, 0);
        assert_eq!(WorkloadConfig::new(3, 7).total_runs(), 21);
    }
}
