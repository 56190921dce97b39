//! Stress tests for the retrying executor.
//!
//! These drive many workers against one [`MemoryDatabase`] and check that
//! the final counter matches the number of committed runs.

use serde::Serialize;
use std::time::Duration;
use txretry_core::{
    ops, run_workers, Config, CoreResult, KeyValue, MemoryDatabase, RetryPolicy, WorkloadConfig,
};

/// Result of a stress test run.
#[derive(Debug, Clone, Serialize)]
pub struct StressTestResult {
    /// Committed runs.
    pub operations: u64,
    /// Retries across all runs.
    pub retries: u64,
    /// Counter value read back after the run.
    pub final_value: i64,
    /// Counter value implied by the committed runs.
    pub expected_value: i64,
    /// Total duration.
    pub duration: Duration,
    /// Committed runs per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Returns true when nothing was lost or applied twice.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.final_value == self.expected_value
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent workers.
    pub threads: usize,
    /// Runs per worker.
    pub iterations: usize,
    /// Amount added per run.
    pub delta: i64,
    /// Probability of an injected transient commit failure.
    pub conflict_probability: f64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            iterations: 500,
            delta: 1,
            conflict_probability: 0.0,
        }
    }
}

impl StressConfig {
    fn database(&self) -> MemoryDatabase {
        MemoryDatabase::with_config(
            Config::new().conflict_probability(self.conflict_probability),
        )
    }

    fn workload(&self) -> WorkloadConfig {
        WorkloadConfig::new(self.threads, self.iterations).with_policy(RetryPolicy::unbounded())
    }
}

/// Increments one counter with atomic adds from every worker.
///
/// # Errors
///
/// Returns the first terminal error from any worker.
pub fn stress_atomic_counter(config: &StressConfig) -> CoreResult<StressTestResult> {
    let db = config.database();
    let key = b"stress:atomic";
    let report = run_workers(&db, &config.workload(), |tx| {
        ops::increment(tx, key, config.delta)
    })?;
    finish(&db, key, config.delta, report)
}

/// Increments one counter with read-modify-write from every worker.
///
/// Concurrent writers invalidate each other's reads, so this exercises the
/// conflict path of the store as well as the executor.
///
/// # Errors
///
/// Returns the first terminal error from any worker.
pub fn stress_read_modify_write(config: &StressConfig) -> CoreResult<StressTestResult> {
    let db = config.database();
    let key = b"stress:rmw";
    let report = run_workers(&db, &config.workload(), |tx| {
        let current = match ops::read(tx, key)? {
            Some(ops::DecodedValue::Integer(n)) => n,
            _ => 0,
        };
        tx.set(key, &ops::encode_integer(current.wrapping_add(config.delta)))
    })?;
    finish(&db, key, config.delta, report)
}

fn finish(
    db: &MemoryDatabase,
    key: &[u8],
    delta: i64,
    report: txretry_core::WorkloadReport,
) -> CoreResult<StressTestResult> {
    let final_value = match ops::read_value(db, key)? {
        Some(ops::DecodedValue::Integer(n)) => n,
        _ => 0,
    };
    Ok(StressTestResult {
        operations: report.operations,
        retries: report.retries,
        final_value,
        expected_value: (report.operations as i64).wrapping_mul(delta),
        duration: report.duration,
        ops_per_second: report.ops_per_second,
    })
}
