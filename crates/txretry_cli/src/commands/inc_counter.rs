//! Inc-counter-test command implementation.

use crate::OutputFormat;
use serde::Serialize;
use txretry_core::ops::{self, DecodedValue};
use txretry_core::{
    run_workers, Config, MemoryDatabase, RetryPolicy, StatsSnapshot, WorkloadConfig,
    WorkloadReport,
};

/// Arguments of the inc-counter-test command.
#[derive(Debug, Clone)]
pub struct IncCounterArgs {
    /// Counter key.
    pub key: String,
    /// Concurrent workers.
    pub workers: usize,
    /// Increments per worker.
    pub iterations: usize,
    /// Amount added per increment.
    pub delta: i64,
    /// Attempt cap per increment.
    pub max_attempts: Option<u32>,
    /// Injected commit failure probability.
    pub conflict_rate: f64,
}

/// Inc-counter-test result.
#[derive(Debug, Serialize)]
pub struct IncCounterResult {
    /// Counter key.
    pub key: String,
    /// Counter value read back after all workers finished.
    pub final_value: i64,
    /// `workers × iterations × delta`.
    pub expected_value: i64,
    /// Worker pool report.
    pub workload: WorkloadReport,
    /// Store counters.
    pub store: StatsSnapshot,
}

impl IncCounterResult {
    fn matches(&self) -> bool {
        self.final_value == self.expected_value
    }
}

/// Runs the inc-counter-test command.
pub fn run(args: &IncCounterArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&args.conflict_rate) {
        return Err(format!("conflict rate must be in [0, 1], got {}", args.conflict_rate).into());
    }
    if args.conflict_rate >= 1.0 && args.max_attempts.is_none() {
        return Err("a conflict rate of 1 fails every commit; set --max-attempts".into());
    }

    let db = MemoryDatabase::with_config(Config::new().conflict_probability(args.conflict_rate));
    let policy = match args.max_attempts {
        Some(n) => RetryPolicy::bounded(n),
        None => RetryPolicy::unbounded(),
    };
    let config = WorkloadConfig::new(args.workers, args.iterations).with_policy(policy);

    let key = args.key.as_bytes();
    let workload = run_workers(&db, &config, |tx| ops::increment(tx, key, args.delta))?;

    let final_value = match ops::read_value(&db, key)? {
        None => 0,
        Some(DecodedValue::Integer(n)) => n,
        Some(other) => return Err(format!("counter holds a non-integer: {other}").into()),
    };
    let expected_value = (config.total_runs() as i64).wrapping_mul(args.delta);

    let result = IncCounterResult {
        key: args.key.clone(),
        final_value,
        expected_value,
        workload,
        store: db.stats(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text(&result),
    }

    if !result.matches() {
        return Err(format!(
            "counter mismatch: expected {}, found {}",
            result.expected_value, result.final_value
        )
        .into());
    }
    Ok(())
}

fn print_text(result: &IncCounterResult) {
    println!("Counter {:?}", result.key);
    println!("  Final value:    {}", result.final_value);
    println!("  Expected value: {}", result.expected_value);
    println!();
    println!("Workload:");
    println!("  Operations:  {}", result.workload.operations);
    println!("  Attempts:    {}", result.workload.attempts);
    println!("  Retries:     {}", result.workload.retries);
    println!("  Duration:    {:?}", result.workload.duration);
    println!("  Throughput:  {:.2} ops/sec", result.workload.ops_per_second);
    println!();
    println!("Store:");
    println!("  Transactions created:   {}", result.store.transactions_created);
    println!("  Transactions committed: {}", result.store.transactions_committed);
    println!("  Conflicts:              {}", result.store.conflicts);
    println!("  Commit failures:        {}", result.store.commit_failures);
}
