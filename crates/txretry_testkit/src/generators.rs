//! Property-based test generators using proptest.
//!
//! Provides strategies for commit errors, key/value data, and sequences of
//! counter operations.

use proptest::prelude::*;
use txretry_core::{ops, CoreError, CoreResult, KeyValue};

/// Strategy for errors the store classifies as retryable.
pub fn retryable_error_strategy() -> impl Strategy<Value = CoreError> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 1..8).prop_map(|key| CoreError::conflict(key)),
        (1u64..10_000).prop_map(|elapsed_ms| CoreError::TransactionTooOld {
            elapsed_ms: elapsed_ms + 5_000,
            limit_ms: 5_000,
        }),
        "[a-z]{1,12}".prop_map(CoreError::commit_unknown_result),
        "[a-z]{1,12}".prop_map(CoreError::transient),
    ]
}

/// Strategy for errors the store classifies as fatal.
pub fn fatal_error_strategy() -> impl Strategy<Value = CoreError> {
    prop_oneof![
        "[a-z]{1,12}".prop_map(CoreError::invalid_operation),
        "[a-z]{1,12}".prop_map(CoreError::resource_exhausted),
        (1usize..100).prop_map(|size| CoreError::KeyTooLarge {
            size: size + 10,
            limit: 10,
        }),
    ]
}

/// Strategy for short keys.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..32)
}

/// Strategy for arbitrary values.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// A single counter operation.
#[derive(Debug, Clone)]
pub enum CounterOperation {
    /// Atomic add of a delta.
    Add(i64),
    /// Overwrite with a value.
    Set(i64),
    /// Remove the counter.
    Clear,
}

impl CounterOperation {
    /// Applies the operation to a model counter.
    #[must_use]
    pub fn apply(&self, current: i64) -> i64 {
        match self {
            CounterOperation::Add(delta) => current.wrapping_add(*delta),
            CounterOperation::Set(value) => *value,
            CounterOperation::Clear => 0,
        }
    }

    /// Performs the operation on `key` inside a transaction.
    pub fn execute<T: KeyValue>(&self, tx: &mut T, key: &[u8]) -> CoreResult<()> {
        match self {
            CounterOperation::Add(delta) => ops::increment(tx, key, *delta),
            CounterOperation::Set(value) => ops::write_integer(tx, key, *value),
            CounterOperation::Clear => tx.clear(key),
        }
    }
}

/// Strategy for counter operations.
pub fn counter_operation_strategy() -> impl Strategy<Value = CounterOperation> {
    prop_oneof![
        4 => any::<i64>().prop_map(CounterOperation::Add),
        1 => any::<i64>().prop_map(CounterOperation::Set),
        1 => Just(CounterOperation::Clear),
    ]
}

/// Strategy for a sequence of counter operations.
pub fn counter_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<CounterOperation>> {
    prop::collection::vec(counter_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
