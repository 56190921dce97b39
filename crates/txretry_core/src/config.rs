//! In-memory store configuration.

use std::time::Duration;

/// Configuration for a [`MemoryDatabase`](crate::MemoryDatabase).
#[derive(Debug, Clone)]
pub struct Config {
    /// Largest key accepted by a mutation, in bytes.
    pub max_key_size: usize,

    /// Largest value accepted by a mutation, in bytes.
    pub max_value_size: usize,

    /// How long a transaction may stay open before commit fails with
    /// `TransactionTooOld`.
    pub transaction_timeout: Duration,

    /// Probability in `[0.0, 1.0]` that a commit fails with a synthetic
    /// transient error. Used to exercise retries without contention.
    pub conflict_probability: f64,

    /// Maximum number of transactions open at once (0 = unlimited).
    pub max_open_transactions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_key_size: 10_000,
            max_value_size: 100_000,
            transaction_timeout: Duration::from_secs(5),
            conflict_probability: 0.0,
            max_open_transactions: 0,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum key size.
    #[must_use]
    pub const fn max_key_size(mut self, size: usize) -> Self {
        self.max_key_size = size;
        self
    }

    /// Sets the maximum value size.
    #[must_use]
    pub const fn max_value_size(mut self, size: usize) -> Self {
        self.max_value_size = size;
        self
    }

    /// Sets the transaction timeout.
    #[must_use]
    pub const fn transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = timeout;
        self
    }

    /// Sets the synthetic commit failure probability, clamped to `[0, 1]`.
    #[must_use]
    pub fn conflict_probability(mut self, probability: f64) -> Self {
        self.conflict_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Sets the open transaction limit.
    #[must_use]
    pub const fn max_open_transactions(mut self, limit: usize) -> Self {
        self.max_open_transactions = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.max_key_size, 10_000);
        assert_eq!(config.max_value_size, 100_000);
        assert_eq!(config.transaction_timeout, Duration::from_secs(5));
        assert_eq!(config.conflict_probability, 0.0);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .max_key_size(16)
            .transaction_timeout(Duration::from_millis(10))
            .conflict_probability(1.5);

        assert_eq!(config.max_key_size, 16);
        assert_eq!(config.transaction_timeout, Duration::from_millis(10));
        assert_eq!(config.conflict_probability, 1.0);
    }
}
