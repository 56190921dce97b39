//! Error types for txretry core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while running transactions.
///
/// The store decides whether an error is retryable through
/// [`Transaction::on_error`](crate::Transaction::on_error); the
/// [`is_retryable`](CoreError::is_retryable) classification below is what
/// the bundled stores use to make that decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Another transaction committed a conflicting write.
    #[error("transaction conflict on key {key:?}")]
    TransactionConflict {
        /// The key whose observed version changed.
        key: Vec<u8>,
    },

    /// The transaction outlived the store's snapshot window.
    #[error("transaction too old: open for {elapsed_ms}ms, limit {limit_ms}ms")]
    TransactionTooOld {
        /// How long the transaction had been open.
        elapsed_ms: u64,
        /// The configured limit.
        limit_ms: u64,
    },

    /// The commit may or may not have been applied.
    #[error("commit result unknown: {message}")]
    CommitUnknownResult {
        /// Description of the failure.
        message: String,
    },

    /// A transient store condition.
    #[error("transient store error: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// The store could not hand out a new transaction.
    #[error("resource exhausted: {message}")]
    ResourceExhausted {
        /// Description of the exhausted resource.
        message: String,
    },

    /// Key exceeds the store's size limit.
    #[error("key too large: {size} bytes, limit {limit}")]
    KeyTooLarge {
        /// Actual key size in bytes.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Value exceeds the store's size limit.
    #[error("value too large: {size} bytes, limit {limit}")]
    ValueTooLarge {
        /// Actual value size in bytes.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A stored value could not be decoded.
    #[error("decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// A bounded retry policy gave up.
    #[error("retry limit exceeded after {attempts} attempts: {last_error}")]
    RetryLimitExceeded {
        /// Number of attempts made.
        attempts: u32,
        /// The last retryable error observed.
        last_error: Box<CoreError>,
    },
}

impl CoreError {
    /// Creates a transaction conflict error.
    pub fn conflict(key: impl Into<Vec<u8>>) -> Self {
        Self::TransactionConflict { key: key.into() }
    }

    /// Creates a commit-unknown-result error.
    pub fn commit_unknown_result(message: impl Into<String>) -> Self {
        Self::CommitUnknownResult {
            message: message.into(),
        }
    }

    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a resource exhausted error.
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if a fresh attempt is expected to eventually succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::TransactionConflict { .. }
                | CoreError::TransactionTooOld { .. }
                | CoreError::CommitUnknownResult { .. }
                | CoreError::Transient { .. }
        )
    }
}
