//! Transactional store capability traits.
//!
//! The executor depends on the store only through these traits:
//!
//! - [`Database::create_transaction`] hands out a fresh, single-use attempt
//! - [`Transaction::commit`] tries to apply the attempt's writes atomically
//! - [`Transaction::on_error`] decides whether a commit failure is retryable
//!
//! [`KeyValue`] is the data surface that units of work use against a live
//! handle. It is separate so the executor can be driven by stores that have
//! no key-value surface at all (see the scripted store in the testkit).

use crate::error::{CoreError, CoreResult};

/// A factory of transaction attempts.
///
/// Implementations are shared across worker threads, so they must be
/// `Send + Sync`. Each call returns an independent handle; handles are never
/// shared between concurrent callers.
pub trait Database: Send + Sync {
    /// The transaction handle type produced by this store.
    type Transaction: Transaction;

    /// Creates a fresh transaction attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot hand out another transaction.
    /// Callers treat this as fatal.
    fn create_transaction(&self) -> CoreResult<Self::Transaction>;
}

/// A single-use transaction attempt.
pub trait Transaction {
    /// Commits the buffered writes.
    ///
    /// Blocks until the store has accepted or rejected the attempt.
    ///
    /// # Errors
    ///
    /// Returns the store's reason for rejecting the commit.
    fn commit(&mut self) -> CoreResult<()>;

    /// Resolves a commit failure, consuming the handle.
    ///
    /// Returns `Ok(())` when the failure is retryable and the caller should
    /// start a new attempt. Returns `Err` with the terminal error otherwise.
    ///
    /// # Errors
    ///
    /// Returns the error to propagate when it is not retryable.
    fn on_error(self, error: CoreError) -> CoreResult<()>;
}

/// Key-value operations on a live transaction.
pub trait KeyValue {
    /// Reads a key, seeing this transaction's own pending writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is no longer active.
    fn get(&mut self, key: &[u8]) -> CoreResult<Option<Vec<u8>>>;

    /// Buffers a write of `value` to `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key or value exceeds the store's limits.
    fn set(&mut self, key: &[u8], value: &[u8]) -> CoreResult<()>;

    /// Buffers a deletion of `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is no longer active.
    fn clear(&mut self, key: &[u8]) -> CoreResult<()>;

    /// Buffers an atomic little-endian addition of `operand` to `key`.
    ///
    /// Does not read the key, so it never causes a read conflict.
    ///
    /// # Errors
    ///
    /// Returns an error if the key or operand exceeds the store's limits.
    fn add(&mut self, key: &[u8], operand: &[u8]) -> CoreResult<()>;
}
