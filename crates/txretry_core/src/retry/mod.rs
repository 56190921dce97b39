//! Transactional retry.
//!
//! [`run_transaction`] wraps a unit of work in a transaction, commits it, and
//! on a retryable commit failure re-runs the whole unit of work against a
//! fresh transaction. The store decides what is retryable; a
//! [`RetryPolicy`] can additionally cap attempts or add backoff.

mod executor;
mod policy;

pub use executor::{run_transaction, Executor, Phase, RunStats};
pub use policy::RetryPolicy;
