//! # txretry core
//!
//! Retrying transaction execution against an optimistic key-value store.
//!
//! This crate provides:
//! - Store capability traits ([`Database`], [`Transaction`], [`KeyValue`])
//! - The retrying executor ([`run_transaction`], [`Executor`], [`RetryPolicy`])
//! - An in-memory optimistic store ([`MemoryDatabase`])
//! - Counter and read units of work ([`ops`])
//! - A concurrent worker pool ([`workload`])
//!
//! ```rust
//! use txretry_core::{ops, MemoryDatabase};
//!
//! let db = MemoryDatabase::new();
//! ops::increment_counter(&db, b"visits", 1).unwrap();
//! ops::increment_counter(&db, b"visits", 1).unwrap();
//! assert_eq!(
//!     ops::read_value(&db, b"visits").unwrap(),
//!     Some(ops::DecodedValue::Integer(2))
//! );
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod memory;
pub mod ops;
mod retry;
mod stats;
mod store;
pub mod transaction;
mod types;
pub mod workload;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use memory::{MemoryDatabase, MemoryTransaction};
pub use retry::{run_transaction, Executor, Phase, RetryPolicy, RunStats};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{Database, KeyValue, Transaction};
pub use types::{SequenceNumber, TransactionId};
pub use workload::{run_workers, WorkloadConfig, WorkloadReport};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
