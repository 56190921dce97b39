//! # txretry Testkit
//!
//! Test utilities for txretry.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - A scripted store with injectable failures
//! - Property-based test generators using proptest
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use txretry_core::{run_transaction, CoreError, KeyValue};
//! use txretry_testkit::prelude::*;
//!
//! let db = ScriptedDatabase::new().fail_commit(CoreError::transient("busy"));
//! run_transaction(&db, |tx| tx.set(b"k", b"v")).unwrap();
//! assert_eq!(db.created_ids(), vec![1, 2]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod scripted;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::scripted::*;
    pub use crate::stress::*;
}
