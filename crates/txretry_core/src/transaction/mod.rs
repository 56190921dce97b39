//! Optimistic transaction state.
//!
//! Transactions buffer their mutations and record the version of every key
//! they read. Nothing is visible to other transactions until commit, and a
//! commit is rejected if any key in the read set changed in the meantime.

mod state;

pub use state::{add_little_endian, apply_mutations, Mutation, PendingState, TransactionState};
