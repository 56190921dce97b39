//! CLI command implementations.

pub mod inc_counter;
