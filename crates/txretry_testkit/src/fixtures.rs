//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use txretry_core::{ops, Config, MemoryDatabase};

/// Runs a test with a fresh in-memory database.
///
/// # Example
///
/// ```rust
/// use txretry_core::ops;
/// use txretry_testkit::fixtures::{counter_value, with_temp_db};
///
/// with_temp_db(|db| {
///     ops::increment_counter(db, b"c", 4).unwrap();
///     assert_eq!(counter_value(db, b"c"), 4);
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&MemoryDatabase) -> R,
{
    let db = MemoryDatabase::new();
    f(&db)
}

/// Runs a test with a database that fails commits with probability `p`.
pub fn with_flaky_db<F, R>(p: f64, f: F) -> R
where
    F: FnOnce(&MemoryDatabase) -> R,
{
    let db = MemoryDatabase::with_config(Config::new().conflict_probability(p));
    f(&db)
}

/// Reads a counter, treating a missing key as zero.
///
/// # Panics
///
/// Panics if the key holds something other than an encoded integer.
pub fn counter_value(db: &MemoryDatabase, key: &[u8]) -> i64 {
    match ops::read_value(db, key).expect("read failed") {
        None => 0,
        Some(ops::DecodedValue::Integer(n)) => n,
        Some(other) => panic!("{:?} is not a counter: {other}", String::from_utf8_lossy(key)),
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a database with `count` counters named `counter:0..count`,
    /// each holding its own index.
    pub fn seeded_counters(count: usize) -> MemoryDatabase {
        let db = MemoryDatabase::new();
        for i in 0..count {
            ops::set_integer(&db, counter_key(i).as_bytes(), i as i64)
                .expect("failed to seed counter");
        }
        db
    }

    /// Returns the key used by [`seeded_counters`] for index `i`.
    pub fn counter_key(i: usize) -> String {
        format!("counter:{i}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_counter_is_zero() {
        with_temp_db(|db| assert_eq!(counter_value(db, b"absent"), 0));
    }

    #[test]
    fn test_seeded_scenario() {
        let db = scenarios::seeded_counters(5);
        assert_eq!(db.len(), 5);
        assert_eq!(counter_value(&db, scenarios::counter_key(3).as_bytes()), 3);
    }

    #[test]
    fn test_flaky_db_still_converges() {
        with_flaky_db(0.5, |db| {
            for _ in 0..20 {
                ops::increment_counter(db, b"c", 1).unwrap();
            }
            assert_eq!(counter_value(db, b"c"), 20);
        });
    }
}
