//! Transaction state.

use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;
use std::collections::{BTreeMap, HashMap};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Commit was attempted and rejected.
    Failed,
}

/// A buffered mutation on one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Overwrite the value.
    Set(Vec<u8>),
    /// Delete the key.
    Clear,
    /// Little-endian addition of the operand.
    Add(Vec<u8>),
}

impl Mutation {
    /// Returns true if the mutation's result does not depend on the prior value.
    fn is_blind(&self) -> bool {
        matches!(self, Mutation::Set(_) | Mutation::Clear)
    }
}

/// Adds `operand` to `base` as little-endian unsigned integers.
///
/// The result has the operand's length: a shorter base is zero-extended, a
/// longer one is truncated, and overflow wraps.
#[must_use]
pub fn add_little_endian(base: Option<&[u8]>, operand: &[u8]) -> Vec<u8> {
    let base = base.unwrap_or(&[]);
    let mut out = Vec::with_capacity(operand.len());
    let mut carry = 0u16;
    for (i, &byte) in operand.iter().enumerate() {
        let sum = u16::from(byte) + u16::from(base.get(i).copied().unwrap_or(0)) + carry;
        out.push((sum & 0xFF) as u8);
        carry = sum >> 8;
    }
    out
}

/// Applies a key's mutations, in order, on top of a base value.
#[must_use]
pub fn apply_mutations(base: Option<&[u8]>, mutations: &[Mutation]) -> Option<Vec<u8>> {
    let mut current = base.map(<[u8]>::to_vec);
    for mutation in mutations {
        current = match mutation {
            Mutation::Set(value) => Some(value.clone()),
            Mutation::Clear => None,
            Mutation::Add(operand) => Some(add_little_endian(current.as_deref(), operand)),
        };
    }
    current
}

/// Buffered reads and writes of one transaction attempt.
#[derive(Debug)]
pub struct PendingState {
    state: TransactionState,
    /// Pending mutations per key, in issue order.
    writes: BTreeMap<Vec<u8>, Vec<Mutation>>,
    /// Read set for conflict detection: key -> version observed (None = absent).
    reads: HashMap<Vec<u8>, Option<SequenceNumber>>,
}

impl Default for PendingState {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingState {
    /// Creates an empty, active state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: TransactionState::Active,
            writes: BTreeMap::new(),
            reads: HashMap::new(),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Buffers a mutation.
    ///
    /// `Set` and `Clear` replace whatever was buffered for the key; `Add`
    /// stacks on top of it.
    pub fn push(&mut self, key: &[u8], mutation: Mutation) -> CoreResult<()> {
        self.ensure_active()?;
        let entry = self.writes.entry(key.to_vec()).or_default();
        if mutation.is_blind() {
            entry.clear();
        }
        entry.push(mutation);
        Ok(())
    }

    /// Returns the buffered mutations for a key.
    #[must_use]
    pub fn mutations(&self, key: &[u8]) -> &[Mutation] {
        self.writes.get(key).map_or(&[], Vec::as_slice)
    }

    /// Returns true if the key's value is fully determined by buffered writes.
    #[must_use]
    pub fn is_blind_write(&self, key: &[u8]) -> bool {
        self.mutations(key).first().is_some_and(Mutation::is_blind)
    }

    /// Records a read for conflict detection.
    ///
    /// The first observation of a key wins; later reads of the same key see
    /// the same logical version or the commit fails anyway.
    pub fn record_read(&mut self, key: &[u8], observed: Option<SequenceNumber>) {
        self.reads.entry(key.to_vec()).or_insert(observed);
    }

    /// Returns all pending writes.
    pub fn writes(&self) -> impl Iterator<Item = (&Vec<u8>, &Vec<Mutation>)> {
        self.writes.iter()
    }

    /// Returns the number of keys with pending writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Returns the read set.
    pub fn read_set(&self) -> impl Iterator<Item = (&Vec<u8>, &Option<SequenceNumber>)> {
        self.reads.iter()
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = TransactionState::Committed;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.state = TransactionState::Failed;
    }

    /// Ensures the transaction is active.
    pub fn ensure_active(&self) -> CoreResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed => Err(CoreError::invalid_operation(
                "transaction already committed",
            )),
            TransactionState::Failed => Err(CoreError::invalid_operation(
                "transaction already failed to commit",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_wraps_and_carries() {
        assert_eq!(add_little_endian(None, &[1, 0]), vec![1, 0]);
        assert_eq!(add_little_endian(Some(&[0xFF, 0]), &[1, 0]), vec![0, 1]);
        assert_eq!(add_little_endian(Some(&[0xFF, 0xFF]), &[1, 0]), vec![0, 0]);
    }

    #[test]
    fn add_resizes_base_to_operand() {
        assert_eq!(add_little_endian(Some(&[5]), &[1, 0, 0]), vec![6, 0, 0]);
        assert_eq!(add_little_endian(Some(&[5, 9, 9]), &[1]), vec![6]);
    }

    #[test]
    fn add_matches_integer_arithmetic() {
        let a = 123_456_789i64;
        let b = -1_000i64;
        let sum = add_little_endian(Some(&a.to_le_bytes()), &b.to_le_bytes());
        assert_eq!(i64::from_le_bytes(sum.try_into().unwrap()), a + b);
    }

    #[test]
    fn set_replaces_stacked_adds() {
        let mut state = PendingState::new();
        state.push(b"k", Mutation::Add(vec![1])).unwrap();
        state.push(b"k", Mutation::Add(vec![1])).unwrap();
        assert_eq!(state.mutations(b"k").len(), 2);
        assert!(!state.is_blind_write(b"k"));

        state.push(b"k", Mutation::Set(vec![7])).unwrap();
        assert_eq!(state.mutations(b"k"), &[Mutation::Set(vec![7])]);
        assert!(state.is_blind_write(b"k"));
    }

    #[test]
    fn apply_mutations_in_order() {
        let muts = vec![
            Mutation::Add(vec![2]),
            Mutation::Add(vec![3]),
            Mutation::Clear,
            Mutation::Add(vec![4]),
        ];
        assert_eq!(apply_mutations(Some(&[10]), &muts), Some(vec![4]));
        assert_eq!(apply_mutations(Some(&[10]), &muts[..2]), Some(vec![15]));
        assert_eq!(apply_mutations(Some(&[10]), &[Mutation::Clear]), None);
    }

    #[test]
    fn first_read_wins() {
        let mut state = PendingState::new();
        state.record_read(b"k", Some(SequenceNumber::new(5)));
        state.record_read(b"k", Some(SequenceNumber::new(9)));

        let reads: Vec<_> = state.read_set().collect();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].1, &Some(SequenceNumber::new(5)));
    }

    #[test]
    fn cannot_write_after_commit() {
        let mut state = PendingState::new();
        state.mark_committed();
        assert!(state.push(b"k", Mutation::Clear).is_err());
    }

    #[test]
    fn cannot_write_after_failure() {
        let mut state = PendingState::new();
        state.mark_failed();
        assert_eq!(state.state(), TransactionState::Failed);
        assert!(state.push(b"k", Mutation::Set(vec![1])).is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn add_matches_wrapping_i64(a in any::<i64>(), b in any::<i64>()) {
                let sum = add_little_endian(Some(&a.to_le_bytes()), &b.to_le_bytes());
                prop_assert_eq!(sum, a.wrapping_add(b).to_le_bytes().to_vec());
            }

            #[test]
            fn adds_commute(a in any::<i64>(), b in any::<i64>(), c in any::<i64>()) {
                let ab = add_little_endian(Some(&a.to_le_bytes()), &b.to_le_bytes());
                let abc = add_little_endian(Some(&ab), &c.to_le_bytes());
                let cb = add_little_endian(Some(&c.to_le_bytes()), &b.to_le_bytes());
                let cba = add_little_endian(Some(&cb), &a.to_le_bytes());
                prop_assert_eq!(abc, cba);
            }
        }
    }
}
