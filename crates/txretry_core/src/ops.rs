//! Counter and read units of work.
//!
//! The functions taking a transaction are unit-of-work bodies: they only
//! touch the transaction, so the executor can safely re-run them. The
//! functions taking a database wrap a body in [`run_transaction`].

use crate::error::{CoreError, CoreResult};
use crate::retry::run_transaction;
use crate::store::{Database, KeyValue};
use serde::Serialize;
use std::fmt;

/// Width of an encoded integer.
pub const INTEGER_WIDTH: usize = 8;

/// A value read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    /// Exactly eight bytes, read as a little-endian `i64`.
    Integer(i64),
    /// Any other valid UTF-8.
    Text(String),
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Integer(n) => write!(f, "{n}"),
            DecodedValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// Encodes an integer the way counters are stored.
#[must_use]
pub fn encode_integer(value: i64) -> [u8; INTEGER_WIDTH] {
    value.to_le_bytes()
}

/// Decodes a stored value as an integer or a string.
///
/// # Errors
///
/// Returns [`CoreError::Decode`] if the bytes are neither eight bytes wide
/// nor valid UTF-8.
pub fn decode_value(bytes: &[u8]) -> CoreResult<DecodedValue> {
    if let Ok(raw) = <[u8; INTEGER_WIDTH]>::try_from(bytes) {
        return Ok(DecodedValue::Integer(i64::from_le_bytes(raw)));
    }
    std::str::from_utf8(bytes)
        .map(|s| DecodedValue::Text(s.to_owned()))
        .map_err(|e| {
            CoreError::decode(format!(
                "{} bytes, not an integer or UTF-8: {e}",
                bytes.len()
            ))
        })
}

/// How a stored value was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// An 8-byte little-endian `i64`.
    Integer,
    /// UTF-8 text of any length.
    Text,
}

/// Decodes a value whose kind is known.
///
/// # Errors
///
/// Returns [`CoreError::Decode`] if the bytes do not fit `kind`.
pub fn decode_as(bytes: &[u8], kind: ValueKind) -> CoreResult<DecodedValue> {
    match kind {
        ValueKind::Integer => <[u8; INTEGER_WIDTH]>::try_from(bytes)
            .map(|raw| DecodedValue::Integer(i64::from_le_bytes(raw)))
            .map_err(|_| {
                CoreError::decode(format!(
                    "expected {INTEGER_WIDTH} bytes for an integer, found {}",
                    bytes.len()
                ))
            }),
        ValueKind::Text => std::str::from_utf8(bytes)
            .map(|s| DecodedValue::Text(s.to_owned()))
            .map_err(|e| CoreError::decode(format!("not UTF-8: {e}"))),
    }
}

/// Adds `delta` to the counter at `key`.
pub fn increment<T: KeyValue>(tx: &mut T, key: &[u8], delta: i64) -> CoreResult<()> {
    tx.add(key, &encode_integer(delta))
}

/// Overwrites `key` with an encoded integer.
pub fn write_integer<T: KeyValue>(tx: &mut T, key: &[u8], value: i64) -> CoreResult<()> {
    tx.set(key, &encode_integer(value))
}

/// Reads and decodes `key`.
pub fn read<T: KeyValue>(tx: &mut T, key: &[u8]) -> CoreResult<Option<DecodedValue>> {
    tx.get(key)?.as_deref().map(decode_value).transpose()
}

/// Reads `key` and decodes it as `kind`.
pub fn read_as<T: KeyValue>(
    tx: &mut T,
    key: &[u8],
    kind: ValueKind,
) -> CoreResult<Option<DecodedValue>> {
    tx.get(key)?
        .as_deref()
        .map(|bytes| decode_as(bytes, kind))
        .transpose()
}

/// Increments the counter at `key` by `delta` in its own transaction.
pub fn increment_counter<D>(db: &D, key: &[u8], delta: i64) -> CoreResult<()>
where
    D: Database,
    D::Transaction: KeyValue,
{
    run_transaction(db, |tx| increment(tx, key, delta))
}

/// Writes an integer to `key` in its own transaction.
pub fn set_integer<D>(db: &D, key: &[u8], value: i64) -> CoreResult<()>
where
    D: Database,
    D::Transaction: KeyValue,
{
    run_transaction(db, |tx| write_integer(tx, key, value))
}

/// Reads and decodes `key` in its own transaction.
pub fn read_value<D>(db: &D, key: &[u8]) -> CoreResult<Option<DecodedValue>>
where
    D: Database,
    D::Transaction: KeyValue,
{
    run_transaction(db, |tx| read(tx, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;

    #[test]
    fn decode_integer() {
        assert_eq!(
            decode_value(&42i64.to_le_bytes()).unwrap(),
            DecodedValue::Integer(42)
        );
        assert_eq!(
            decode_value(&(-7i64).to_le_bytes()).unwrap(),
            DecodedValue::Integer(-7)
        );
    }

    #[test]
    fn decode_text() {
        assert_eq!(
            decode_value(b"hello").unwrap(),
            DecodedValue::Text("hello".into())
        );
        assert_eq!(decode_value(b"").unwrap(), DecodedValue::Text(String::new()));
    }

    #[test]
    fn decode_garbage_fails() {
        let err = decode_value(&[0xFF, 0xFE, 0x00]).unwrap_err();
        assert!(matches!(err, CoreError::Decode { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn decode_as_known_kind() {
        assert_eq!(
            decode_as(b"password", ValueKind::Text).unwrap(),
            DecodedValue::Text("password".into())
        );
        assert_eq!(
            decode_as(&9i64.to_le_bytes(), ValueKind::Integer).unwrap(),
            DecodedValue::Integer(9)
        );
        assert!(decode_as(b"short", ValueKind::Integer).is_err());
        assert!(decode_as(&[0xFF], ValueKind::Text).is_err());
    }

    #[test]
    fn increments_accumulate() {
        let db = MemoryDatabase::new();
        for _ in 0..10 {
            increment_counter(&db, b"c", 3).unwrap();
        }
        increment_counter(&db, b"c", -5).unwrap();
        assert_eq!(
            read_value(&db, b"c").unwrap(),
            Some(DecodedValue::Integer(25))
        );
    }

    #[test]
    fn read_back_written_integer() {
        let db = MemoryDatabase::new();
        set_integer(&db, b"answer", 1 << 40).unwrap();
        assert_eq!(
            read_value(&db, b"answer").unwrap(),
            Some(DecodedValue::Integer(1 << 40))
        );
    }

    #[test]
    fn read_missing_key() {
        let db = MemoryDatabase::new();
        assert_eq!(read_value(&db, b"nothing").unwrap(), None);
    }

    #[test]
    fn decode_failure_is_terminal() {
        let db = MemoryDatabase::new();
        run_transaction(&db, |tx| tx.set(b"blob", &[0xC3, 0x28])).unwrap();

        let before = db.stats().transactions_created;
        let err = read_value(&db, b"blob").unwrap_err();
        assert!(matches!(err, CoreError::Decode { .. }));
        assert_eq!(db.stats().transactions_created, before + 1);
    }

    #[test]
    fn display() {
        assert_eq!(DecodedValue::Integer(5).to_string(), "5");
        assert_eq!(DecodedValue::Text("a".into()).to_string(), "\"a\"");
    }
}
