//! Order-preserving key encoding.
//!
//! Index keys are stored as raw bytes in the ordered store, so the encoding
//! must make byte order agree with SQL order. Every component starts with a
//! tag byte (`NULL_TAG` sorts before `VALUE_TAG`), followed by a fixed-width
//! big-endian payload for numbers or an escaped, terminated payload for
//! strings and binaries. Descending components are the bitwise complement of
//! their ascending form.
//!
//! A composite key is the encoded indexed values followed by the 8-byte row
//! key, so the row key can always be recovered from the tail.

use crate::record::{DataType, Row, RowKey, SearchRow, Value, ValueError};

pub(crate) const ROW_KEY_LEN: usize = 8;

const NULL_TAG: u8 = 0x00;
const VALUE_TAG: u8 = 0x01;
const ESCAPE: u8 = 0xFF;
const SIGN_BIT: u64 = 1 << 63;

pub(crate) fn encode_row_key(key: RowKey) -> [u8; ROW_KEY_LEN] {
    ((key as u64) ^ SIGN_BIT).to_be_bytes()
}

/// Decode a row key from exactly [`ROW_KEY_LEN`] bytes.
pub(crate) fn decode_row_key(bytes: &[u8]) -> Option<RowKey> {
    let raw: [u8; ROW_KEY_LEN] = bytes.try_into().ok()?;
    Some((u64::from_be_bytes(raw) ^ SIGN_BIT) as RowKey)
}

/// Split a composite key into its indexed-value prefix and row key.
pub(crate) fn split_composite(key: &[u8]) -> Option<(&[u8], RowKey)> {
    let split = key.len().checked_sub(ROW_KEY_LEN)?;
    let (prefix, tail) = key.split_at(split);
    Some((prefix, decode_row_key(tail)?))
}

/// Append one component to `out`, converting `value` to `data_type` first.
pub(crate) fn encode_component(
    out: &mut Vec<u8>,
    value: &Value,
    data_type: DataType,
    descending: bool,
) -> Result<(), ValueError> {
    let start = out.len();
    match value.convert_to(data_type)? {
        Value::Null => out.push(NULL_TAG),
        Value::Boolean(v) => out.extend_from_slice(&[VALUE_TAG, v as u8]),
        Value::Int(v) => {
            out.push(VALUE_TAG);
            out.extend_from_slice(&((v as u32) ^ (1 << 31)).to_be_bytes());
        }
        Value::Long(v) => {
            out.push(VALUE_TAG);
            out.extend_from_slice(&((v as u64) ^ SIGN_BIT).to_be_bytes());
        }
        Value::Double(v) => {
            out.push(VALUE_TAG);
            // -0.0 and 0.0 compare equal in SQL
            let bits = if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() };
            let ordered = if bits & SIGN_BIT != 0 {
                !bits
            } else {
                bits ^ SIGN_BIT
            };
            out.extend_from_slice(&ordered.to_be_bytes());
        }
        Value::Varchar(v) => {
            out.push(VALUE_TAG);
            escape_bytes(out, v.as_bytes());
        }
        Value::Binary(v) => {
            out.push(VALUE_TAG);
            escape_bytes(out, &v);
        }
    }
    if descending {
        for byte in &mut out[start..] {
            *byte = !*byte;
        }
    }
    Ok(())
}

fn escape_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    for &byte in bytes {
        out.push(byte);
        if byte == 0x00 {
            out.push(ESCAPE);
        }
    }
    out.extend_from_slice(&[0x00, 0x00]);
}

/// Smallest byte string greater than every string starting with `prefix`.
///
/// Returns `None` when no such string exists (the prefix is empty or all
/// `0xFF`), meaning the range is unbounded above.
pub(crate) fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut successor = prefix.to_vec();
    while let Some(last) = successor.pop() {
        if last != 0xFF {
            successor.push(last + 1);
            return Some(successor);
        }
    }
    None
}

/// Whether `key` lies past the inclusive upper bound `prefix`.
pub(crate) fn exceeds_prefix(key: &[u8], prefix: &[u8]) -> bool {
    match key.get(..prefix.len()) {
        Some(head) => head > prefix,
        None => key > prefix,
    }
}

/// One column of an index key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyColumn {
    pub(crate) column: usize,
    pub(crate) name: String,
    pub(crate) data_type: DataType,
    pub(crate) descending: bool,
}

/// Encoded composite key plus whether any indexed value was NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexKey {
    pub(crate) bytes: Vec<u8>,
    pub(crate) has_null: bool,
}

impl IndexKey {
    /// The indexed-value prefix, without the row key tiebreaker.
    pub(crate) fn prefix(&self) -> &[u8] {
        &self.bytes[..self.bytes.len().saturating_sub(ROW_KEY_LEN)]
    }
}

/// Column layout of a secondary index key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyLayout {
    columns: Vec<KeyColumn>,
}

impl KeyLayout {
    pub(crate) fn new(columns: Vec<KeyColumn>) -> Self {
        Self { columns }
    }

    pub(crate) fn columns(&self) -> &[KeyColumn] {
        &self.columns
    }

    /// Encode the composite key of a stored row.
    pub(crate) fn key(&self, row: &Row, row_key: RowKey) -> Result<IndexKey, ValueError> {
        let mut bytes = Vec::with_capacity(self.columns.len() * 9 + ROW_KEY_LEN);
        let mut has_null = false;
        for column in &self.columns {
            let value = row.value(column.column);
            has_null |= value.is_null();
            encode_component(&mut bytes, value, column.data_type, column.descending)?;
        }
        bytes.extend_from_slice(&encode_row_key(row_key));
        Ok(IndexKey { bytes, has_null })
    }

    /// Encode the constrained leading prefix of a search bound.
    ///
    /// Encoding stops at the first unconstrained column; `None` means the
    /// bound does not constrain the index at all.
    pub(crate) fn bound(&self, search: &SearchRow) -> Result<Option<Vec<u8>>, ValueError> {
        let mut bytes = Vec::new();
        for column in &self.columns {
            match search.value(column.column) {
                Some(value) => {
                    encode_component(&mut bytes, value, column.data_type, column.descending)?
                }
                None => break,
            }
        }
        Ok((!bytes.is_empty()).then_some(bytes))
    }

    /// Whether the first indexed value of an encoded key is NULL.
    pub(crate) fn leading_null(&self, key: &[u8]) -> bool {
        let null_tag = match self.columns.first() {
            Some(column) if column.descending => !NULL_TAG,
            Some(_) => NULL_TAG,
            None => return false,
        };
        key.first() == Some(&null_tag)
    }

    /// Human-readable `COL=value` list for error messages.
    pub(crate) fn describe(&self, row: &Row) -> String {
        self.columns
            .iter()
            .map(|column| format!("{}={}", column.name, row.value(column.column)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
