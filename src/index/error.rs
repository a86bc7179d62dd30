use thiserror::Error;

use crate::{
    record::{RowKey, ValueError},
    store::{StoreError, WriterId},
};

/// Errors for primary and secondary indexes
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("duplicate key violation on {index} of table {table}: {key}")]
    DuplicateKey {
        table: String,
        index: String,
        key: String,
    },
    #[error("row {key} not found in {index} of table {table}")]
    RowNotFound {
        table: String,
        index: String,
        key: RowKey,
    },
    #[error("concurrent update on {index} of table {table}: writer {writer} has uncommitted changes")]
    ConcurrentUpdate {
        table: String,
        index: String,
        writer: WriterId,
    },
    #[error("row key column {column} of table {table} is null")]
    NullKey { table: String, column: String },
    #[error("row keys of table {table} exhausted")]
    KeyExhausted { table: String },
    #[error("corrupted entry in {index} of table {table}")]
    Corrupted { table: String, index: String },
    #[error("index value error: {0}")]
    Value(#[from] ValueError),
    #[error("index store error: {0}")]
    Store(#[from] StoreError),
    #[error("index codec error: {0}")]
    Codec(#[from] bincode::Error),
}
