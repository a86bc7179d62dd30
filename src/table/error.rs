use thiserror::Error;

use crate::{index::IndexError, record::ValueError, store::StoreError};

#[derive(Debug, Error)]
pub enum TableError {
    #[error("table {table} is read only")]
    ReadOnly { table: String },
    #[error("table {table} is insert only until the first commit")]
    InsertOnly { table: String },
    #[error("index {index} already exists")]
    IndexAlreadyExists { index: String },
    #[error("index {index} not found on table {table}")]
    IndexNotFound { table: String, index: String },
    #[error("column {column} not found on table {table}")]
    ColumnNotFound { table: String, column: String },
    #[error("table {table} has {expected} columns, row has {actual}")]
    ColumnCount {
        table: String,
        expected: usize,
        actual: usize,
    },
    #[error("column {column} of table {table} does not accept NULL")]
    NullValue { table: String, column: String },
    #[error("table {table} is closed")]
    Closed { table: String },
    #[error("table metadata missing in {table}")]
    MetaMissing { table: String },
    #[error("table index error: {0}")]
    Index(#[from] IndexError),
    #[error("table store error: {0}")]
    Store(#[from] StoreError),
    #[error("table codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("table value error: {0}")]
    Value(#[from] ValueError),
}
