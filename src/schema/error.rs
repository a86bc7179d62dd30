use std::{io, path::PathBuf};

use thiserror::Error;

use crate::table::TableError;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid schema setting: {0}")]
    Setting(String),
    #[error("object {name} not found")]
    ObjectNotFound { name: String },
    #[error("object {name} already exists")]
    ObjectAlreadyExists { name: String },
    #[error("schema {schema} is read only")]
    ReadOnly { schema: String },
    #[error("schema {schema} is closed")]
    Closed { schema: String },
    #[error("could not rename {} to {}: {source}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not delete {}: {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed view file {}: {reason}", path.display())]
    ViewFormat { path: PathBuf, reason: String },
    #[error("schema io error: {0}")]
    Io(#[from] io::Error),
    #[error("schema table error: {0}")]
    Table(#[from] TableError),
}
