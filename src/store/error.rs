use std::path::PathBuf;

use thiserror::Error;

/// Errors for stores and their maps
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store {} is read-only", path.display())]
    ReadOnly { path: PathBuf },
    #[error("store {} is closed", path.display())]
    Closed { path: PathBuf },
    #[error("store {} does not exist", path.display())]
    NotFound { path: PathBuf },
    #[error("map {name} not found in store {}", path.display())]
    MapNotFound { path: PathBuf, name: String },
    #[error("store {} is already open with read_only = {open_read_only}", path.display())]
    ModeMismatch { path: PathBuf, open_read_only: bool },
    #[error("temporary map names exhausted in store {}", path.display())]
    TempNameOverflow { path: PathBuf },
}
