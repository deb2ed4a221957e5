//! Error types for storage operations.

use celestorm_core::StoreError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the journal.
    #[error("read beyond end of journal: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current journal size.
        size: u64,
    },

    /// A checksummed record holds something other than a journal entry.
    #[error("journal corrupted: {0}")]
    Corrupted(String),

    /// A journal entry could not be serialized.
    #[error("journal codec error: {0}")]
    Codec(String),

    /// Another process holds the journal lock.
    #[error("journal {0} is locked by another process")]
    Locked(PathBuf),
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Corrupted(message) => StoreError::Corrupted(message),
            StorageError::Codec(message) => StoreError::Codec(message),
            other => StoreError::fatal(other.to_string()),
        }
    }
}
