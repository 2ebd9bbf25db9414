//! Storage errors.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a [`crate::StorageBackend`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read extended beyond the end of the store.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Truncation target is past the end of the store.
    #[error("cannot truncate to {requested} bytes, store holds {size}")]
    TruncatePastEnd {
        /// Requested new size.
        requested: u64,
        /// Current size.
        size: u64,
    },

    /// The backend refused the write (used by fault-injecting backends).
    #[error("write rejected: {0}")]
    WriteRejected(String),
}

impl StorageError {
    /// Returns true if retrying the same operation may succeed.
    ///
    /// Range errors are programming mistakes; everything else is treated as
    /// a transient condition of the underlying device.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            StorageError::ReadPastEnd { .. } | StorageError::TruncatePastEnd { .. }
        )
    }
}
