//! The backend trait.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// The commit log writes framed records through this trait and reads them
/// back during recovery. Implementations must be `Send + Sync` because one
/// backend is shared by every committing thread (behind the log's mutex).
///
/// # Invariants
///
/// - `append` returns the offset of the first byte written
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `flush` returns, appended bytes survive a process crash
/// - `size` is the offset the next `append` will write at
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] when the range is not
    /// fully inside the store, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes appended bytes to durable storage.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Like `flush`, but also persists file metadata.
    fn sync(&mut self) -> StorageResult<()>;

    /// Discards every byte at or after `new_size`.
    ///
    /// Recovery uses this to cut a torn tail record off the log.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` is larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
