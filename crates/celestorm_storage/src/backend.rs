//! Journal backend trait definition.

use crate::error::StorageResult;

/// An append-only byte log holding journal records.
///
/// Backends are **opaque byte stores**. They know nothing about records,
/// checksums or batches; [`crate::JournalStore`] owns the format.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - after `sync` returns, every appended byte survives process termination
/// - `truncate` only ever shrinks the log
pub trait JournalBackend: Send {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range extends past the end of the log or an
    /// I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the log.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs. The log may then hold a
    /// partial write that the caller must truncate away.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Makes every appended byte durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Current size of the log in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Shrinks the log to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` exceeds the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Reads the whole log.
    ///
    /// # Errors
    ///
    /// Same as [`JournalBackend::read_at`].
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        self.read_at(0, size as usize)
    }
}
