//! In-memory journal backend.

use crate::backend::JournalBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// An in-memory journal backend.
///
/// Clones share the same bytes, so a test can keep a handle, drop the
/// store that owns another one and reopen from what was written. Bytes
/// appended but never synced are discarded by [`MemoryJournal::crash`].
///
/// # Fault Injection
///
/// - [`MemoryJournal::fail_next_append`] refuses the next append outright
/// - [`MemoryJournal::tear_next_append`] writes only a prefix, then fails
/// - [`MemoryJournal::fail_next_sync`] fails the next sync after the write
///
/// # Example
///
/// ```rust
/// use celestorm_storage::{JournalBackend, MemoryJournal};
///
/// let mut journal = MemoryJournal::new();
/// let offset = journal.append(b"hello world").unwrap();
/// assert_eq!(journal.read_at(offset, 11).unwrap(), b"hello world");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    inner: Arc<Mutex<MemoryJournalState>>,
}

#[derive(Debug, Default)]
struct MemoryJournalState {
    data: Vec<u8>,
    synced: usize,
    fail_append: bool,
    tear_append: Option<usize>,
    fail_sync: bool,
}

fn injected(what: &str) -> StorageError {
    StorageError::Io(io::Error::other(format!("injected {what} failure")))
}

impl MemoryJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a journal holding `data`, all of it durable.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let synced = data.len();
        Self {
            inner: Arc::new(Mutex::new(MemoryJournalState {
                data,
                synced,
                ..MemoryJournalState::default()
            })),
        }
    }

    /// Copies the current contents.
    pub fn bytes(&self) -> Vec<u8> {
        self.inner.lock().data.clone()
    }

    /// Drops every byte not covered by a successful sync.
    pub fn crash(&self) {
        let mut state = self.inner.lock();
        let synced = state.synced;
        state.data.truncate(synced);
    }

    /// Makes the next append fail without writing anything.
    pub fn fail_next_append(&self) {
        self.inner.lock().fail_append = true;
    }

    /// Makes the next append write only its first `keep` bytes, then fail.
    pub fn tear_next_append(&self, keep: usize) {
        self.inner.lock().tear_append = Some(keep);
    }

    /// Makes the next sync fail.
    pub fn fail_next_sync(&self) {
        self.inner.lock().fail_sync = true;
    }
}

impl JournalBackend for MemoryJournal {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let state = self.inner.lock();
        let size = state.data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(state.data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut state = self.inner.lock();
        if std::mem::take(&mut state.fail_append) {
            return Err(injected("append"));
        }
        let offset = state.data.len() as u64;
        if let Some(keep) = state.tear_append.take() {
            let keep = keep.min(data.len());
            state.data.extend_from_slice(&data[..keep]);
            return Err(injected("torn append"));
        }
        state.data.extend_from_slice(data);
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        let mut state = self.inner.lock();
        if std::mem::take(&mut state.fail_sync) {
            return Err(injected("sync"));
        }
        state.synced = state.data.len();
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().data.len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut state = self.inner.lock();
        let size = state.data.len() as u64;
        if new_size > size {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot truncate to size {new_size} which is greater than current size {size}"),
            )));
        }
        state.data.truncate(new_size as usize);
        state.synced = state.synced.min(new_size as usize);
        Ok(())
    }
}
