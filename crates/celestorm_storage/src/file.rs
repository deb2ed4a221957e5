//! File-based journal backend for persistent replicas.

use crate::backend::JournalBackend;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A journal stored in a single OS file.
///
/// The file is locked exclusively for the lifetime of the backend, so two
/// replicas can never append to the same journal. The lock is released
/// when the backend is dropped.
///
/// # Durability
///
/// `sync()` calls `File::sync_data()`; `truncate()` syncs on its own.
///
/// # Example
///
/// ```no_run
/// use celestorm_storage::{FileJournal, JournalBackend};
/// use std::path::Path;
///
/// let mut journal = FileJournal::open(Path::new("replica.journal")).unwrap();
/// journal.append(b"record").unwrap();
/// journal.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: File,
    size: u64,
}

impl FileJournal {
    /// Opens or creates the journal at `path` and locks it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another backend holds the file,
    /// or an I/O error if the file cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.to_path_buf()));
        }

        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
        })
    }

    /// Opens or creates the journal, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Same as [`FileJournal::open`].
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JournalBackend for FileJournal {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if offset > self.size || end > self.size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }

        self.file.seek(SeekFrom::Start(offset))?;
        if let Err(err) = self.file.write_all(data) {
            // Partial writes are visible to the caller through size()
            self.size = self.file.metadata()?.len();
            return Err(err.into());
        }
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if new_size > self.size {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate to size {} which is greater than current size {}",
                    new_size, self.size
                ),
            )));
        }

        self.file.set_len(new_size)?;
        self.file.sync_all()?;
        self.size = new_size;
        Ok(())
    }
}
