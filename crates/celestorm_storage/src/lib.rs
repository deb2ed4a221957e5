//! # Celestorm Storage
//!
//! Durable object stores for Celestorm replicas.
//!
//! This crate provides:
//! - [`JournalStore`]: an [`celestorm_core::ObjectStore`] over an append-only,
//!   checksummed journal
//! - Journal backends: [`MemoryJournal`] for tests and [`FileJournal`] for
//!   persistent replicas
//!
//! ## Design Principles
//!
//! - Backends are simple byte logs (read, append, sync, truncate)
//! - One batch is one record; a record is durable before it is visible
//! - Recovery replays complete records and drops a damaged tail
//!
//! ## Example
//!
//! ```rust
//! use celestorm_storage::{JournalBackend, MemoryJournal};
//!
//! let mut journal = MemoryJournal::new();
//! let offset = journal.append(b"hello world").unwrap();
//! let data = journal.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod journal;
mod memory;
mod record;

pub use backend::JournalBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileJournal;
pub use journal::JournalStore;
pub use memory::MemoryJournal;
pub use record::{encode_record, scan_records, JournalEntry, Scan, ScanEnd, HEADER_SIZE, JOURNAL_MAGIC};
