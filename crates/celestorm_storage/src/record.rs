//! Journal record framing.
//!
//! ## Record Layout
//!
//! ```text
//! +-----------+-----------+-----------+----------------+
//! | magic (4) | len (4)   | crc32 (4) | payload (len)  |
//! +-----------+-----------+-----------+----------------+
//! ```
//!
//! - `magic` is `CSJR`
//! - `len` and `crc32` are little-endian
//! - `crc32` covers the payload only

use serde::{Deserialize, Serialize};

use celestorm_core::{Batch, StoreSnapshot};

/// Magic bytes opening every journal record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"CSJR";

/// Size of the fixed record header.
pub const HEADER_SIZE: usize = 12;

/// One durable journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEntry<O, P> {
    /// A committed batch, including cursor-only batches.
    Batch(Batch<O, P>),
    /// A full copy of the store replacing everything before it.
    Checkpoint(StoreSnapshot<O, P>),
}

/// Frames `payload` as one record.
pub fn encode_record(payload: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(HEADER_SIZE + payload.len());
    record.extend_from_slice(&JOURNAL_MAGIC);
    record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    record.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    record.extend_from_slice(payload);
    record
}

/// How a scan of the journal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEnd {
    /// Every byte belongs to a complete, valid record.
    Clean,
    /// The last record is incomplete or damaged and nothing follows it.
    Torn,
    /// A damaged record is followed by more data.
    Corrupt,
}

/// Complete records found in a journal image.
#[derive(Debug)]
pub struct Scan<'a> {
    /// Payloads in journal order.
    pub payloads: Vec<&'a [u8]>,
    /// Length of the valid prefix.
    pub valid_len: usize,
    /// Why the scan stopped.
    pub end: ScanEnd,
}

/// Splits a journal image into record payloads.
///
/// Scanning stops at the first incomplete or damaged record; everything
/// from there on is outside the valid prefix. Damage counts as a torn tail
/// only when it reaches the end of the image: a short header, a length
/// running past the end, a bad checksum on the last record, or a zeroed
/// remainder. Anything else is [`ScanEnd::Corrupt`].
pub fn scan_records(bytes: &[u8]) -> Scan<'_> {
    let mut payloads = Vec::new();
    let mut pos = 0;

    let end = loop {
        let rest = &bytes[pos..];
        if rest.is_empty() {
            break ScanEnd::Clean;
        }
        if rest.len() < HEADER_SIZE {
            break ScanEnd::Torn;
        }
        if rest[..4] != JOURNAL_MAGIC {
            if rest.iter().all(|b| *b == 0) {
                break ScanEnd::Torn;
            }
            break ScanEnd::Corrupt;
        }
        let len = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let crc = u32::from_le_bytes([rest[8], rest[9], rest[10], rest[11]]);
        let Some(payload) = rest.get(HEADER_SIZE..HEADER_SIZE + len) else {
            // A length past EOF is a torn write unless later records follow it
            if rest[HEADER_SIZE..].windows(4).any(|w| w == JOURNAL_MAGIC) {
                break ScanEnd::Corrupt;
            }
            break ScanEnd::Torn;
        };
        if crc32fast::hash(payload) != crc {
            if HEADER_SIZE + len == rest.len() {
                break ScanEnd::Torn;
            }
            break ScanEnd::Corrupt;
        }
        payloads.push(payload);
        pos += HEADER_SIZE + len;
    };

    Scan {
        payloads,
        valid_len: pos,
        end,
    }
}
