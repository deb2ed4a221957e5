//! Journal-backed object store.

use crate::backend::JournalBackend;
use crate::error::{StorageError, StorageResult};
use crate::record::{encode_record, scan_records, JournalEntry, ScanEnd};
use celestorm_core::{
    Batch, Entity, Mutation, ObjectId, ObjectStore, Payload, Round, StoreError, StoreResult,
    StoreSnapshot,
};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// A durable [`ObjectStore`] over an append-only journal.
///
/// Every applied batch becomes one journal record. The record is synced
/// before the in-memory view changes, so a batch is visible only once it
/// is durable.
///
/// # Crash Recovery
///
/// Opening a journal replays every complete record. A torn or damaged
/// tail was never acknowledged and is truncated away.
///
/// # Example
///
/// ```rust
/// use celestorm_core::{Batch, Entity, Mutation, ObjectStore, Round};
/// use celestorm_storage::{JournalStore, MemoryJournal};
///
/// let journal = MemoryJournal::new();
/// let store: JournalStore<u32, String, _> = JournalStore::open(journal.clone()).unwrap();
/// let mut batch = Batch::new(Round::new(3));
/// batch.push(Mutation::Put(Entity::new(1, Round::new(3), "a".to_string())));
/// store.apply_batch(&batch).unwrap();
/// drop(store);
///
/// let reopened: JournalStore<u32, String, _> = JournalStore::open(journal).unwrap();
/// assert_eq!(reopened.last_round().unwrap(), Round::new(3));
/// ```
pub struct JournalStore<O, P, B> {
    backend: Mutex<B>,
    state: RwLock<JournalState<O, P>>,
}

struct JournalState<O, P> {
    entries: HashMap<O, Entity<O, P>>,
    last_round: Round,
}

impl<O: ObjectId, P: Payload> JournalState<O, P> {
    fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            last_round: Round::ZERO,
        }
    }

    fn replay(&mut self, entry: JournalEntry<O, P>) {
        match entry {
            JournalEntry::Batch(batch) => self.apply(&batch),
            JournalEntry::Checkpoint(snapshot) => self.restore(snapshot),
        }
    }

    fn apply(&mut self, batch: &Batch<O, P>) {
        for mutation in &batch.mutations {
            match mutation {
                Mutation::Put(entity) => {
                    self.entries.insert(entity.oid.clone(), entity.clone());
                }
                Mutation::Remove(oid) => {
                    self.entries.remove(oid);
                }
            }
        }
        self.last_round = batch.round;
    }

    fn restore(&mut self, snapshot: StoreSnapshot<O, P>) {
        self.entries = snapshot
            .entries
            .into_iter()
            .map(|entity| (entity.oid.clone(), entity))
            .collect();
        self.last_round = snapshot.round;
    }

    fn snapshot(&self) -> StoreSnapshot<O, P> {
        StoreSnapshot {
            round: self.last_round,
            entries: self.entries.values().cloned().collect(),
        }
    }
}

impl<O, P, B> JournalStore<O, P, B>
where
    O: ObjectId + Serialize + DeserializeOwned,
    P: Payload + Serialize + DeserializeOwned,
    B: JournalBackend,
{
    /// Opens a store over `backend`, replaying its journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be read, a record before the
    /// tail is damaged, a checksummed record does not decode, or the damaged
    /// tail cannot be truncated. Corruption before the tail leaves the
    /// journal untouched.
    pub fn open(mut backend: B) -> StorageResult<Self> {
        let bytes = backend.read_all()?;
        let scan = scan_records(&bytes);
        if scan.end == ScanEnd::Corrupt {
            return Err(StorageError::Corrupted(format!(
                "damaged record at offset {} with {} bytes after it",
                scan.valid_len,
                bytes.len() - scan.valid_len
            )));
        }

        let mut state = JournalState::empty();
        for (index, payload) in scan.payloads.iter().enumerate() {
            let entry: JournalEntry<O, P> = ciborium::de::from_reader(*payload).map_err(|e| {
                StorageError::Corrupted(format!("journal record {index} does not decode: {e}"))
            })?;
            state.replay(entry);
        }

        if scan.end != ScanEnd::Clean {
            warn!(
                valid_len = scan.valid_len,
                total_len = bytes.len(),
                end = ?scan.end,
                "truncating damaged journal tail"
            );
            backend.truncate(scan.valid_len as u64)?;
        }

        info!(
            records = scan.payloads.len(),
            last_round = %state.last_round,
            entries = state.entries.len(),
            "journal replayed"
        );

        Ok(Self {
            backend: Mutex::new(backend),
            state: RwLock::new(state),
        })
    }

    /// Appends a full snapshot record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be made durable.
    pub fn checkpoint(&self) -> StoreResult<()> {
        let mut backend = self.backend.lock();
        let snapshot = self.state.read().snapshot();
        let round = snapshot.round;
        Self::append_entry(&mut *backend, &JournalEntry::Checkpoint(snapshot))?;
        debug!(%round, "checkpoint written");
        Ok(())
    }

    /// Replaces the whole journal with a trusted snapshot.
    ///
    /// This is the operator path for resynchronising a halted replica.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be rewritten. The journal may
    /// then be empty; the in-memory view is left as it was.
    pub fn restore(&self, snapshot: StoreSnapshot<O, P>) -> StoreResult<()> {
        let mut backend = self.backend.lock();
        backend.truncate(0).map_err(StoreError::from)?;
        Self::append_entry(&mut *backend, &JournalEntry::Checkpoint(snapshot.clone()))?;

        info!(
            round = %snapshot.round,
            entries = snapshot.entries.len(),
            "journal restored from snapshot"
        );
        self.state.write().restore(snapshot);
        Ok(())
    }

    /// Copies the committed state.
    pub fn snapshot(&self) -> StoreSnapshot<O, P> {
        self.state.read().snapshot()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true if no entry is stored.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    fn append_entry(backend: &mut B, entry: &JournalEntry<O, P>) -> StoreResult<()> {
        let mut payload = Vec::new();
        ciborium::ser::into_writer(entry, &mut payload)
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        let record = encode_record(&payload);

        let before = backend.size().map_err(StoreError::from)?;
        let written = backend.append(&record).and_then(|_| backend.sync());
        if let Err(err) = written {
            return Err(match backend.truncate(before) {
                Ok(()) => StoreError::retryable(err.to_string()),
                Err(rollback) => {
                    warn!(error = %rollback, "could not roll back failed journal append");
                    StoreError::fatal(format!("{err}; rollback failed: {rollback}"))
                }
            });
        }
        Ok(())
    }
}

impl<O, P, B> ObjectStore<O, P> for JournalStore<O, P, B>
where
    O: ObjectId + Serialize + DeserializeOwned,
    P: Payload + Serialize + DeserializeOwned,
    B: JournalBackend,
{
    fn lookup(&self, oid: &O) -> StoreResult<Option<Entity<O, P>>> {
        Ok(self.state.read().entries.get(oid).cloned())
    }

    fn last_round(&self) -> StoreResult<Round> {
        Ok(self.state.read().last_round)
    }

    fn apply_batch(&self, batch: &Batch<O, P>) -> StoreResult<()> {
        let mut backend = self.backend.lock();

        let last = self.state.read().last_round;
        if batch.round <= last {
            return Err(StoreError::RoundRegression {
                last,
                attempted: batch.round,
            });
        }

        let entry = JournalEntry::Batch(batch.clone());
        Self::append_entry(&mut *backend, &entry)?;
        self.state.write().apply(batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryJournal;

    type Store = JournalStore<u32, String, MemoryJournal>;

    fn put(oid: u32, round: u64, state: &str) -> Mutation<u32, String> {
        Mutation::Put(Entity::new(oid, Round::new(round), state.to_string()))
    }

    fn batch(round: u64, mutations: Vec<Mutation<u32, String>>) -> Batch<u32, String> {
        Batch {
            round: Round::new(round),
            mutations,
        }
    }

    #[test]
    fn replay_restores_state() {
        let journal = MemoryJournal::new();
        {
            let store = Store::open(journal.clone()).unwrap();
            store.apply_batch(&batch(2, vec![put(1, 2, "a"), put(2, 2, "b")])).unwrap();
            store.apply_batch(&batch(5, vec![Mutation::Remove(1)])).unwrap();
            store.mark_round(Round::new(9)).unwrap();
        }

        let store = Store::open(journal).unwrap();
        assert_eq!(store.last_round().unwrap(), Round::new(9));
        assert_eq!(store.lookup(&1).unwrap(), None);
        assert_eq!(store.lookup(&2).unwrap().unwrap().state, "b");
    }

    #[test]
    fn regression_writes_nothing() {
        let journal = MemoryJournal::new();
        let store = Store::open(journal.clone()).unwrap();
        store.mark_round(Round::new(4)).unwrap();
        let size = journal.bytes().len();

        let err = store.apply_batch(&batch(4, vec![put(1, 4, "a")])).unwrap_err();
        assert!(matches!(err, StoreError::RoundRegression { .. }));
        assert_eq!(journal.bytes().len(), size);
    }

    #[test]
    fn failed_sync_rolls_back() {
        let journal = MemoryJournal::new();
        let store = Store::open(journal.clone()).unwrap();
        store.apply_batch(&batch(1, vec![put(1, 1, "a")])).unwrap();
        let size = journal.bytes().len();

        journal.fail_next_sync();
        let err = store.apply_batch(&batch(2, vec![put(2, 2, "b")])).unwrap_err();
        assert!(err.is_retry_safe());
        assert_eq!(journal.bytes().len(), size);
        assert_eq!(store.lookup(&2).unwrap(), None);
        assert_eq!(store.last_round().unwrap(), Round::new(1));

        store.apply_batch(&batch(2, vec![put(2, 2, "b")])).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let journal = MemoryJournal::new();
        {
            let store = Store::open(journal.clone()).unwrap();
            store.apply_batch(&batch(1, vec![put(1, 1, "a")])).unwrap();
        }
        let valid = journal.bytes();
        let mut damaged = valid.clone();
        damaged.extend_from_slice(b"CSJR\x40\x00\x00\x00partial");

        let journal = MemoryJournal::from_bytes(damaged);
        let store = Store::open(journal.clone()).unwrap();
        assert_eq!(store.last_round().unwrap(), Round::new(1));
        assert_eq!(journal.bytes(), valid);
    }

    #[test]
    fn undecodable_record_is_corruption() {
        let journal = MemoryJournal::from_bytes(encode_record(b"\xff\xff"));
        assert!(matches!(
            Store::open(journal),
            Err(StorageError::Corrupted(_))
        ));
    }

    #[test]
    fn checkpoint_then_replay() {
        let journal = MemoryJournal::new();
        {
            let store = Store::open(journal.clone()).unwrap();
            store.apply_batch(&batch(3, vec![put(1, 3, "a")])).unwrap();
            store.checkpoint().unwrap();
            store.apply_batch(&batch(4, vec![put(2, 4, "b")])).unwrap();
        }
        let store = Store::open(journal).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.last_round().unwrap(), Round::new(4));
    }

    #[test]
    fn restore_replaces_everything() {
        let journal = MemoryJournal::new();
        let store = Store::open(journal.clone()).unwrap();
        store.apply_batch(&batch(3, vec![put(1, 3, "a")])).unwrap();

        let trusted = StoreSnapshot {
            round: Round::new(20),
            entries: vec![Entity::new(7, Round::new(18), "z".to_string())],
        };
        store.restore(trusted.clone()).unwrap();
        assert_eq!(store.lookup(&1).unwrap(), None);
        assert_eq!(store.last_round().unwrap(), Round::new(20));
        drop(store);

        let reopened = Store::open(journal).unwrap();
        assert_eq!(reopened.snapshot(), trusted);
    }
}
