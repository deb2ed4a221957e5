//! Crash recovery tests for the journal store.

use celestorm_core::{Batch, Entity, Mutation, ObjectStore, Round, StoreError};
use celestorm_storage::{FileJournal, JournalStore, MemoryJournal, StorageError, HEADER_SIZE};
use proptest::prelude::*;
use tempfile::tempdir;

type Store<B> = JournalStore<u64, Vec<u8>, B>;

fn batch(round: u64, oid: u64, state: Vec<u8>) -> Batch<u64, Vec<u8>> {
    Batch {
        round: Round::new(round),
        mutations: vec![Mutation::Put(Entity::new(oid, Round::new(round), state))],
    }
}

#[test]
fn unsynced_batch_is_lost_on_crash() {
    let journal = MemoryJournal::new();
    let store: Store<_> = JournalStore::open(journal.clone()).unwrap();
    store.apply_batch(&batch(1, 1, vec![1])).unwrap();

    // The next append lands only partially before the process dies
    journal.tear_next_append(5);
    let err = store.apply_batch(&batch(2, 2, vec![2])).unwrap_err();
    assert!(matches!(err, StoreError::Backend { .. }));
    drop(store);
    journal.crash();

    let store: Store<_> = JournalStore::open(journal).unwrap();
    assert_eq!(store.last_round().unwrap(), Round::new(1));
    assert_eq!(store.lookup(&2).unwrap(), None);
}

#[test]
fn file_journal_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replica.journal");

    {
        let store: Store<_> = JournalStore::open(FileJournal::open(&path).unwrap()).unwrap();
        store.apply_batch(&batch(3, 1, b"one".to_vec())).unwrap();
        store.apply_batch(&batch(8, 2, b"two".to_vec())).unwrap();
    }

    let store: Store<_> = JournalStore::open(FileJournal::open(&path).unwrap()).unwrap();
    assert_eq!(store.last_round().unwrap(), Round::new(8));
    assert_eq!(store.lookup(&1).unwrap().unwrap().state, b"one".to_vec());
    assert_eq!(store.revision_of(&2).unwrap(), Some(Round::new(8)));
}

#[test]
fn file_journal_is_exclusive() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replica.journal");

    let _store: Store<_> = JournalStore::open(FileJournal::open(&path).unwrap()).unwrap();
    assert!(matches!(
        FileJournal::open(&path),
        Err(StorageError::Locked(_))
    ));
}

/// Appends one batch per round and returns the journal with each record's end offset.
fn journal_with(rounds: u64) -> (MemoryJournal, Vec<usize>) {
    let journal = MemoryJournal::new();
    let mut ends = vec![0usize];
    let store: Store<_> = JournalStore::open(journal.clone()).unwrap();
    for round in 1..=rounds {
        store.apply_batch(&batch(round, round, vec![round as u8; 8])).unwrap();
        ends.push(journal.bytes().len());
    }
    (journal, ends)
}

#[test]
fn mid_journal_corruption_is_an_error() {
    let (journal, ends) = journal_with(5);
    let mut bytes = journal.bytes();
    bytes[ends[1] + HEADER_SIZE] ^= 0x01;

    let damaged = MemoryJournal::from_bytes(bytes.clone());
    let result: Result<Store<_>, _> = JournalStore::open(damaged.clone());
    assert!(matches!(result, Err(StorageError::Corrupted(_))));
    assert_eq!(damaged.bytes(), bytes);
}

#[test]
fn mid_journal_bad_magic_is_an_error() {
    let (journal, ends) = journal_with(3);
    let mut bytes = journal.bytes();
    bytes[ends[1]] = b'X';

    let damaged = MemoryJournal::from_bytes(bytes.clone());
    let result: Result<Store<_>, _> = JournalStore::open(damaged.clone());
    assert!(matches!(result, Err(StorageError::Corrupted(_))));
    assert_eq!(damaged.bytes(), bytes);
}

#[test]
fn mid_journal_length_damage_is_an_error() {
    let (journal, ends) = journal_with(3);
    let mut bytes = journal.bytes();
    bytes[ends[1] + 7] = 0x7f;

    let damaged = MemoryJournal::from_bytes(bytes.clone());
    let result: Result<Store<_>, _> = JournalStore::open(damaged.clone());
    assert!(matches!(result, Err(StorageError::Corrupted(_))));
    assert_eq!(damaged.bytes(), bytes);
}

#[test]
fn damaged_last_record_is_dropped() {
    let (journal, ends) = journal_with(3);
    let mut bytes = journal.bytes();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    let damaged = MemoryJournal::from_bytes(bytes);
    let store: Store<_> = JournalStore::open(damaged.clone()).unwrap();
    assert_eq!(store.last_round().unwrap(), Round::new(2));
    assert_eq!(damaged.bytes().len(), ends[2]);
}

#[test]
fn corrupt_file_journal_is_left_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replica.journal");

    {
        let store: Store<_> = JournalStore::open(FileJournal::open(&path).unwrap()).unwrap();
        for round in 1..=3 {
            store.apply_batch(&batch(round, round, vec![7; 4])).unwrap();
        }
    }

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[HEADER_SIZE] ^= 0x80;
    std::fs::write(&path, &bytes).unwrap();

    let result: Result<Store<_>, _> = JournalStore::open(FileJournal::open(&path).unwrap());
    assert!(matches!(result, Err(StorageError::Corrupted(_))));
    assert_eq!(std::fs::read(&path).unwrap(), bytes);
}

proptest! {
    #[test]
    fn any_truncation_recovers_a_prefix(
        states in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 1..8),
        cut in any::<prop::sample::Index>(),
    ) {
        let journal = MemoryJournal::new();
        let mut sizes = vec![0usize];
        {
            let store: Store<_> = JournalStore::open(journal.clone()).unwrap();
            for (i, state) in states.iter().enumerate() {
                store.apply_batch(&batch(i as u64 + 1, i as u64, state.clone())).unwrap();
                sizes.push(journal.bytes().len());
            }
        }

        let full = journal.bytes();
        let len = cut.index(full.len() + 1);
        let damaged = MemoryJournal::from_bytes(full[..len].to_vec());
        let store: Store<_> = JournalStore::open(damaged.clone()).unwrap();

        // Only records that fit entirely in the prefix survive
        let survivors = sizes.iter().filter(|&&end| end <= len).count() - 1;
        prop_assert_eq!(store.last_round().unwrap(), Round::new(survivors as u64));
        prop_assert_eq!(store.len(), survivors);
        prop_assert_eq!(damaged.bytes().len(), sizes[survivors]);
    }

    #[test]
    fn payload_damage_before_the_last_record_never_opens(
        rounds in 2u64..6,
        target in any::<prop::sample::Index>(),
        offset in 0usize..8,
        bit in 0u8..8,
    ) {
        let (journal, ends) = journal_with(rounds);
        let record = target.index(ends.len() - 2);
        let mut bytes = journal.bytes();
        bytes[ends[record] + HEADER_SIZE + offset] ^= 1 << bit;

        let damaged = MemoryJournal::from_bytes(bytes.clone());
        let result: Result<Store<_>, _> = JournalStore::open(damaged.clone());
        prop_assert!(matches!(result, Err(StorageError::Corrupted(_))));
        prop_assert_eq!(damaged.bytes(), bytes);
    }
}
