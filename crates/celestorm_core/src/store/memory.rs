//! In-memory object store.

use crate::entity::Entity;
use crate::error::{StoreError, StoreResult};
use crate::store::traits::{Batch, Mutation, ObjectStore, StoreSnapshot};
use crate::types::{ObjectId, Payload, Round};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

/// Reference in-memory implementation of [`ObjectStore`].
///
/// Suitable for:
/// - Unit and integration tests
/// - Ephemeral replicas that rebuild state from the package stream
///
/// # Thread Safety
///
/// A whole batch is applied under one write lock, so concurrent readers
/// only ever observe committed state.
///
/// # Example
///
/// ```rust
/// use celestorm_core::{Batch, Entity, MemoryStore, Mutation, ObjectStore, Round};
///
/// let store: MemoryStore<u32, String> = MemoryStore::new();
/// let mut batch = Batch::new(Round::new(5));
/// batch.push(Mutation::Put(Entity::new(1, Round::new(5), "hello".to_string())));
/// store.apply_batch(&batch).unwrap();
///
/// assert_eq!(store.revision_of(&1).unwrap(), Some(Round::new(5)));
/// assert_eq!(store.last_round().unwrap(), Round::new(5));
/// ```
#[derive(Debug)]
pub struct MemoryStore<O, P> {
    state: RwLock<MemoryState<O, P>>,
    injected: Mutex<Option<StoreError>>,
}

#[derive(Debug)]
struct MemoryState<O, P> {
    entries: HashMap<O, Entity<O, P>>,
    last_round: Round,
}

impl<O: ObjectId, P: Payload> MemoryStore<O, P> {
    /// Creates an empty store that has never been synchronised.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                entries: HashMap::new(),
                last_round: Round::ZERO,
            }),
            injected: Mutex::new(None),
        }
    }

    /// Creates a store from a trusted snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: StoreSnapshot<O, P>) -> Self {
        let entries = snapshot
            .entries
            .into_iter()
            .map(|entity| (entity.oid.clone(), entity))
            .collect();
        Self {
            state: RwLock::new(MemoryState {
                entries,
                last_round: snapshot.round,
            }),
            injected: Mutex::new(None),
        }
    }

    /// Copies the committed state.
    pub fn snapshot(&self) -> StoreSnapshot<O, P> {
        let state = self.state.read();
        StoreSnapshot {
            round: state.last_round,
            entries: state.entries.values().cloned().collect(),
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true if no entry is stored.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Makes the next `apply_batch` fail with `error` without touching state.
    ///
    /// Intended for fault-injection tests.
    pub fn inject_apply_failure(&self, error: StoreError) {
        *self.injected.lock() = Some(error);
    }
}

impl<O: ObjectId, P: Payload> Default for MemoryStore<O, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ObjectId, P: Payload> ObjectStore<O, P> for MemoryStore<O, P> {
    fn lookup(&self, oid: &O) -> StoreResult<Option<Entity<O, P>>> {
        Ok(self.state.read().entries.get(oid).cloned())
    }

    fn last_round(&self) -> StoreResult<Round> {
        Ok(self.state.read().last_round)
    }

    fn apply_batch(&self, batch: &Batch<O, P>) -> StoreResult<()> {
        if let Some(error) = self.injected.lock().take() {
            return Err(error);
        }

        let mut state = self.state.write();
        if batch.round <= state.last_round {
            return Err(StoreError::RoundRegression {
                last: state.last_round,
                attempted: batch.round,
            });
        }

        for mutation in &batch.mutations {
            match mutation {
                Mutation::Put(entity) => {
                    state.entries.insert(entity.oid.clone(), entity.clone());
                }
                Mutation::Remove(oid) => {
                    state.entries.remove(oid);
                }
            }
        }
        state.last_round = batch.round;
        Ok(())
    }
}
