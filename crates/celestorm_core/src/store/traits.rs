//! The object store contract required by the sync engine.

use crate::entity::Entity;
use crate::error::StoreResult;
use crate::types::{ObjectId, Payload, Revision, Round};
use serde::{Deserialize, Serialize};

/// One state change inside a [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation<O, P> {
    /// Insert or overwrite an entry.
    Put(Entity<O, P>),
    /// Remove an entry.
    Remove(O),
}

impl<O: ObjectId, P: Payload> Mutation<O, P> {
    /// The object this mutation touches.
    pub fn oid(&self) -> &O {
        match self {
            Mutation::Put(entity) => &entity.oid,
            Mutation::Remove(oid) => oid,
        }
    }
}

/// An ordered set of mutations applied all-or-nothing for one round.
///
/// Applying a batch also advances the store's round cursor to `round`,
/// so the cursor is always persisted together with the state it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch<O, P> {
    /// Round that produced the batch.
    pub round: Round,
    /// Mutations in commit order.
    pub mutations: Vec<Mutation<O, P>>,
}

impl<O: ObjectId, P: Payload> Batch<O, P> {
    /// Creates a batch with no mutations.
    pub fn new(round: Round) -> Self {
        Self {
            round,
            mutations: Vec::new(),
        }
    }

    /// Appends a mutation.
    pub fn push(&mut self, mutation: Mutation<O, P>) {
        self.mutations.push(mutation);
    }

    /// Returns true if the batch only advances the cursor.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// A full copy of a store's committed state.
///
/// Used by operators to resynchronise a halted replica from a trusted source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot<O, P> {
    /// Last round reflected in the snapshot.
    pub round: Round,
    /// Every entry, in unspecified order.
    pub entries: Vec<Entity<O, P>>,
}

/// Transactional object store backing one sync engine.
///
/// # Invariants
///
/// - `lookup` reflects the latest successfully applied batch
/// - `apply_batch` is atomic: on `Err` the store is exactly as before the
///   call, on `Ok` every mutation becomes visible at once
/// - readers never observe a partially applied batch
/// - the round cursor only moves forward
pub trait ObjectStore<O: ObjectId, P: Payload>: Send + Sync {
    /// Point read of one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn lookup(&self, oid: &O) -> StoreResult<Option<Entity<O, P>>>;

    /// Current revision of an entry, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn revision_of(&self, oid: &O) -> StoreResult<Option<Revision>> {
        Ok(self.lookup(oid)?.map(|entity| entity.revision))
    }

    /// Last round recorded by the store, or [`Round::ZERO`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn last_round(&self) -> StoreResult<Round>;

    /// Applies a batch atomically and advances the cursor to `batch.round`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::RoundRegression`] if `batch.round` is not
    /// after the cursor, or a backend error. In both cases nothing changes.
    fn apply_batch(&self, batch: &Batch<O, P>) -> StoreResult<()>;

    /// Advances the cursor without touching any object.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectStore::apply_batch`].
    fn mark_round(&self, round: Round) -> StoreResult<()> {
        self.apply_batch(&Batch::new(round))
    }
}
