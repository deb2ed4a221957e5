//! Versioned objects held by an object store.

use crate::types::{ObjectId, Payload, Revision};
use serde::{Deserialize, Serialize};

/// An object store entry: application state plus its current revision.
///
/// Entries are created by a successful `Create`, rewritten by every
/// successful `Update` and removed by a successful `Delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity<O, P> {
    /// Object identifier.
    pub oid: O,
    /// Round of the last successful modification.
    pub revision: Revision,
    /// Application-defined state.
    pub state: P,
}

impl<O: ObjectId, P: Payload> Entity<O, P> {
    /// Creates a new entry.
    pub fn new(oid: O, revision: Revision, state: P) -> Self {
        Self {
            oid,
            revision,
            state,
        }
    }
}
