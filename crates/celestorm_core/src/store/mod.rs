//! Object store contract and the in-memory reference store.

mod memory;
mod traits;

pub use memory::MemoryStore;
pub use traits::{Batch, Mutation, ObjectStore, StoreSnapshot};
