//! # Celestorm Core
//!
//! Data model and validation rules for the Celestorm execution layer.
//!
//! This crate provides:
//! - Rounds, revisions and versioned entities
//! - Instructions and packages
//! - The object store contract and an in-memory store
//! - The package validator and application preconditions
//!
//! ## Key Invariants
//!
//! - An entry's revision is the round that last modified it
//! - A package is applied entirely or not at all
//! - Validation never writes to the store
//! - Instructions referencing a revision at or past their own round are a
//!   critical violation, never a plain rejection

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod instruction;
mod package;
mod precondition;
mod store;
mod types;
mod validator;

pub use entity::Entity;
pub use error::{CriticalReason, MalformedReason, RejectReason, StoreError, StoreResult};
pub use instruction::{Instruction, InstructionKind};
pub use package::{Malformed, Package};
pub use precondition::{FnPrecondition, Precondition};
pub use store::{Batch, MemoryStore, Mutation, ObjectStore, StoreSnapshot};
pub use types::{ObjectId, Payload, Revision, Round};
pub use validator::{plan_batch, CheckedInstruction, Snapshot, Validator, Verdict};
