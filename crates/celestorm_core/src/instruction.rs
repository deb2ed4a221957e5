//! Instructions: single create, update or delete directives.

use crate::error::MalformedReason;
use crate::types::{ObjectId, Payload, Revision, Round};
use serde::{Deserialize, Serialize};

/// Kind of state change an instruction performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum InstructionKind {
    /// Create a new object.
    Create = 1,
    /// Replace the state of an existing object.
    Update = 2,
    /// Remove an existing object.
    Delete = 3,
}

impl InstructionKind {
    /// Converts a byte to an instruction kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Create),
            2 => Some(Self::Update),
            3 => Some(Self::Delete),
            _ => None,
        }
    }

    /// Converts the kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A directive to create, update or delete one object.
///
/// `revision` is the revision the producer believes the object is at.
/// Revision 0 means "no prior version expected" and is valid only for
/// [`InstructionKind::Create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction<O, P> {
    /// Target object.
    pub oid: O,
    /// Expected current revision of the target.
    pub revision: Revision,
    /// Kind of change.
    pub kind: InstructionKind,
    /// New object state for `Create` and `Update`.
    pub payload: Option<P>,
}

impl<O: ObjectId, P: Payload> Instruction<O, P> {
    /// Creates a `Create` instruction.
    pub fn create(oid: O, payload: P) -> Self {
        Self {
            oid,
            revision: Round::ZERO,
            kind: InstructionKind::Create,
            payload: Some(payload),
        }
    }

    /// Creates an `Update` instruction against `revision`.
    pub fn update(oid: O, revision: Revision, payload: P) -> Self {
        Self {
            oid,
            revision,
            kind: InstructionKind::Update,
            payload: Some(payload),
        }
    }

    /// Creates a `Delete` instruction against `revision`.
    pub fn delete(oid: O, revision: Revision) -> Self {
        Self {
            oid,
            revision,
            kind: InstructionKind::Delete,
            payload: None,
        }
    }

    /// Checks the structural rules that do not depend on store state.
    ///
    /// # Errors
    ///
    /// Returns the first rule the instruction breaks.
    pub fn check_structure(&self) -> Result<(), MalformedReason> {
        match self.kind {
            InstructionKind::Create => {
                if !self.revision.is_zero() {
                    return Err(MalformedReason::CreateWithRevision(self.revision));
                }
                if self.payload.is_none() {
                    return Err(MalformedReason::MissingPayload);
                }
            }
            InstructionKind::Update => {
                if self.revision.is_zero() {
                    return Err(MalformedReason::MissingRevision);
                }
                if self.payload.is_none() {
                    return Err(MalformedReason::MissingPayload);
                }
            }
            InstructionKind::Delete => {
                if self.revision.is_zero() {
                    return Err(MalformedReason::MissingRevision);
                }
                if self.payload.is_some() {
                    return Err(MalformedReason::UnexpectedPayload);
                }
            }
        }
        Ok(())
    }
}
