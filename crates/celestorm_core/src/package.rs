//! Packages: the unit of atomic application.

use crate::error::MalformedReason;
use crate::instruction::Instruction;
use crate::types::{ObjectId, Payload, Round};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An ordered batch of instructions for one sync round.
///
/// Instruction order is the commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package<O, P> {
    /// Position in the global order.
    pub round: Round,
    /// Instructions in commit order.
    pub instructions: Vec<Instruction<O, P>>,
    /// Optional signature over the package digest.
    pub signature: Option<Vec<u8>>,
}

/// A structural defect found in a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Malformed {
    /// Index of the offending instruction, if the defect is instruction-level.
    pub index: Option<usize>,
    /// What is wrong.
    pub reason: MalformedReason,
}

impl<O: ObjectId, P: Payload> Package<O, P> {
    /// Creates an unsigned package.
    pub fn new(round: Round, instructions: Vec<Instruction<O, P>>) -> Self {
        Self {
            round,
            instructions,
            signature: None,
        }
    }

    /// Attaches a signature.
    #[must_use]
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the package carries no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// OIDs touched by the package, in commit order.
    pub fn oids(&self) -> Vec<O> {
        self.instructions.iter().map(|i| i.oid.clone()).collect()
    }

    /// Checks that the package is well-formed.
    ///
    /// Instructions are checked in order; a repeated OID is reported at the
    /// index of its second occurrence.
    ///
    /// # Errors
    ///
    /// Returns the first structural defect.
    pub fn check_structure(&self) -> Result<(), Malformed> {
        if self.round.is_zero() {
            return Err(Malformed {
                index: None,
                reason: MalformedReason::ZeroRound,
            });
        }

        let mut seen: HashMap<&O, usize> = HashMap::with_capacity(self.instructions.len());
        for (index, instruction) in self.instructions.iter().enumerate() {
            if let Some(first) = seen.insert(&instruction.oid, index) {
                return Err(Malformed {
                    index: Some(index),
                    reason: MalformedReason::DuplicateOid { first },
                });
            }
            instruction.check_structure().map_err(|reason| Malformed {
                index: Some(index),
                reason,
            })?;
        }
        Ok(())
    }
}
