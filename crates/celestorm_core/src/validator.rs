//! Package validation against a read-only snapshot of the store.
//!
//! Instructions are evaluated strictly in package order. The first failing
//! instruction decides the verdict; nothing after it is evaluated.

use crate::entity::Entity;
use crate::error::{CriticalReason, RejectReason, StoreResult};
use crate::instruction::{Instruction, InstructionKind};
use crate::package::Package;
use crate::precondition::Precondition;
use crate::store::{Batch, Mutation, ObjectStore};
use crate::types::{ObjectId, Payload, Revision, Round};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// An instruction that passed every precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedInstruction<O, P> {
    /// Position in the package.
    pub index: usize,
    /// The instruction itself.
    pub instruction: Instruction<O, P>,
    /// Revision observed before the instruction, `None` for a create.
    pub prior: Option<Revision>,
}

impl<O: ObjectId, P: Payload> CheckedInstruction<O, P> {
    /// The store mutation this instruction performs in `round`.
    pub fn mutation(&self, round: Round) -> Mutation<O, P> {
        let oid = self.instruction.oid.clone();
        match (&self.instruction.kind, &self.instruction.payload) {
            (InstructionKind::Delete, _) | (_, None) => Mutation::Remove(oid),
            (_, Some(state)) => Mutation::Put(Entity::new(oid, round, state.clone())),
        }
    }
}

/// Result of validating one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<O: ObjectId, P: Payload> {
    /// Every instruction passed; apply them in this order.
    Applicable(Vec<CheckedInstruction<O, P>>),
    /// The package is refused; state is untouched and processing continues.
    Rejected {
        /// Why the package was refused.
        reason: RejectReason<O>,
        /// Failing instruction, `None` for package-level defects.
        index: Option<usize>,
    },
    /// The replica diverged from the canonical order; processing must halt.
    CriticalViolation {
        /// What diverged.
        reason: CriticalReason<O>,
        /// Failing instruction.
        index: usize,
    },
}

/// Builds the batch for a set of checked instructions.
pub fn plan_batch<O: ObjectId, P: Payload>(
    round: Round,
    checked: &[CheckedInstruction<O, P>],
) -> Batch<O, P> {
    Batch {
        round,
        mutations: checked.iter().map(|c| c.mutation(round)).collect(),
    }
}

/// Revisions and states touched by one package, layered over the store.
///
/// Each OID is read from the store at most once. Accepted instructions
/// stage their projected post-state, so later instructions of the same
/// package observe earlier ones without the store ever being written.
pub struct Snapshot<'a, O: ObjectId, P: Payload> {
    store: &'a dyn ObjectStore<O, P>,
    overlay: HashMap<O, Option<Entity<O, P>>>,
}

impl<'a, O: ObjectId, P: Payload> Snapshot<'a, O, P> {
    /// Creates an empty snapshot over `store`.
    pub fn new(store: &'a dyn ObjectStore<O, P>) -> Self {
        Self {
            store,
            overlay: HashMap::new(),
        }
    }

    /// Current entry for `oid`, including effects staged by this package.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn get(&mut self, oid: &O) -> StoreResult<Option<&Entity<O, P>>> {
        if !self.overlay.contains_key(oid) {
            let entity = self.store.lookup(oid)?;
            self.overlay.insert(oid.clone(), entity);
        }
        Ok(self.overlay.get(oid).and_then(Option::as_ref))
    }

    /// Records the projected state of `oid` after an accepted instruction.
    pub fn stage(&mut self, oid: O, entity: Option<Entity<O, P>>) {
        self.overlay.insert(oid, entity);
    }
}

/// Classifies packages as applicable, rejected or critically violating.
pub struct Validator<O: ObjectId, P: Payload> {
    preconditions: Vec<Arc<dyn Precondition<O, P>>>,
}

impl<O: ObjectId, P: Payload> Validator<O, P> {
    /// Creates a validator with only the built-in revision rules.
    pub fn new() -> Self {
        Self {
            preconditions: Vec::new(),
        }
    }

    /// Registers an application precondition; they run in registration order.
    pub fn add_precondition(&mut self, precondition: Arc<dyn Precondition<O, P>>) {
        self.preconditions.push(precondition);
    }

    /// Validates `package` against `store` without mutating it.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store cannot be read.
    pub fn validate(
        &self,
        package: &Package<O, P>,
        store: &dyn ObjectStore<O, P>,
    ) -> StoreResult<Verdict<O, P>> {
        if let Err(malformed) = package.check_structure() {
            return Ok(Verdict::Rejected {
                reason: RejectReason::MalformedPackage(malformed.reason),
                index: malformed.index,
            });
        }

        let round = package.round;
        let mut snapshot = Snapshot::new(store);
        let mut checked = Vec::with_capacity(package.len());

        for (index, instruction) in package.instructions.iter().enumerate() {
            let current = snapshot.get(&instruction.oid)?.cloned();
            let observed = current.as_ref().map(|entity| entity.revision);

            if let Some(reason) = Self::check_revision(round, instruction, observed) {
                debug!(%round, index, "instruction failed revision check");
                return Ok(reason.at(index));
            }

            for precondition in &self.preconditions {
                if let Err(message) = precondition.check(round, instruction, current.as_ref()) {
                    debug!(%round, index, rule = precondition.name(), "precondition failed");
                    return Ok(Verdict::Rejected {
                        reason: RejectReason::PreconditionFailed {
                            oid: instruction.oid.clone(),
                            rule: precondition.name().to_string(),
                            message,
                        },
                        index: Some(index),
                    });
                }
            }

            let projected = instruction
                .payload
                .clone()
                .filter(|_| instruction.kind != InstructionKind::Delete)
                .map(|state| Entity::new(instruction.oid.clone(), round, state));
            snapshot.stage(instruction.oid.clone(), projected);

            checked.push(CheckedInstruction {
                index,
                instruction: instruction.clone(),
                prior: observed,
            });
        }

        Ok(Verdict::Applicable(checked))
    }

    fn check_revision(
        round: Round,
        instruction: &Instruction<O, P>,
        observed: Option<Revision>,
    ) -> Option<Failure<O>> {
        let oid = &instruction.oid;
        let claimed = instruction.revision;

        // A correct producer only references revisions of earlier rounds
        if !claimed.is_zero() && claimed >= round {
            return Some(Failure::Critical(CriticalReason::FutureRevision {
                oid: oid.clone(),
                round,
                claimed,
                observed,
            }));
        }

        match (instruction.kind, observed) {
            (InstructionKind::Create, None) => None,
            (InstructionKind::Create, Some(current)) => {
                Some(Failure::Reject(RejectReason::AlreadyExists {
                    oid: oid.clone(),
                    current,
                }))
            }
            (_, None) => Some(Failure::Reject(RejectReason::NotFound { oid: oid.clone() })),
            (_, Some(current)) if claimed < current => {
                Some(Failure::Reject(RejectReason::Outdated {
                    oid: oid.clone(),
                    expected: claimed,
                    current,
                }))
            }
            (_, Some(current)) if claimed > current => {
                Some(Failure::Critical(CriticalReason::FutureRevision {
                    oid: oid.clone(),
                    round,
                    claimed,
                    observed: Some(current),
                }))
            }
            (_, Some(_)) => None,
        }
    }
}

impl<O: ObjectId, P: Payload> Default for Validator<O, P> {
    fn default() -> Self {
        Self::new()
    }
}

enum Failure<O: ObjectId> {
    Reject(RejectReason<O>),
    Critical(CriticalReason<O>),
}

impl<O: ObjectId> Failure<O> {
    fn at<P: Payload>(self, index: usize) -> Verdict<O, P> {
        match self {
            Failure::Reject(reason) => Verdict::Rejected {
                reason,
                index: Some(index),
            },
            Failure::Critical(reason) => Verdict::CriticalViolation { reason, index },
        }
    }
}
