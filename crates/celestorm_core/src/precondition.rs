//! Application-defined preconditions layered on top of revision checks.

use crate::entity::Entity;
use crate::instruction::Instruction;
use crate::types::{ObjectId, Payload, Round};
use std::marker::PhantomData;

/// An extra per-instruction business rule.
///
/// Preconditions run after the built-in existence and revision checks
/// passed. A failure rejects the whole package; it never halts the engine.
pub trait Precondition<O: ObjectId, P: Payload>: Send + Sync {
    /// Name used in rejection diagnostics.
    fn name(&self) -> &str;

    /// Checks one instruction against the entry it targets.
    ///
    /// `current` reflects earlier instructions of the same package.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message if the instruction must be refused.
    fn check(
        &self,
        round: Round,
        instruction: &Instruction<O, P>,
        current: Option<&Entity<O, P>>,
    ) -> Result<(), String>;
}

/// A precondition backed by a closure.
///
/// # Example
///
/// ```rust
/// use celestorm_core::{FnPrecondition, Instruction, Precondition, Round};
///
/// let non_negative = FnPrecondition::<u32, i64, _>::new("non-negative", |_round, inst, _current| {
///     match inst.payload {
///         Some(value) if value < 0 => Err(format!("negative balance {value}")),
///         _ => Ok(()),
///     }
/// });
/// assert!(non_negative.check(Round::new(1), &Instruction::create(1, -5), None).is_err());
/// ```
pub struct FnPrecondition<O, P, F> {
    name: String,
    check: F,
    _marker: PhantomData<fn() -> (O, P)>,
}

impl<O, P, F> FnPrecondition<O, P, F>
where
    O: ObjectId,
    P: Payload,
    F: Fn(Round, &Instruction<O, P>, Option<&Entity<O, P>>) -> Result<(), String> + Send + Sync,
{
    /// Wraps a closure as a named precondition.
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
            _marker: PhantomData,
        }
    }
}

impl<O, P, F> Precondition<O, P> for FnPrecondition<O, P, F>
where
    O: ObjectId,
    P: Payload,
    F: Fn(Round, &Instruction<O, P>, Option<&Entity<O, P>>) -> Result<(), String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(
        &self,
        round: Round,
        instruction: &Instruction<O, P>,
        current: Option<&Entity<O, P>>,
    ) -> Result<(), String> {
        (self.check)(round, instruction, current)
    }
}
