//! Core type definitions for Celestorm.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Position of a package in the global total order.
///
/// Rounds strictly increase across accepted packages but need not advance
/// in unit steps. `Round::ZERO` means "never synchronised".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Round(pub u64);

impl Round {
    /// The round before any package has been applied.
    pub const ZERO: Round = Round(0);

    /// Creates a new round number.
    #[must_use]
    pub const fn new(round: u64) -> Self {
        Self(round)
    }

    /// Returns the raw round value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true for the "never synchronised" round.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns the immediately following round.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round:{}", self.0)
    }
}

impl From<u64> for Round {
    fn from(round: u64) -> Self {
        Self(round)
    }
}

/// Revision of an object: the round of its last successful modification.
///
/// Revision 0 is reserved for "no prior version expected".
pub type Revision = Round;

/// Identifier of a distributed object.
///
/// Implemented for every type that is cheap to compare and hash, so
/// applications can plug in integers, tuples, strings or their own keys.
pub trait ObjectId: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> ObjectId for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// Application-defined object state carried by instructions.
pub trait Payload: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> Payload for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_ordering() {
        assert!(Round::new(5) < Round::new(6));
        assert!(Round::ZERO.is_zero());
        assert!(!Round::new(1).is_zero());
    }

    #[test]
    fn round_next_saturates() {
        assert_eq!(Round::new(5).next(), Round::new(6));
        assert_eq!(Round::new(u64::MAX).next(), Round::new(u64::MAX));
    }

    #[test]
    fn round_display() {
        assert_eq!(format!("{}", Round::new(42)), "round:42");
    }
}
