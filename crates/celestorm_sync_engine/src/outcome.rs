//! Per-package results reported to the application.

use celestorm_core::{CriticalReason, MalformedReason, RejectReason, Round};
use std::fmt;
use thiserror::Error;

/// Why an engine stopped consuming packages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HaltReason<O: fmt::Debug> {
    /// The replica diverged from the canonical order.
    #[error("critical violation in {round} at instruction {index}: {reason}")]
    Critical {
        /// Round of the offending package.
        round: Round,
        /// Failing instruction.
        index: usize,
        /// What diverged.
        reason: CriticalReason<O>,
    },

    /// The store failed in a way that is not retry-safe.
    #[error("store failure in {round}: {message}")]
    StoreFailure {
        /// Round being applied or validated.
        round: Round,
        /// Backend error message.
        message: String,
    },

    /// A package skipped rounds without a gap signal.
    #[error("round gap: expected {expected}, received {received}")]
    GapViolation {
        /// Round the engine was waiting for.
        expected: Round,
        /// Round actually delivered.
        received: Round,
    },

    /// A malformed package under a fatal-malformed policy.
    #[error("malformed input in {round}: {reason}")]
    MalformedInput {
        /// Round of the offending package.
        round: Round,
        /// What is wrong with it.
        reason: MalformedReason,
    },

    /// The transport disconnected under a halt-on-disconnect policy.
    #[error("transport disconnected: {0}")]
    Disconnected(String),
}

/// Result of processing one delivered package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome<O: fmt::Debug> {
    /// Every instruction was applied in one batch.
    Committed {
        /// Round of the package.
        round: Round,
        /// OIDs touched, in commit order.
        touched: Vec<O>,
    },
    /// The package was refused; the store is unchanged.
    Rejected {
        /// Round of the package.
        round: Round,
        /// Why it was refused.
        reason: RejectReason<O>,
        /// Failing instruction, if the failure is instruction-level.
        index: Option<usize>,
    },
    /// A round at or before the cursor was delivered again and ignored.
    Discarded {
        /// Round of the duplicate.
        round: Round,
    },
    /// The engine halted; no further package is consumed.
    Halted(HaltReason<O>),
}

impl<O: fmt::Debug> RoundOutcome<O> {
    /// Round the outcome refers to, if any.
    pub fn round(&self) -> Option<Round> {
        match self {
            RoundOutcome::Committed { round, .. }
            | RoundOutcome::Rejected { round, .. }
            | RoundOutcome::Discarded { round } => Some(*round),
            RoundOutcome::Halted(HaltReason::Critical { round, .. })
            | RoundOutcome::Halted(HaltReason::StoreFailure { round, .. })
            | RoundOutcome::Halted(HaltReason::MalformedInput { round, .. }) => Some(*round),
            RoundOutcome::Halted(HaltReason::GapViolation { received, .. }) => Some(*received),
            RoundOutcome::Halted(HaltReason::Disconnected(_)) => None,
        }
    }

    /// Returns true for [`RoundOutcome::Committed`].
    pub fn is_committed(&self) -> bool {
        matches!(self, RoundOutcome::Committed { .. })
    }

    /// Returns true for [`RoundOutcome::Rejected`].
    pub fn is_rejected(&self) -> bool {
        matches!(self, RoundOutcome::Rejected { .. })
    }

    /// Returns true for [`RoundOutcome::Halted`].
    pub fn is_halted(&self) -> bool {
        matches!(self, RoundOutcome::Halted(_))
    }
}
