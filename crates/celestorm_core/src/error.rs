//! Error types for Celestorm core.
//!
//! Package-level failures are split in two families:
//! - [`RejectReason`]: the package is refused, state is untouched and
//!   processing continues with the next round.
//! - [`CriticalReason`]: the local replica has diverged from the canonical
//!   order and the engine must halt.

use crate::types::{Revision, Round};
use std::fmt;
use thiserror::Error;

/// Result type for object store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by an object store backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The backend failed to read or apply a batch.
    #[error("store backend error: {message}")]
    Backend {
        /// Error message.
        message: String,
        /// Whether the failed call left the store untouched and may be retried.
        retry_safe: bool,
    },

    /// A batch was submitted for a round not after the store's cursor.
    #[error("round regression: store is at {last}, batch targets {attempted}")]
    RoundRegression {
        /// Last round recorded by the store.
        last: Round,
        /// Round of the refused batch.
        attempted: Round,
    },

    /// Persisted state could not be decoded.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// A batch or entry could not be serialized.
    #[error("store codec error: {0}")]
    Codec(String),
}

impl StoreError {
    /// Creates a backend error that is safe to retry.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            retry_safe: true,
        }
    }

    /// Creates a backend error that must not be retried.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            retry_safe: false,
        }
    }

    /// Returns true if the backend declared the failure retry-safe.
    pub fn is_retry_safe(&self) -> bool {
        matches!(self, StoreError::Backend { retry_safe: true, .. })
    }
}

/// Why a package is structurally malformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedReason {
    /// Packages must carry a positive round.
    #[error("package round must be positive")]
    ZeroRound,

    /// The same OID appears twice in one package.
    #[error("duplicate object id, first seen at instruction {first}")]
    DuplicateOid {
        /// Index of the earlier instruction touching the same OID.
        first: usize,
    },

    /// `Create` must expect no prior version.
    #[error("create instruction carries revision {0}, expected 0")]
    CreateWithRevision(Revision),

    /// Revision 0 is reserved for `Create`.
    #[error("update or delete instruction carries revision 0")]
    MissingRevision,

    /// `Create` and `Update` need a payload.
    #[error("instruction has no payload")]
    MissingPayload,

    /// `Delete` never carries a payload.
    #[error("delete instruction carries a payload")]
    UnexpectedPayload,

    /// The package bytes could not be decoded.
    #[error("undecodable package: {0}")]
    Undecodable(String),
}

/// Non-fatal reasons a package is refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RejectReason<O: fmt::Debug> {
    /// Decoding or structural failure.
    #[error("malformed package: {0}")]
    MalformedPackage(MalformedReason),

    /// Signature missing or invalid.
    #[error("authentication failure: {0}")]
    AuthenticationFailure(String),

    /// The instruction targets a revision older than the current one.
    #[error("outdated instruction for {oid:?}: expected revision {expected}, current {current}")]
    Outdated {
        /// Object identifier.
        oid: O,
        /// Revision the instruction expected.
        expected: Revision,
        /// Revision currently stored.
        current: Revision,
    },

    /// `Update`/`Delete` on an absent object.
    #[error("object {oid:?} not found")]
    NotFound {
        /// Object identifier.
        oid: O,
    },

    /// `Create` on an object that already exists.
    #[error("object {oid:?} already exists at revision {current}")]
    AlreadyExists {
        /// Object identifier.
        oid: O,
        /// Revision currently stored.
        current: Revision,
    },

    /// An application precondition refused the instruction.
    #[error("precondition `{rule}` failed for {oid:?}: {message}")]
    PreconditionFailed {
        /// Object identifier.
        oid: O,
        /// Name of the failing precondition.
        rule: String,
        /// Message reported by the precondition.
        message: String,
    },
}

/// Fatal consistency breaks detected during validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CriticalReason<O: fmt::Debug> {
    /// The instruction references a revision the local replica has never seen.
    #[error(
        "future revision for {oid:?} in {round}: instruction expects {claimed}, observed {observed:?}"
    )]
    FutureRevision {
        /// Object identifier.
        oid: O,
        /// Round of the package carrying the instruction.
        round: Round,
        /// Revision the instruction expected.
        claimed: Revision,
        /// Revision currently stored, if the object exists.
        observed: Option<Revision>,
    },
}
