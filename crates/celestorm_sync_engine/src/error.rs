//! Error types for the sync engine.

use celestorm_codec::CodecError;
use celestorm_core::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Failures reported by a package transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport lost its source irrecoverably.
    #[error("transport disconnected: {0}")]
    Disconnected(String),
}

/// Errors that can occur during sync operations.
///
/// Rejected packages are not errors; they are reported as
/// [`crate::RoundOutcome::Rejected`].
#[derive(Error, Debug)]
pub enum SyncError {
    /// The engine halted earlier and consumes no further packages.
    #[error("engine halted: {0}")]
    Halted(String),

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The store could not be read while starting the engine.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A package could not be encoded for broadcast.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// An encoded package arrived but no codec is configured.
    #[error("no package codec configured")]
    NoCodec,

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Every subscriber of a broadcaster has gone away.
    #[error("broadcast channel closed")]
    ChannelClosed,
}

impl SyncError {
    /// Returns true if the engine can keep consuming after this error.
    pub fn is_resumable(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resumable_errors() {
        assert!(SyncError::from(TransportError::Disconnected("reset".into())).is_resumable());
        assert!(SyncError::Cancelled.is_resumable());
        assert!(!SyncError::Halted("critical".into()).is_resumable());
        assert!(!SyncError::NoCodec.is_resumable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::from(TransportError::Disconnected("peer reset".into()));
        assert_eq!(err.to_string(), "transport disconnected: peer reset");
        assert_eq!(SyncError::Cancelled.to_string(), "sync cancelled");
    }
}
