//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while framing or unframing packages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode an instruction body.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode an instruction body.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// The frame header carries an unknown version.
    #[error("unsupported package version {0}")]
    UnsupportedVersion(u8),

    /// More instructions than the frame can count.
    #[error("too many instructions: {0}, maximum is 65535")]
    TooManyInstructions(usize),

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A length prefix does not fit in 64 bits.
    #[error("varint overflow")]
    VarintOverflow,

    /// The sealed digest does not match the frame contents.
    #[error("package digest mismatch")]
    DigestMismatch,

    /// The header announces a signature but none follows the digest.
    #[error("signed package carries no signature")]
    MissingSignature,

    /// Bytes follow the digest of an unsigned package.
    #[error("{0} trailing bytes after unsigned package")]
    TrailingBytes(usize),

    /// One instruction body could not be decoded.
    #[error("instruction {index} is invalid: {message}")]
    InvalidInstruction {
        /// Position of the instruction in the frame.
        index: usize,
        /// Description of the failure.
        message: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid instruction error.
    pub fn invalid_instruction(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidInstruction {
            index,
            message: message.into(),
        }
    }
}
