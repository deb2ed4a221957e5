//! Instruction body encoding.

use crate::error::{CodecError, CodecResult};
use celestorm_core::{Instruction, ObjectId, Payload};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Serializes single instructions into opaque bodies.
///
/// The package frame only length-prefixes bodies, so any self-contained
/// encoding works as long as every replica uses the same one.
pub trait InstructionCodec<O: ObjectId, P: Payload>: Send + Sync {
    /// Encodes one instruction.
    ///
    /// # Errors
    ///
    /// Returns an error if the instruction cannot be serialized.
    fn encode(&self, instruction: &Instruction<O, P>) -> CodecResult<Vec<u8>>;

    /// Decodes one instruction body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a valid instruction.
    fn decode(&self, bytes: &[u8]) -> CodecResult<Instruction<O, P>>;
}

/// CBOR instruction bodies via serde.
///
/// # Example
///
/// ```rust
/// use celestorm_codec::{CborInstructionCodec, InstructionCodec};
/// use celestorm_core::{Instruction, Round};
///
/// let codec = CborInstructionCodec::<u64, String>::new();
/// let inst = Instruction::update(7, Round::new(3), "state".to_string());
/// let bytes = codec.encode(&inst).unwrap();
/// assert_eq!(codec.decode(&bytes).unwrap(), inst);
/// ```
pub struct CborInstructionCodec<O, P> {
    _marker: PhantomData<fn() -> (O, P)>,
}

impl<O, P> CborInstructionCodec<O, P> {
    /// Creates the codec.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<O, P> Default for CborInstructionCodec<O, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O, P> Clone for CborInstructionCodec<O, P> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<O, P> std::fmt::Debug for CborInstructionCodec<O, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CborInstructionCodec")
    }
}

impl<O, P> InstructionCodec<O, P> for CborInstructionCodec<O, P>
where
    O: ObjectId + Serialize + DeserializeOwned,
    P: Payload + Serialize + DeserializeOwned,
{
    fn encode(&self, instruction: &Instruction<O, P>) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(instruction, &mut buf)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Instruction<O, P>> {
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use celestorm_core::{InstructionKind, Round};

    #[test]
    fn delete_has_no_payload_after_decode() {
        let codec = CborInstructionCodec::<u32, Vec<u8>>::new();
        let bytes = codec.encode(&Instruction::delete(9, Round::new(4))).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.kind, InstructionKind::Delete);
        assert_eq!(decoded.payload, None);
        assert_eq!(decoded.revision, Round::new(4));
    }

    #[test]
    fn garbage_is_rejected() {
        let codec = CborInstructionCodec::<u32, Vec<u8>>::new();
        assert!(matches!(
            codec.decode(&[0xff, 0x00, 0x13]),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn wrong_payload_type_is_rejected() {
        let bytes = CborInstructionCodec::<u32, String>::new()
            .encode(&Instruction::create(1, "text".to_string()))
            .unwrap();
        assert!(CborInstructionCodec::<u32, u64>::new().decode(&bytes).is_err());
    }
}
