//! Package framing.
//!
//! ## Frame Layout
//!
//! ```text
//! +--------+-----------+------------------------------+------------+-----------+
//! | header | count     | instructions                 | digest     | signature |
//! | 1 byte | u16 LE    | count x (varint len ++ body) | 32 bytes   | optional  |
//! +--------+-----------+------------------------------+------------+-----------+
//! ```
//!
//! - `header` is the frame version, with the high bit set when signed
//! - `digest` is SHA-256 over every byte before it
//! - the signature, if present, signs the digest
//!
//! The round is not part of the frame; the transport supplies it.

use crate::error::{CodecError, CodecResult};
use crate::instruction::InstructionCodec;
use crate::varint::{get_varint, put_varint};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use celestorm_core::{ObjectId, Package, Payload, Round};
use sha2::{Digest as _, Sha256};

/// Current frame version.
pub const VERSION: u8 = 1;

/// Header bit marking a signed frame.
pub const SIGNED_FLAG: u8 = 0x80;

/// Maximum number of instructions per package.
pub const MAX_INSTRUCTIONS: usize = u16::MAX as usize;

/// Length of the sealed digest.
pub const DIGEST_LEN: usize = 32;

/// SHA-256 digest sealing a frame.
pub type Digest = [u8; DIGEST_LEN];

/// Converts packages to and from their transport form.
pub trait PackageCodec<O: ObjectId, P: Payload>: Send + Sync {
    /// Encodes a package, including its signature if present.
    ///
    /// # Errors
    ///
    /// Returns an error if an instruction cannot be encoded or the package
    /// holds too many instructions.
    fn encode(&self, package: &Package<O, P>) -> CodecResult<Bytes>;

    /// Decodes a frame delivered for `round`.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is truncated, tampered with or holds an
    /// undecodable instruction.
    fn decode(&self, round: Round, bytes: &[u8]) -> CodecResult<Package<O, P>>;

    /// Digest the frame of `package` carries when encoded with or without a
    /// signature.
    ///
    /// # Errors
    ///
    /// Same as [`PackageCodec::encode`].
    fn digest(&self, package: &Package<O, P>, signed: bool) -> CodecResult<Digest>;
}

/// The length-prefixed, SHA-256 sealed frame over an [`InstructionCodec`].
///
/// # Example
///
/// ```rust
/// use celestorm_codec::{CborInstructionCodec, FramedCodec, PackageCodec};
/// use celestorm_core::{Instruction, Package, Round};
///
/// let codec = FramedCodec::new(CborInstructionCodec::<u32, String>::new());
/// let package = Package::new(Round::new(12), vec![Instruction::create(1, "a".to_string())]);
/// let bytes = codec.encode(&package).unwrap();
/// assert_eq!(codec.decode(Round::new(12), &bytes).unwrap(), package);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FramedCodec<C> {
    instructions: C,
}

impl<C> FramedCodec<C> {
    /// Creates a frame codec using `instructions` for instruction bodies.
    pub fn new(instructions: C) -> Self {
        Self { instructions }
    }

    /// The instruction codec.
    pub fn instructions(&self) -> &C {
        &self.instructions
    }
}

impl<C> FramedCodec<C> {
    fn frame_body<O, P>(&self, package: &Package<O, P>, signed: bool) -> CodecResult<BytesMut>
    where
        O: ObjectId,
        P: Payload,
        C: InstructionCodec<O, P>,
    {
        let count = package.instructions.len();
        if count > MAX_INSTRUCTIONS {
            return Err(CodecError::TooManyInstructions(count));
        }

        let mut buf = BytesMut::with_capacity(3 + count * 16 + DIGEST_LEN);
        buf.put_u8(if signed { VERSION | SIGNED_FLAG } else { VERSION });
        buf.put_u16_le(count as u16);
        for instruction in &package.instructions {
            let body = self.instructions.encode(instruction)?;
            put_varint(&mut buf, body.len() as u64);
            buf.put_slice(&body);
        }
        Ok(buf)
    }
}

impl<O, P, C> PackageCodec<O, P> for FramedCodec<C>
where
    O: ObjectId,
    P: Payload,
    C: InstructionCodec<O, P>,
{
    fn encode(&self, package: &Package<O, P>) -> CodecResult<Bytes> {
        let mut buf = self.frame_body(package, package.signature.is_some())?;
        let digest: Digest = Sha256::digest(&buf).into();
        buf.put_slice(&digest);
        if let Some(signature) = &package.signature {
            buf.put_slice(signature);
        }
        Ok(buf.freeze())
    }

    fn decode(&self, round: Round, bytes: &[u8]) -> CodecResult<Package<O, P>> {
        let mut buf = bytes;
        if buf.remaining() < 3 {
            return Err(CodecError::UnexpectedEof);
        }

        let header = buf.get_u8();
        let version = header & !SIGNED_FLAG;
        if version != VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let signed = header & SIGNED_FLAG != 0;

        let count = usize::from(buf.get_u16_le());
        let mut instructions = Vec::with_capacity(count);
        for index in 0..count {
            let len = get_varint(&mut buf)?;
            let len = usize::try_from(len).map_err(|_| CodecError::VarintOverflow)?;
            if buf.remaining() < len {
                return Err(CodecError::UnexpectedEof);
            }
            let instruction = self
                .instructions
                .decode(&buf[..len])
                .map_err(|e| CodecError::invalid_instruction(index, e.to_string()))?;
            instructions.push(instruction);
            buf.advance(len);
        }

        let sealed_len = bytes.len() - buf.remaining();
        if buf.remaining() < DIGEST_LEN {
            return Err(CodecError::UnexpectedEof);
        }
        let expected: Digest = Sha256::digest(&bytes[..sealed_len]).into();
        if buf[..DIGEST_LEN] != expected {
            return Err(CodecError::DigestMismatch);
        }
        buf.advance(DIGEST_LEN);

        let signature = match (signed, buf.remaining()) {
            (true, 0) => return Err(CodecError::MissingSignature),
            (true, _) => Some(buf.to_vec()),
            (false, 0) => None,
            (false, trailing) => return Err(CodecError::TrailingBytes(trailing)),
        };

        Ok(Package {
            round,
            instructions,
            signature,
        })
    }

    fn digest(&self, package: &Package<O, P>, signed: bool) -> CodecResult<Digest> {
        let buf = self.frame_body(package, signed)?;
        Ok(Sha256::digest(&buf).into())
    }
}
