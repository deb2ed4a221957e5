//! # Celestorm Codec
//!
//! Transport encoding for Celestorm packages.
//!
//! This crate provides:
//! - The sealed package frame ([`FramedCodec`])
//! - CBOR instruction bodies ([`CborInstructionCodec`])
//! - Ed25519 package signatures
//!
//! ## Usage
//!
//! ```
//! use celestorm_codec::{
//!     sign_package, CborInstructionCodec, DigestVerifier, Ed25519Signer, Ed25519Verifier,
//!     FramedCodec, PackageCodec, PackageVerifier,
//! };
//! use celestorm_core::{Instruction, Package, Round};
//! use std::sync::Arc;
//!
//! let codec: Arc<dyn PackageCodec<u32, String>> =
//!     Arc::new(FramedCodec::new(CborInstructionCodec::new()));
//! let signer = Ed25519Signer::generate();
//! let verifier = DigestVerifier::new(
//!     codec.clone(),
//!     Arc::new(Ed25519Verifier::new([signer.verifying_key()])),
//! );
//!
//! let package = Package::new(Round::new(1), vec![Instruction::create(1, "a".to_string())]);
//! let signed = sign_package(codec.as_ref(), &signer, package).unwrap();
//! let bytes = codec.encode(&signed).unwrap();
//!
//! let received = codec.decode(Round::new(1), &bytes).unwrap();
//! let signature = received.signature.clone().unwrap();
//! assert!(verifier.verify(&received, &signature));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod instruction;
mod package;
mod signer;
mod varint;

pub use error::{CodecError, CodecResult};
pub use instruction::{CborInstructionCodec, InstructionCodec};
pub use package::{Digest, FramedCodec, PackageCodec, DIGEST_LEN, MAX_INSTRUCTIONS, SIGNED_FLAG, VERSION};
pub use signer::{
    sign_package, DigestVerifier, Ed25519Signer, Ed25519Verifier, PackageSigner, PackageVerifier,
    SignatureVerifier,
};
pub use varint::{get_varint, put_varint, MAX_VARINT_LEN};
