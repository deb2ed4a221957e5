//! Package signatures.
//!
//! Signatures cover the frame digest, so a verifier only needs a codec to
//! recompute it and a key to check it against.

use crate::error::CodecResult;
use crate::package::{Digest, PackageCodec};
use celestorm_core::{ObjectId, Package, Payload};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use std::fmt;
use std::sync::Arc;

/// Produces signatures over package digests.
pub trait PackageSigner: Send + Sync {
    /// Signs a frame digest.
    fn sign(&self, digest: &Digest) -> Vec<u8>;
}

/// Checks signatures over package digests.
pub trait SignatureVerifier: Send + Sync {
    /// Returns true if `signature` is valid for `digest`.
    fn verify(&self, digest: &Digest, signature: &[u8]) -> bool;
}

/// Authenticates a decoded package.
///
/// This is what the sync engine consults before validation.
pub trait PackageVerifier<O: ObjectId, P: Payload>: Send + Sync {
    /// Returns true if `signature` authenticates `package`.
    fn verify(&self, package: &Package<O, P>, signature: &[u8]) -> bool;
}

/// Verifies packages by recomputing their signed digest.
pub struct DigestVerifier<O, P> {
    codec: Arc<dyn PackageCodec<O, P>>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl<O: ObjectId, P: Payload> DigestVerifier<O, P> {
    /// Binds a codec to a signature verifier.
    pub fn new(codec: Arc<dyn PackageCodec<O, P>>, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { codec, verifier }
    }
}

impl<O: ObjectId, P: Payload> PackageVerifier<O, P> for DigestVerifier<O, P> {
    fn verify(&self, package: &Package<O, P>, signature: &[u8]) -> bool {
        match self.codec.digest(package, true) {
            Ok(digest) => self.verifier.verify(&digest, signature),
            Err(_) => false,
        }
    }
}

/// Returns `package` signed by `signer`.
///
/// # Errors
///
/// Returns an error if the package cannot be framed.
pub fn sign_package<O: ObjectId, P: Payload>(
    codec: &dyn PackageCodec<O, P>,
    signer: &dyn PackageSigner,
    package: Package<O, P>,
) -> CodecResult<Package<O, P>> {
    let digest = codec.digest(&package, true)?;
    let signature = signer.sign(&digest);
    Ok(package.with_signature(signature))
}

/// Ed25519 package signer.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Wraps an existing signing key.
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Generates a random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self::new(SigningKey::generate(&mut csprng))
    }

    /// Creates a signer from a raw 32-byte secret.
    pub fn from_bytes(secret: [u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(&secret))
    }

    /// Public key matching this signer.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

impl PackageSigner for Ed25519Signer {
    fn sign(&self, digest: &Digest) -> Vec<u8> {
        self.key.sign(digest).to_bytes().to_vec()
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Signer(<redacted>)")
    }
}

/// Ed25519 verifier accepting signatures from any trusted key.
#[derive(Debug, Clone, Default)]
pub struct Ed25519Verifier {
    trusted: Vec<VerifyingKey>,
}

impl Ed25519Verifier {
    /// Creates a verifier trusting `keys`.
    pub fn new(keys: impl IntoIterator<Item = VerifyingKey>) -> Self {
        Self {
            trusted: keys.into_iter().collect(),
        }
    }

    /// Adds a trusted key.
    pub fn trust(&mut self, key: VerifyingKey) {
        self.trusted.push(key);
    }

    /// Number of trusted keys.
    pub fn len(&self) -> usize {
        self.trusted.len()
    }

    /// Returns true if no key is trusted.
    pub fn is_empty(&self) -> bool {
        self.trusted.is_empty()
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, digest: &Digest, signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        self.trusted
            .iter()
            .any(|key| key.verify(digest, &signature).is_ok())
    }
}
