// ============================================
// File: crates/protov2d-core/src/crypto/keys.rs
// ============================================
//! # Hybrid Identity Keys
//!
//! ## Creation Reason
//! ProtoV2d identities are hybrid: every signing operation is backed by
//! both an Ed25519 key and a Dilithium-5 key, so authenticity holds as
//! long as either scheme does. The server's root identity and each
//! client's session identity share this shape.
//!
//! ## Main Functionality
//! - `IdentityKeyPair`: hybrid signing key pair (root or session)
//! - `IdentityPublicKey`: verification half, wire form `classic ∥ pq`
//! - `HybridSignature`: paired signatures with v1/v2 wire encodings
//!
//! ## Wire Forms
//! ```text
//! public  = ed25519Pub(32)  ∥ dilithium5Pub(2592)   = 2624 bytes
//! private = ed25519Seed(32) ∥ dilithium5Secret(4864) = 4896 bytes
//! v2 sig  = sigClassic(64) ∥ sigPq(4595)
//! v1 sig  = sigClassic(64) ∥ 0xF3 0x11 ∥ sigPq(4595)
//! ```
//! The two-byte `F3 11` sentinel in the v1 composite is a fixed legacy
//! constant; it must be present exactly at bytes 64–65.
//!
//! Hex serialization of either half is lowercase, contiguous, with no
//! delimiters.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Private keys are never logged or embedded in errors
//! - `Debug` impls redact all key material
//!
//! ## Last Modified
//! v0.1.0 - Initial hybrid key types

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use pqcrypto_dilithium::dilithium5;
use pqcrypto_traits::sign::{
    DetachedSignature as _, PublicKey as _, SecretKey as _,
};
use rand::rngs::OsRng;
use zeroize::{Zeroize, Zeroizing};

use protov2d_common::bytes::{from_hex, to_hex};

use super::{
    DILITHIUM_PUBLIC_KEY_SIZE, DILITHIUM_SECRET_KEY_SIZE, DILITHIUM_SIGNATURE_SIZE,
    ED25519_PRIVATE_KEY_SIZE, ED25519_PUBLIC_KEY_SIZE, ED25519_SIGNATURE_SIZE,
    HYBRID_PRIVATE_KEY_SIZE, HYBRID_PUBLIC_KEY_SIZE,
};
use crate::error::{CoreError, Result};

/// Fixed two-byte sentinel embedded between the halves of a v1
/// composite signature. Mimics a legacy length field; treated as a
/// constant on the wire.
pub const V1_SIGNATURE_SENTINEL: [u8; 2] = [0xF3, 0x11];

// ============================================
// HybridSignature
// ============================================

/// A paired classical + post-quantum signature over the same message.
#[derive(Clone, PartialEq, Eq)]
pub struct HybridSignature {
    /// Ed25519 signature (64 bytes).
    pub classic: [u8; ED25519_SIGNATURE_SIZE],
    /// Dilithium-5 detached signature (4595 bytes).
    pub pq: Vec<u8>,
}

impl HybridSignature {
    /// Serializes as the v2 wire form `sigClassic ∥ sigPq`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ED25519_SIGNATURE_SIZE + self.pq.len());
        out.extend_from_slice(&self.classic);
        out.extend_from_slice(&self.pq);
        out
    }

    /// Parses the v2 wire form.
    ///
    /// # Errors
    /// Returns `MessageTooShort` if the buffer is not exactly
    /// `64 + 4595` bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let expected = ED25519_SIGNATURE_SIZE + DILITHIUM_SIGNATURE_SIZE;
        if bytes.len() != expected {
            return Err(CoreError::too_short(expected, bytes.len()));
        }
        let mut classic = [0u8; ED25519_SIGNATURE_SIZE];
        classic.copy_from_slice(&bytes[..ED25519_SIGNATURE_SIZE]);
        Ok(Self {
            classic,
            pq: bytes[ED25519_SIGNATURE_SIZE..].to_vec(),
        })
    }

    /// Serializes as the v1 composite `sigClassic ∥ F3 11 ∥ sigPq`.
    #[must_use]
    pub fn to_v1_composite(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ED25519_SIGNATURE_SIZE + 2 + self.pq.len());
        out.extend_from_slice(&self.classic);
        out.extend_from_slice(&V1_SIGNATURE_SENTINEL);
        out.extend_from_slice(&self.pq);
        out
    }

    /// Parses a v1 composite signature, requiring the sentinel at
    /// bytes 64–65.
    ///
    /// # Errors
    /// Returns `MalformedMessage` on a missing sentinel or bad length.
    pub fn from_v1_composite(bytes: &[u8]) -> Result<Self> {
        let expected = ED25519_SIGNATURE_SIZE + 2 + DILITHIUM_SIGNATURE_SIZE;
        if bytes.len() != expected {
            return Err(CoreError::too_short(expected, bytes.len()));
        }
        if bytes[ED25519_SIGNATURE_SIZE..ED25519_SIGNATURE_SIZE + 2] != V1_SIGNATURE_SENTINEL {
            return Err(CoreError::malformed(
                "v1 composite signature sentinel missing",
            ));
        }
        let mut classic = [0u8; ED25519_SIGNATURE_SIZE];
        classic.copy_from_slice(&bytes[..ED25519_SIGNATURE_SIZE]);
        Ok(Self {
            classic,
            pq: bytes[ED25519_SIGNATURE_SIZE + 2..].to_vec(),
        })
    }
}

impl fmt::Debug for HybridSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridSignature")
            .field("classic", &format_args!("[{} bytes]", self.classic.len()))
            .field("pq", &format_args!("[{} bytes]", self.pq.len()))
            .finish()
    }
}

// ============================================
// IdentityKeyPair
// ============================================

/// Hybrid signing key pair.
///
/// Serves two roles: the server's long-lived root identity and a
/// client's session identity (possession of which *is* the session's
/// identity across reconnects).
///
/// # Security
/// - The Ed25519 seed is zeroed when the pair is dropped
/// - Private material never appears in `Debug` output or errors
pub struct IdentityKeyPair {
    classic: SigningKey,
    pq_public: dilithium5::PublicKey,
    pq_secret: dilithium5::SecretKey,
}

impl IdentityKeyPair {
    /// Generates a fresh hybrid key pair from the OS random number
    /// generator.
    #[must_use]
    pub fn generate() -> Self {
        let classic = SigningKey::generate(&mut OsRng);
        let (pq_public, pq_secret) = dilithium5::keypair();
        Self {
            classic,
            pq_public,
            pq_secret,
        }
    }

    /// Reconstructs a key pair from its private and public wire forms.
    ///
    /// Dilithium secret keys do not expose their public half, so both
    /// serializations are required; consistency between them is
    /// verified with a probe signature.
    ///
    /// # Errors
    /// Returns `KeyParse` on bad lengths, undecodable material, or a
    /// private/public mismatch.
    pub fn from_key_bytes(private: &[u8], public: &[u8]) -> Result<Self> {
        if private.len() != HYBRID_PRIVATE_KEY_SIZE {
            return Err(CoreError::key_parse(format!(
                "private key must be {} bytes, got {}",
                HYBRID_PRIVATE_KEY_SIZE,
                private.len()
            )));
        }

        let mut seed = [0u8; ED25519_PRIVATE_KEY_SIZE];
        seed.copy_from_slice(&private[..ED25519_PRIVATE_KEY_SIZE]);
        let classic = SigningKey::from_bytes(&seed);
        seed.zeroize();

        let pq_secret = dilithium5::SecretKey::from_bytes(&private[ED25519_PRIVATE_KEY_SIZE..])
            .map_err(|_| CoreError::key_parse("undecodable Dilithium-5 secret key"))?;
        debug_assert_eq!(
            private.len() - ED25519_PRIVATE_KEY_SIZE,
            DILITHIUM_SECRET_KEY_SIZE
        );

        let public_key = IdentityPublicKey::from_bytes(public)?;
        if public_key.classic_bytes() != classic.verifying_key().to_bytes() {
            return Err(CoreError::key_parse(
                "classical public key does not match private key",
            ));
        }

        // The Dilithium halves can only be checked by exercising them.
        let probe = b"protov2d key consistency probe";
        let sig = dilithium5::detached_sign(probe, &pq_secret);
        dilithium5::verify_detached_signature(&sig, probe, &public_key.pq)
            .map_err(|_| CoreError::key_parse("Dilithium-5 public key does not match private key"))?;

        Ok(Self {
            classic,
            pq_public: public_key.pq,
            pq_secret,
        })
    }

    /// Reconstructs a key pair from lowercase hex serializations.
    ///
    /// # Errors
    /// Returns `KeyParse`/`Decoding` on invalid input.
    pub fn from_hex(private_hex: &str, public_hex: &str) -> Result<Self> {
        let private = Zeroizing::new(from_hex(private_hex)?);
        let public = from_hex(public_hex)?;
        Self::from_key_bytes(&private, &public)
    }

    /// Returns the public half.
    #[must_use]
    pub fn public_key(&self) -> IdentityPublicKey {
        IdentityPublicKey {
            classic: self.classic.verifying_key(),
            pq: self.pq_public,
        }
    }

    /// Returns the public wire form `classicPub ∥ pqPub` (2624 bytes).
    #[must_use]
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key().to_bytes()
    }

    /// Exports the private wire form `classicSeed ∥ pqSecret`.
    ///
    /// # Security Warning
    /// The returned buffer zeroes itself on drop; do not copy it into
    /// long-lived storage unencrypted.
    #[must_use]
    pub fn private_key_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Vec::with_capacity(HYBRID_PRIVATE_KEY_SIZE);
        out.extend_from_slice(&self.classic.to_bytes());
        out.extend_from_slice(self.pq_secret.as_bytes());
        Zeroizing::new(out)
    }

    /// Signs a message with both halves.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> HybridSignature {
        let classic = self.classic.sign(message).to_bytes();
        let pq = dilithium5::detached_sign(message, &self.pq_secret)
            .as_bytes()
            .to_vec();
        HybridSignature { classic, pq }
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print private key material
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

// ============================================
// IdentityPublicKey
// ============================================

/// Public half of a hybrid identity. Safe to share.
#[derive(Clone, Copy)]
pub struct IdentityPublicKey {
    classic: VerifyingKey,
    pq: dilithium5::PublicKey,
}

impl IdentityPublicKey {
    /// Parses the wire form `classicPub(32) ∥ pqPub(2592)`.
    ///
    /// # Errors
    /// Returns `KeyParse` on bad length or undecodable halves.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HYBRID_PUBLIC_KEY_SIZE {
            return Err(CoreError::key_parse(format!(
                "public key must be {} bytes, got {}",
                HYBRID_PUBLIC_KEY_SIZE,
                bytes.len()
            )));
        }
        let mut classic_bytes = [0u8; ED25519_PUBLIC_KEY_SIZE];
        classic_bytes.copy_from_slice(&bytes[..ED25519_PUBLIC_KEY_SIZE]);
        let classic = VerifyingKey::from_bytes(&classic_bytes)
            .map_err(|_| CoreError::key_parse("invalid Ed25519 public key"))?;
        let pq = dilithium5::PublicKey::from_bytes(&bytes[ED25519_PUBLIC_KEY_SIZE..])
            .map_err(|_| CoreError::key_parse("invalid Dilithium-5 public key"))?;
        debug_assert_eq!(
            bytes.len() - ED25519_PUBLIC_KEY_SIZE,
            DILITHIUM_PUBLIC_KEY_SIZE
        );
        Ok(Self { classic, pq })
    }

    /// Parses a lowercase hex serialization of the wire form.
    ///
    /// # Errors
    /// Returns `Decoding`/`KeyParse` on invalid input.
    pub fn from_hex(input: &str) -> Result<Self> {
        Self::from_bytes(&from_hex(input)?)
    }

    /// Returns the wire form (2624 bytes).
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HYBRID_PUBLIC_KEY_SIZE);
        out.extend_from_slice(self.classic.as_bytes());
        out.extend_from_slice(self.pq.as_bytes());
        out
    }

    /// Returns the Ed25519 half.
    #[must_use]
    pub fn classic_bytes(&self) -> [u8; ED25519_PUBLIC_KEY_SIZE] {
        self.classic.to_bytes()
    }

    /// Returns the Dilithium-5 half.
    #[must_use]
    pub fn pq_bytes(&self) -> &[u8] {
        self.pq.as_bytes()
    }

    /// Verifies a hybrid signature; both halves must pass.
    ///
    /// # Errors
    /// Returns `SignatureVerification` if either half fails.
    pub fn verify(&self, message: &[u8], signature: &HybridSignature) -> Result<()> {
        let sig = Signature::from_bytes(&signature.classic);
        self.classic
            .verify(message, &sig)
            .map_err(|_| CoreError::SignatureVerification)?;

        let pq_sig = dilithium5::DetachedSignature::from_bytes(&signature.pq)
            .map_err(|_| CoreError::SignatureVerification)?;
        dilithium5::verify_detached_signature(&pq_sig, message, &self.pq)
            .map_err(|_| CoreError::SignatureVerification)
    }
}

impl PartialEq for IdentityPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.classic == other.classic && self.pq.as_bytes() == other.pq.as_bytes()
    }
}

impl Eq for IdentityPublicKey {}

impl fmt::Debug for IdentityPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.classic.as_bytes();
        write!(
            f,
            "IdentityPublicKey({:02x}{:02x}{:02x}{:02x}...)",
            bytes[0], bytes[1], bytes[2], bytes[3]
        )
    }
}

impl fmt::Display for IdentityPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", to_hex(&self.to_bytes()))
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_sign_verify() {
        let pair = IdentityKeyPair::generate();
        let message = b"hello protov2d";

        let sig = pair.sign(message);
        assert_eq!(sig.pq.len(), DILITHIUM_SIGNATURE_SIZE);
        assert!(pair.public_key().verify(message, &sig).is_ok());

        assert!(pair.public_key().verify(b"other message", &sig).is_err());
    }

    #[test]
    fn test_corrupt_half_rejected() {
        let pair = IdentityKeyPair::generate();
        let message = b"hello protov2d";
        let sig = pair.sign(message);

        let mut bad_classic = sig.clone();
        bad_classic.classic[0] ^= 0xFF;
        assert!(pair.public_key().verify(message, &bad_classic).is_err());

        let mut bad_pq = sig;
        bad_pq.pq[100] ^= 0xFF;
        assert!(pair.public_key().verify(message, &bad_pq).is_err());
    }

    #[test]
    fn test_key_roundtrip_through_hex() {
        let pair = IdentityKeyPair::generate();
        let private_hex = to_hex(&pair.private_key_bytes());
        let public_hex = to_hex(&pair.public_key_bytes());

        assert_eq!(private_hex, private_hex.to_lowercase());
        assert_eq!(private_hex.len(), HYBRID_PRIVATE_KEY_SIZE * 2);

        let restored = IdentityKeyPair::from_hex(&private_hex, &public_hex).unwrap();
        assert_eq!(restored.public_key_bytes(), pair.public_key_bytes());

        // Cross-check: restored pair's signatures verify under the
        // original public key.
        let sig = restored.sign(b"roundtrip");
        assert!(pair.public_key().verify(b"roundtrip", &sig).is_ok());
    }

    #[test]
    fn test_mismatched_halves_rejected() {
        let a = IdentityKeyPair::generate();
        let b = IdentityKeyPair::generate();
        let result =
            IdentityKeyPair::from_key_bytes(&a.private_key_bytes(), &b.public_key_bytes());
        assert!(result.is_err());
    }

    #[test]
    fn test_v1_composite_roundtrip() {
        let pair = IdentityKeyPair::generate();
        let sig = pair.sign(b"composite");

        let composite = sig.to_v1_composite();
        assert_eq!(
            &composite[ED25519_SIGNATURE_SIZE..ED25519_SIGNATURE_SIZE + 2],
            &V1_SIGNATURE_SENTINEL
        );

        let parsed = HybridSignature::from_v1_composite(&composite).unwrap();
        assert_eq!(parsed, sig);
    }

    #[test]
    fn test_v1_composite_sentinel_enforced() {
        let pair = IdentityKeyPair::generate();
        let mut composite = pair.sign(b"composite").to_v1_composite();
        composite[ED25519_SIGNATURE_SIZE] = 0x00;
        assert!(HybridSignature::from_v1_composite(&composite).is_err());
    }

    #[test]
    fn test_public_key_wire_size() {
        let pair = IdentityKeyPair::generate();
        assert_eq!(pair.public_key_bytes().len(), HYBRID_PUBLIC_KEY_SIZE);

        let parsed = IdentityPublicKey::from_bytes(&pair.public_key_bytes()).unwrap();
        assert_eq!(parsed, pair.public_key());
    }
}
