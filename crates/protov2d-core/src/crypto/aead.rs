// ============================================
// File: crates/protov2d-core/src/crypto/aead.rs
// ============================================
//! # Layered AES-GCM Encryption
//!
//! ## Creation Reason
//! Provides the authenticated encryption used everywhere past key
//! agreement: single-key AES-256-GCM with the protocol's 16-byte IV
//! and optional plaintext integrity digest, plus the nested key-stack
//! form that imposes every derived key at once.
//!
//! ## Envelope Format
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │ iv (16 bytes)                  │ fresh random       │
//! ├─────────────────────────────────────────────────────┤
//! │ sha256(plaintext) (32 bytes)   │ only if digest on  │
//! ├─────────────────────────────────────────────────────┤
//! │ ciphertext ∥ tag (16 bytes)    │ AES-256-GCM        │
//! └─────────────────────────────────────────────────────┘
//! ```
//! Decryption verifies the GCM tag, then (digest mode) recomputes
//! SHA-256 over the recovered plaintext and fails closed on mismatch.
//! Digest mode is on for protocol v2 and off for v1.
//!
//! ## Key Stack
//! Keys are kept in derivation order (v2: `[kPQ, kClassic]`).
//! Sealing applies them in that order, so the classical key ends up
//! outermost; opening peels from the outside inward. The empty stack
//! is the identity and carries plaintext sessions.
//!
//! ## ⚠️ Important Note for Next Developer
//! - IVs are fresh random per encryption; never reuse
//! - Tag length is 128 bits; the 16-byte IV is a wire contract
//!
//! ## Last Modified
//! v0.1.0 - Initial AEAD implementation

use std::fmt;

use aes_gcm::{
    aead::{generic_array::typenum::U16, generic_array::GenericArray, Aead, KeyInit},
    aes::Aes256,
    AesGcm,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{random_array, sha256, AES_IV_SIZE, AES_KEY_SIZE, AES_TAG_SIZE, SHA256_SIZE};
use crate::error::{CoreError, Result};

/// AES-256-GCM parameterized with the protocol's 16-byte IV.
type Cipher = AesGcm<Aes256, U16>;

// ============================================
// AesKey
// ============================================

/// A 256-bit AES-GCM key bound to a session.
///
/// # Security
/// - Zeroed on drop
/// - Never logged; `Debug` redacts
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AesKey([u8; AES_KEY_SIZE]);

impl AesKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; AES_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a key from a slice.
    ///
    /// # Errors
    /// Returns `KeyParse` if the slice is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; AES_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CoreError::key_parse("AES key must be 32 bytes"))?;
        Ok(Self(arr))
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; AES_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AesKey([REDACTED])")
    }
}

// ============================================
// Single-Key Operations
// ============================================

/// Encrypts under one key with a fresh random 16-byte IV.
///
/// Output layout: `iv ∥ [sha256(plain) if with_digest] ∥ ct+tag`.
///
/// # Errors
/// Returns `Encryption` if the cipher fails (should not happen with a
/// valid key).
pub fn aes_encrypt(plain: &[u8], key: &AesKey, with_digest: bool) -> Result<Vec<u8>> {
    let cipher = Cipher::new_from_slice(key.as_bytes())
        .map_err(|_| CoreError::encryption("cipher construction"))?;

    let iv: [u8; AES_IV_SIZE] = random_array();
    let ciphertext = cipher
        .encrypt(GenericArray::from_slice(&iv), plain)
        .map_err(|_| CoreError::encryption("AES-256-GCM seal"))?;

    let digest_len = if with_digest { SHA256_SIZE } else { 0 };
    let mut out = Vec::with_capacity(AES_IV_SIZE + digest_len + ciphertext.len());
    out.extend_from_slice(&iv);
    if with_digest {
        out.extend_from_slice(&sha256(plain));
    }
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts an [`aes_encrypt`] envelope, verifying the GCM tag and,
/// in digest mode, the embedded SHA-256 over the plaintext.
///
/// # Errors
/// Returns `Decryption` on truncated input, tag failure, or digest
/// mismatch. Fails closed: no partial plaintext is returned.
pub fn aes_decrypt(data: &[u8], key: &AesKey, with_digest: bool) -> Result<Vec<u8>> {
    let digest_len = if with_digest { SHA256_SIZE } else { 0 };
    if data.len() < AES_IV_SIZE + digest_len + AES_TAG_SIZE {
        return Err(CoreError::Decryption);
    }

    let iv = &data[..AES_IV_SIZE];
    let embedded_digest = &data[AES_IV_SIZE..AES_IV_SIZE + digest_len];
    let ciphertext = &data[AES_IV_SIZE + digest_len..];

    let cipher = Cipher::new_from_slice(key.as_bytes()).map_err(|_| CoreError::Decryption)?;
    let plain = cipher
        .decrypt(GenericArray::from_slice(iv), ciphertext)
        .map_err(|_| CoreError::Decryption)?;

    if with_digest && sha256(&plain)[..] != *embedded_digest {
        return Err(CoreError::Decryption);
    }

    Ok(plain)
}

// ============================================
// KeyStack
// ============================================

/// An ordered stack of AES-GCM keys applied as nested encryption.
///
/// The order is the derivation order: v2 sessions hold
/// `[kPQ, kClassic]`, v1 sessions `[kPQ]`, plaintext sessions nothing.
/// The stack is bound to the session and survives transport swaps
/// (the handshake replaces it wholesale on resume).
#[derive(Clone, Default)]
pub struct KeyStack {
    keys: Vec<AesKey>,
}

impl KeyStack {
    /// Creates a stack from keys in derivation order.
    #[must_use]
    pub fn new(keys: Vec<AesKey>) -> Self {
        Self { keys }
    }

    /// The empty stack: sealing and opening are the identity.
    #[must_use]
    pub fn plaintext() -> Self {
        Self { keys: Vec::new() }
    }

    /// Returns `true` if no keys are held (plaintext session).
    #[must_use]
    pub fn is_plaintext(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of keys in the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// The keys in derivation order.
    #[must_use]
    pub fn keys(&self) -> &[AesKey] {
        &self.keys
    }

    /// Returns `true` if the stack holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Seals a frame body: applies each key in derivation order, so
    /// the last-derived (classical) key is outermost on the wire.
    ///
    /// # Errors
    /// Propagates `Encryption` from any layer.
    pub fn seal(&self, plain: &[u8], with_digest: bool) -> Result<Vec<u8>> {
        let mut buf = plain.to_vec();
        for key in &self.keys {
            buf = aes_encrypt(&buf, key, with_digest)?;
        }
        Ok(buf)
    }

    /// Opens a sealed frame body, peeling layers from the outside
    /// inward.
    ///
    /// # Errors
    /// Returns `Decryption` if any layer fails.
    pub fn open(&self, data: &[u8], with_digest: bool) -> Result<Vec<u8>> {
        let mut buf = data.to_vec();
        for key in self.keys.iter().rev() {
            buf = aes_decrypt(&buf, key, with_digest)?;
        }
        Ok(buf)
    }
}

impl fmt::Debug for KeyStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStack").field("keys", &self.keys.len()).finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key(fill: u8) -> AesKey {
        AesKey::from_bytes([fill; AES_KEY_SIZE])
    }

    #[test]
    fn test_roundtrip_both_digest_modes() {
        let k = key(0x42);
        for with_digest in [false, true] {
            let plain = b"the quick brown fox";
            let sealed = aes_encrypt(plain, &k, with_digest).unwrap();
            let opened = aes_decrypt(&sealed, &k, with_digest).unwrap();
            assert_eq!(opened, plain);
        }
    }

    #[test]
    fn test_envelope_layout() {
        let k = key(0x42);
        let plain = b"payload";

        let sealed = aes_encrypt(plain, &k, false).unwrap();
        assert_eq!(sealed.len(), AES_IV_SIZE + plain.len() + AES_TAG_SIZE);

        let sealed = aes_encrypt(plain, &k, true).unwrap();
        assert_eq!(
            sealed.len(),
            AES_IV_SIZE + SHA256_SIZE + plain.len() + AES_TAG_SIZE
        );
        // The digest travels in the clear between IV and ciphertext.
        assert_eq!(&sealed[AES_IV_SIZE..AES_IV_SIZE + SHA256_SIZE], &sha256(plain));
    }

    #[test]
    fn test_any_flipped_byte_fails() {
        let k = key(0x42);
        let sealed = aes_encrypt(b"sensitive", &k, true).unwrap();

        for i in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[i] ^= 0x01;
            assert!(
                aes_decrypt(&tampered, &k, true).is_err(),
                "flip at byte {} was accepted",
                i
            );
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = aes_encrypt(b"data", &key(0x42), false).unwrap();
        assert!(aes_decrypt(&sealed, &key(0x43), false).is_err());
    }

    #[test]
    fn test_truncated_input_fails() {
        let k = key(0x42);
        assert!(aes_decrypt(&[0u8; 10], &k, false).is_err());
        assert!(aes_decrypt(&[0u8; 40], &k, true).is_err());
    }

    #[test]
    fn test_fresh_ivs() {
        let k = key(0x42);
        let a = aes_encrypt(b"same plaintext", &k, false).unwrap();
        let b = aes_encrypt(b"same plaintext", &k, false).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_stack_nesting_order() {
        let k_pq = key(0x01);
        let k_classic = key(0x02);
        let stack = KeyStack::new(vec![k_pq.clone(), k_classic.clone()]);

        let sealed = stack.seal(b"nested", true).unwrap();

        // Outermost layer must be the classical key: peel manually.
        let inner = aes_decrypt(&sealed, &k_classic, true).unwrap();
        let plain = aes_decrypt(&inner, &k_pq, true).unwrap();
        assert_eq!(plain, b"nested");

        assert_eq!(stack.open(&sealed, true).unwrap(), b"nested");
    }

    #[test]
    fn test_stack_requires_every_key() {
        let stack = KeyStack::new(vec![key(0x01), key(0x02)]);
        let partial = KeyStack::new(vec![key(0x01)]);

        let sealed = stack.seal(b"nested", true).unwrap();
        assert!(partial.open(&sealed, true).is_err());
    }

    #[test]
    fn test_plaintext_stack_is_identity() {
        let stack = KeyStack::plaintext();
        assert!(stack.is_plaintext());
        assert_eq!(stack.seal(b"clear", true).unwrap(), b"clear");
        assert_eq!(stack.open(b"clear", false).unwrap(), b"clear");
    }
}
