// ============================================
// File: crates/protov2d-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Centralizes the cryptographic facade for ProtoV2d: hybrid
//! classical + post-quantum identities, key exchange, and the layered
//! AES-GCM transport encryption.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`keys`]: Hybrid identity keys (Ed25519 ∥ Dilithium-5)
//! - [`exchange`]: X25519 DH and Kyber-1024 KEM
//! - [`aead`]: AES-256-GCM with 16-byte IV, integrity digest, key stack
//!
//! ## Cryptographic Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Handshake Phase (v2)                     │
//! │  Client                                        Server       │
//! │    │ ◄── X25519 pub + Kyber-1024 pub, hybrid-signed  │      │
//! │    │                                                 │      │
//! │    │  X25519 DH ──────► kClassic                     │      │
//! │    │  Kyber encapsulate ──────► kPQ                  │      │
//! │    │                                                 │      │
//! │    │  session proof, E_kClassic(E_kPQ(...)) ───────► │      │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Transport Phase                          │
//! │   KeyStack [kPQ, kClassic] ──► nested AES-256-GCM           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL implementations are audited upstream crates
//! - ALL sensitive keys implement Zeroize
//! - KEX shared secrets are imported directly as AES-256 keys; there
//!   is no KDF step in this protocol
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto implementation

pub mod aead;
pub mod exchange;
pub mod keys;

pub use aead::{aes_decrypt, aes_encrypt, AesKey, KeyStack};
pub use exchange::{kem_encapsulate, DhKeyPair, KemKeyPair};
pub use keys::{HybridSignature, IdentityKeyPair, IdentityPublicKey};

use sha2::{Digest, Sha256, Sha512};

// ============================================
// Size Constants
// ============================================

/// Size of an Ed25519 public key in bytes.
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of an Ed25519 private seed in bytes.
pub const ED25519_PRIVATE_KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature in bytes.
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// Size of a Dilithium-5 public key in bytes.
pub const DILITHIUM_PUBLIC_KEY_SIZE: usize = 2592;

/// Size of a Dilithium-5 secret key in bytes.
pub const DILITHIUM_SECRET_KEY_SIZE: usize = 4864;

/// Size of a Dilithium-5 detached signature in bytes.
pub const DILITHIUM_SIGNATURE_SIZE: usize = 4595;

/// Size of a Kyber-1024 public key in bytes.
pub const KYBER_PUBLIC_KEY_SIZE: usize = 1568;

/// Size of a Kyber-1024 ciphertext in bytes.
pub const KYBER_CIPHERTEXT_SIZE: usize = 1568;

/// Size of an X25519 public key in bytes.
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of an AES-256 key in bytes.
pub const AES_KEY_SIZE: usize = 32;

/// Size of the AES-GCM initialization vector in bytes.
pub const AES_IV_SIZE: usize = 16;

/// Size of the AES-GCM authentication tag in bytes (128-bit).
pub const AES_TAG_SIZE: usize = 16;

/// Size of a SHA-256 digest in bytes.
pub const SHA256_SIZE: usize = 32;

/// Size of a full hybrid public key (`Ed25519 ∥ Dilithium-5`) in bytes.
pub const HYBRID_PUBLIC_KEY_SIZE: usize = ED25519_PUBLIC_KEY_SIZE + DILITHIUM_PUBLIC_KEY_SIZE;

/// Size of a full hybrid private key in bytes.
pub const HYBRID_PRIVATE_KEY_SIZE: usize = ED25519_PRIVATE_KEY_SIZE + DILITHIUM_SECRET_KEY_SIZE;

/// Size of the server's handshake challenge in bytes.
pub const CHALLENGE_SIZE: usize = 64;

// ============================================
// Hash Helpers
// ============================================

/// Computes a SHA-256 digest.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; SHA256_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes a SHA-512 digest.
#[must_use]
pub fn sha512(data: &[u8]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Fills a buffer with cryptographically strong random bytes.
pub fn random_bytes(buf: &mut [u8]) {
    use rand::RngCore;
    rand::rngs::OsRng.fill_bytes(buf);
}

/// Returns a fixed-size array of cryptographically strong random bytes.
#[must_use]
pub fn random_array<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    random_bytes(&mut out);
    out
}

/// Generates a random alphanumeric string of the given length.
///
/// Used for the v1 challenge nonce, which travels as a string inside a
/// MessagePack record.
#[must_use]
pub fn random_string(len: usize) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut bytes = vec![0u8; len];
    random_bytes(&mut bytes);
    bytes
        .into_iter()
        .map(|b| ALPHABET[(b as usize) % ALPHABET.len()] as char)
        .collect()
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc")
        let digest = sha256(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha512_empty_vector() {
        let digest = sha512(b"");
        assert!(hex::encode(digest).starts_with("cf83e1357eefb8bd"));
    }

    #[test]
    fn test_random_string_shape() {
        let s = random_string(64);
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));

        // Two draws colliding would indicate a broken RNG hookup.
        assert_ne!(random_string(64), random_string(64));
    }

    #[test]
    fn test_hybrid_sizes_are_consistent() {
        assert_eq!(HYBRID_PUBLIC_KEY_SIZE, 2624);
        assert_eq!(HYBRID_PRIVATE_KEY_SIZE, 4896);
    }
}
