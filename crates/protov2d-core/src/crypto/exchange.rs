// ============================================
// File: crates/protov2d-core/src/crypto/exchange.rs
// ============================================
//! # Key Exchange
//!
//! ## Creation Reason
//! Provides the two key-agreement legs of the hybrid handshake: X25519
//! Diffie-Hellman (classical) and Kyber-1024 encapsulation
//! (post-quantum). Each leg yields a 32-byte shared secret that is
//! imported directly as an AES-256-GCM key.
//!
//! ## Main Functionality
//! - `DhKeyPair`: per-connection X25519 key pair
//! - `KemKeyPair`: per-connection Kyber-1024 key pair (server side)
//! - `kem_encapsulate`: client-side encapsulation to a peer public key
//!
//! ## ⚠️ Important Note for Next Developer
//! - These key pairs are ephemeral: held for one handshake, then
//!   dropped
//! - Shared secrets become keys verbatim; there is no KDF step
//!
//! ## Last Modified
//! v0.1.0 - Initial key exchange implementation

use std::fmt;

use pqcrypto_kyber::kyber1024;
use pqcrypto_traits::kem::{
    Ciphertext as _, PublicKey as _, SharedSecret as _,
};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use super::aead::AesKey;
use super::{KYBER_CIPHERTEXT_SIZE, KYBER_PUBLIC_KEY_SIZE, X25519_PUBLIC_KEY_SIZE};
use crate::error::{CoreError, Result};

// ============================================
// DhKeyPair (X25519)
// ============================================

/// Ephemeral X25519 key pair for the classical key-agreement leg.
///
/// Backed by a `StaticSecret` rather than `EphemeralSecret` because
/// the server holds its half across an await point until the client
/// responds; the pair is still discarded after one handshake.
pub struct DhKeyPair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl DhKeyPair {
    /// Generates a new random key pair.
    #[must_use]
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Returns the public key bytes.
    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; X25519_PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Computes the shared secret with a peer's public key, imported
    /// as an AES-256 key.
    ///
    /// # Errors
    /// Returns `Kem` if the peer public key has the wrong length.
    pub fn shared_key(&self, peer_public: &[u8]) -> Result<AesKey> {
        let peer: [u8; X25519_PUBLIC_KEY_SIZE] = peer_public
            .try_into()
            .map_err(|_| CoreError::kem("X25519 peer public key must be 32 bytes"))?;
        let shared = self.secret.diffie_hellman(&X25519PublicKey::from(peer));
        Ok(AesKey::from_bytes(*shared.as_bytes()))
    }
}

impl fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.public.as_bytes();
        f.debug_struct("DhKeyPair")
            .field(
                "public",
                &format_args!("{:02x}{:02x}{:02x}{:02x}...", bytes[0], bytes[1], bytes[2], bytes[3]),
            )
            .finish_non_exhaustive()
    }
}

// ============================================
// KemKeyPair (Kyber-1024)
// ============================================

/// Ephemeral Kyber-1024 KEM key pair, held by the side awaiting an
/// encapsulation (the server in v2, and the v1 key-exchange owner).
pub struct KemKeyPair {
    public: kyber1024::PublicKey,
    secret: kyber1024::SecretKey,
}

impl KemKeyPair {
    /// Generates a new random KEM key pair.
    #[must_use]
    pub fn generate() -> Self {
        let (public, secret) = kyber1024::keypair();
        Self { public, secret }
    }

    /// Returns the public key bytes (1568 bytes).
    #[must_use]
    pub fn public_key_bytes(&self) -> &[u8] {
        self.public.as_bytes()
    }

    /// Decapsulates a peer ciphertext into the shared AES-256 key.
    ///
    /// # Errors
    /// Returns `Kem` on an undecodable ciphertext.
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<AesKey> {
        if ciphertext.len() != KYBER_CIPHERTEXT_SIZE {
            return Err(CoreError::kem(format!(
                "Kyber ciphertext must be {} bytes, got {}",
                KYBER_CIPHERTEXT_SIZE,
                ciphertext.len()
            )));
        }
        let ct = kyber1024::Ciphertext::from_bytes(ciphertext)
            .map_err(|_| CoreError::kem("undecodable Kyber ciphertext"))?;
        let shared = kyber1024::decapsulate(&ct, &self.secret);
        AesKey::from_slice(shared.as_bytes())
    }
}

impl fmt::Debug for KemKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KemKeyPair").finish_non_exhaustive()
    }
}

/// Encapsulates to a peer's Kyber-1024 public key.
///
/// Returns the ciphertext to transmit and the shared AES-256 key.
///
/// # Errors
/// Returns `Kem` on an undecodable peer public key.
pub fn kem_encapsulate(peer_public: &[u8]) -> Result<(Vec<u8>, AesKey)> {
    if peer_public.len() != KYBER_PUBLIC_KEY_SIZE {
        return Err(CoreError::kem(format!(
            "Kyber public key must be {} bytes, got {}",
            KYBER_PUBLIC_KEY_SIZE,
            peer_public.len()
        )));
    }
    let pk = kyber1024::PublicKey::from_bytes(peer_public)
        .map_err(|_| CoreError::kem("undecodable Kyber public key"))?;
    let (shared, ct) = kyber1024::encapsulate(&pk);
    Ok((ct.as_bytes().to_vec(), AesKey::from_slice(shared.as_bytes())?))
}

// ============================================
// Tests
// ============================================
