// ============================================
// File: crates/protov2d-core/src/handshake/pin.rs
// ============================================
//! # Public-Key Pin Sets
//!
//! ## Creation Reason
//! Clients authenticate the server against locally pinned material
//! rather than a PKI. A pin set is an ordered list of acceptable root
//! identity representations: the full key, its SHA-256, or an
//! explicit opt-out.
//!
//! ## Matching
//! Entries are consulted in order; the first match wins. A set
//! containing `NoVerify` accepts any server (recommended against).
//!
//! When every entry carries the full key, hash-only delivery is
//! requested from the server and the pinned key itself verifies the
//! handshake signatures. A set containing hash entries requests
//! full-key delivery so the signatures stay verifiable.
//!
//! ## Last Modified
//! v0.1.0 - Initial pin set implementation

use crate::crypto::{sha256, HYBRID_PUBLIC_KEY_SIZE, SHA256_SIZE};
use crate::error::{CoreError, Result};
use crate::protocol::records::EncryptionMode;

// ============================================
// PinEntry
// ============================================

/// One acceptable representation of the server's root identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinEntry {
    /// The full root public key (`classic ∥ pq`, 2624 bytes).
    Key(Vec<u8>),
    /// SHA-256 of the full root public key.
    Hash(Vec<u8>),
    /// Accept any server. Disables identity checks entirely.
    NoVerify,
}

// ============================================
// PinSet
// ============================================

/// Ordered list of pin entries a client will accept.
#[derive(Debug, Clone)]
pub struct PinSet {
    entries: Vec<PinEntry>,
}

impl PinSet {
    /// Creates a pin set, validating entry shapes.
    ///
    /// # Errors
    /// Returns `KeyParse` on an empty set or an entry with the wrong
    /// length.
    pub fn new(entries: Vec<PinEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(CoreError::key_parse("pin set must not be empty"));
        }
        for entry in &entries {
            match entry {
                PinEntry::Key(key) if key.len() != HYBRID_PUBLIC_KEY_SIZE => {
                    return Err(CoreError::key_parse(format!(
                        "pinned key must be {} bytes, got {}",
                        HYBRID_PUBLIC_KEY_SIZE,
                        key.len()
                    )));
                }
                PinEntry::Hash(hash) if hash.len() != SHA256_SIZE => {
                    return Err(CoreError::key_parse(format!(
                        "pinned hash must be {} bytes, got {}",
                        SHA256_SIZE,
                        hash.len()
                    )));
                }
                _ => {}
            }
        }
        Ok(Self { entries })
    }

    /// Convenience constructor for a single full-key pin.
    ///
    /// # Errors
    /// Returns `KeyParse` on a wrong-length key.
    pub fn single_key(key: Vec<u8>) -> Result<Self> {
        Self::new(vec![PinEntry::Key(key)])
    }

    /// Convenience constructor for a single hash pin.
    ///
    /// # Errors
    /// Returns `KeyParse` on a wrong-length hash.
    pub fn single_hash(hash: Vec<u8>) -> Result<Self> {
        Self::new(vec![PinEntry::Hash(hash)])
    }

    /// Returns `true` if the set contains `NoVerify`.
    #[must_use]
    pub fn accepts_any(&self) -> bool {
        self.entries.iter().any(|e| matches!(e, PinEntry::NoVerify))
    }

    /// Picks the encryption mode to request from the server.
    ///
    /// Full-key delivery is only needed when a hash entry would
    /// otherwise leave the handshake signatures unverifiable.
    #[must_use]
    pub fn preferred_mode(&self, disable_encryption: bool) -> EncryptionMode {
        if disable_encryption {
            EncryptionMode::Plaintext
        } else if self
            .entries
            .iter()
            .all(|e| matches!(e, PinEntry::Key(_) | PinEntry::NoVerify))
        {
            EncryptionMode::HashPin
        } else {
            EncryptionMode::FullKey
        }
    }

    /// Checks a delivered full root public key against the set.
    ///
    /// # Errors
    /// Returns `PinMismatch` if no entry matches.
    pub fn verify_full_key(&self, delivered: &[u8]) -> Result<()> {
        let delivered_hash = sha256(delivered);
        for entry in &self.entries {
            match entry {
                PinEntry::NoVerify => return Ok(()),
                PinEntry::Key(key) if key.as_slice() == delivered => return Ok(()),
                PinEntry::Hash(hash) if hash.as_slice() == delivered_hash => return Ok(()),
                _ => {}
            }
        }
        Err(CoreError::PinMismatch)
    }

    /// Checks a delivered root-key hash against the set.
    ///
    /// On success returns the pinned full key to verify the handshake
    /// signatures with, or `None` when the matching entry carries no
    /// key material (hash entry or `NoVerify`).
    ///
    /// # Errors
    /// Returns `PinMismatch` if no entry matches.
    pub fn resolve_hash(&self, delivered_hash: &[u8]) -> Result<Option<&[u8]>> {
        for entry in &self.entries {
            match entry {
                PinEntry::NoVerify => return Ok(None),
                PinEntry::Key(key) if sha256(key)[..] == *delivered_hash => {
                    return Ok(Some(key.as_slice()));
                }
                PinEntry::Hash(hash) if hash.as_slice() == delivered_hash => return Ok(None),
                _ => {}
            }
        }
        Err(CoreError::PinMismatch)
    }
}

// ============================================
// Tests
// ============================================
