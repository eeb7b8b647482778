// ============================================
// File: crates/protov2d-core/src/protocol/records.rs
// ============================================
//! # Handshake Control Records
//!
//! ## Creation Reason
//! Handshake control traffic is MessagePack arrays with fixed
//! positional semantics. Each record is a tagged tuple struct so the
//! deserializer enforces arity, and the leading tag is validated
//! explicitly after decode.
//!
//! ## Records
//! | Tag | Record | Direction |
//! |-----|-------------------|-----------|
//! | 1 | `ClientInit` | C → S |
//! | 2 | `V1ServerKex` | S → C |
//! | 3 | `V1ClientKem` | C → S |
//! | 4 | `V1Challenge` | S → C (encrypted) |
//! | 5 | `V1ClientProof` | C → S (encrypted) |
//! | 6 | `V1Established` | S → C (encrypted) |
//!
//! Hex fields are lowercase with no delimiters. A record with the
//! wrong arity or tag is rejected outright.
//!
//! ## Last Modified
//! v0.1.0 - Initial record definitions

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{CoreError, Result};

// ============================================
// Encoding Helpers
// ============================================

/// Encodes a record as a MessagePack array.
///
/// # Errors
/// Returns `RecordDecode` if serialization fails (malformed record,
/// which would be a bug).
pub fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec(record).map_err(|_| CoreError::record_decode("encode"))
}

/// Decodes a record from a MessagePack array, enforcing exact arity.
///
/// # Errors
/// Returns `RecordDecode` on wrong arity, wrong element types, or
/// trailing bytes.
pub fn decode_record<T: DeserializeOwned>(buf: &[u8], context: &'static str) -> Result<T> {
    rmp_serde::from_slice(buf).map_err(|_| CoreError::record_decode(context))
}

// ============================================
// Encryption Modes
// ============================================

/// Client-requested encryption mode in the initial packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EncryptionMode {
    /// Encrypted session; server delivers only the SHA-256 of its
    /// root public key.
    HashPin = 0,
    /// Encrypted session; server delivers its full root public key.
    FullKey = 1,
    /// Unencrypted session (requires server opt-in).
    Plaintext = 2,
}

impl EncryptionMode {
    /// Converts a wire byte to a mode.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::HashPin),
            1 => Some(Self::FullKey),
            2 => Some(Self::Plaintext),
            _ => None,
        }
    }

    /// Returns the wire byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

// ============================================
// Records
// ============================================

/// Initial packet: `[1, handshakeVersion, supportedVersions, mode]`.
///
/// A v1 handshake ignores the last two positions, but they are always
/// present on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInit(pub u8, pub u8, pub Vec<u8>, pub u8);

impl ClientInit {
    /// Record tag.
    pub const TAG: u8 = 1;

    /// Builds an initial packet.
    #[must_use]
    pub fn new(handshake_version: u8, supported: Vec<u8>, mode: EncryptionMode) -> Self {
        Self(Self::TAG, handshake_version, supported, mode.as_byte())
    }

    /// Requested handshake version.
    #[must_use]
    pub fn handshake_version(&self) -> u8 {
        self.1
    }

    /// Versions the client can speak.
    #[must_use]
    pub fn supported_versions(&self) -> &[u8] {
        &self.2
    }

    /// Requested encryption mode.
    ///
    /// # Errors
    /// Returns `MalformedMessage` on an unknown mode byte.
    pub fn encryption_mode(&self) -> Result<EncryptionMode> {
        EncryptionMode::from_byte(self.3)
            .ok_or_else(|| CoreError::malformed(format!("unknown encryption mode {}", self.3)))
    }

    /// Validates the tag.
    ///
    /// # Errors
    /// Returns `MalformedMessage` on a tag mismatch.
    pub fn validate(&self) -> Result<()> {
        validate_tag(self.0, Self::TAG)
    }
}

/// v1 server key exchange:
/// `[2, hex(ephPqPub), hex(sigClassic ∥ F311 ∥ sigPq), hex(rootPub)]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V1ServerKex(pub u8, pub String, pub String, pub String);

impl V1ServerKex {
    /// Record tag.
    pub const TAG: u8 = 2;

    /// Builds the record from already-hex-encoded fields.
    #[must_use]
    pub fn new(eph_pq_pub_hex: String, composite_sig_hex: String, root_pub_hex: String) -> Self {
        Self(Self::TAG, eph_pq_pub_hex, composite_sig_hex, root_pub_hex)
    }

    /// Validates the tag.
    ///
    /// # Errors
    /// Returns `MalformedMessage` on a tag mismatch.
    pub fn validate(&self) -> Result<()> {
        validate_tag(self.0, Self::TAG)
    }
}

/// v1 client KEM ciphertext: `[3, hex(kyberCt)]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V1ClientKem(pub u8, pub String);

impl V1ClientKem {
    /// Record tag.
    pub const TAG: u8 = 3;

    /// Builds the record.
    #[must_use]
    pub fn new(kyber_ct_hex: String) -> Self {
        Self(Self::TAG, kyber_ct_hex)
    }

    /// Validates the tag.
    ///
    /// # Errors
    /// Returns `MalformedMessage` on a tag mismatch.
    pub fn validate(&self) -> Result<()> {
        validate_tag(self.0, Self::TAG)
    }
}

/// v1 challenge nonce: `[4, randomString]`, sent AES-wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V1Challenge(pub u8, pub String);

impl V1Challenge {
    /// Record tag.
    pub const TAG: u8 = 4;

    /// Builds the record.
    #[must_use]
    pub fn new(nonce: String) -> Self {
        Self(Self::TAG, nonce)
    }

    /// Validates the tag.
    ///
    /// # Errors
    /// Returns `MalformedMessage` on a tag mismatch.
    pub fn validate(&self) -> Result<()> {
        validate_tag(self.0, Self::TAG)
    }
}

/// v1 client session proof:
/// `[5, hex(sessionPub), hex(sigClassic ∥ F311 ∥ sigPq)]`, AES-wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V1ClientProof(pub u8, pub String, pub String);

impl V1ClientProof {
    /// Record tag.
    pub const TAG: u8 = 5;

    /// Builds the record.
    #[must_use]
    pub fn new(session_pub_hex: String, composite_sig_hex: String) -> Self {
        Self(Self::TAG, session_pub_hex, composite_sig_hex)
    }

    /// Validates the tag.
    ///
    /// # Errors
    /// Returns `MalformedMessage` on a tag mismatch.
    pub fn validate(&self) -> Result<()> {
        validate_tag(self.0, Self::TAG)
    }
}

/// v1 establishment confirmation: `[6, newSession]`, AES-wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V1Established(pub u8, pub bool);

impl V1Established {
    /// Record tag.
    pub const TAG: u8 = 6;

    /// Builds the record.
    #[must_use]
    pub fn new(new_session: bool) -> Self {
        Self(Self::TAG, new_session)
    }

    /// Whether the server created a fresh session.
    #[must_use]
    pub fn new_session(&self) -> bool {
        self.1
    }

    /// Validates the tag.
    ///
    /// # Errors
    /// Returns `MalformedMessage` on a tag mismatch.
    pub fn validate(&self) -> Result<()> {
        validate_tag(self.0, Self::TAG)
    }
}

/// Version rejection payload: `[[supported...]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReject(pub Vec<u8>);

fn validate_tag(got: u8, expected: u8) -> Result<()> {
    if got == expected {
        Ok(())
    } else {
        Err(CoreError::malformed(format!(
            "record tag {got}, expected {expected}"
        )))
    }
}

// ============================================
// Tests
// ============================================
