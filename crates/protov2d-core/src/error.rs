// ============================================
// File: crates/protov2d-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines error types for protocol and cryptographic operations,
//! split along the line the reconnect logic cares about: recoverable
//! failures versus non-recoverable protocol violations.
//!
//! ## Main Functionality
//! - `CoreError`: primary error enum for core operations
//! - Classification predicates (`is_non_recoverable`)
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include key material in error messages
//! - A non-recoverable error must abort the client reconnect loop;
//!   adding a variant means deciding its class here, once
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use protov2d_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for protocol and cryptographic operations.
///
/// # Security Note
/// Error messages are informative for debugging without revealing
/// sensitive information like key material.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Cryptographic Errors
    // ========================================

    /// Failed to parse key material.
    #[error("Key parse failed: {context}")]
    KeyParse {
        /// What key was being parsed
        context: String,
    },

    /// Signature verification failed.
    #[error("Signature verification failed")]
    SignatureVerification,

    /// KEM encapsulation or decapsulation failed.
    #[error("Key encapsulation failed: {reason}")]
    Kem {
        /// Why the KEM operation failed
        reason: String,
    },

    /// Encryption operation failed.
    #[error("Encryption failed: {context}")]
    Encryption {
        /// What was being encrypted
        context: String,
    },

    /// Decryption failed (authentication or integrity-digest failure).
    #[error("Decryption failed: authentication error")]
    Decryption,

    // ========================================
    // Protocol Errors
    // ========================================

    /// Message is malformed.
    #[error("Malformed message: {reason}")]
    MalformedMessage {
        /// What's wrong with the message
        reason: String,
    },

    /// Message is too short to be valid.
    #[error("Message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort {
        /// Minimum expected length
        expected: usize,
        /// Actual length received
        actual: usize,
    },

    /// Failed to decode a MessagePack control record.
    #[error("Record decode failed: {context}")]
    RecordDecode {
        /// Which record was being decoded
        context: String,
    },

    /// The requested handshake version is not supported by this side.
    #[error("Unsupported handshake version {requested}")]
    UnsupportedVersion {
        /// Version the peer requested
        requested: u8,
    },

    /// The server rejected our version and named what it supports.
    #[error("Version rejected by server; server supports {supported:?}")]
    VersionRejected {
        /// Versions the server advertised
        supported: Vec<u8>,
    },

    /// The server refused an unencrypted session.
    #[error("Server refused plaintext session")]
    PlaintextRefused,

    /// Frame arrived outside the expected handshake step.
    #[error("Unexpected frame in state {state}")]
    UnexpectedFrame {
        /// State the machine was in
        state: &'static str,
    },

    // ========================================
    // Identity Errors
    // ========================================

    /// The delivered server identity matched no pin entry.
    #[error("Server public key does not match any pinned key")]
    PinMismatch,

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Error from the common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    /// Creates a `KeyParse` error.
    pub fn key_parse(context: impl Into<String>) -> Self {
        Self::KeyParse {
            context: context.into(),
        }
    }

    /// Creates a `Kem` error.
    pub fn kem(reason: impl Into<String>) -> Self {
        Self::Kem {
            reason: reason.into(),
        }
    }

    /// Creates an `Encryption` error.
    pub fn encryption(context: impl Into<String>) -> Self {
        Self::Encryption {
            context: context.into(),
        }
    }

    /// Creates a `MalformedMessage` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Creates a `MessageTooShort` error.
    #[must_use]
    pub const fn too_short(expected: usize, actual: usize) -> Self {
        Self::MessageTooShort { expected, actual }
    }

    /// Creates a `RecordDecode` error.
    pub fn record_decode(context: impl Into<String>) -> Self {
        Self::RecordDecode {
            context: context.into(),
        }
    }

    /// Returns `true` if this error must abort the reconnect loop.
    ///
    /// Non-recoverable errors indicate a peer that will keep failing
    /// the same way: identity mismatch, protocol violation, or a
    /// negotiation dead end. `VersionRejected` is recoverable only in
    /// the sense that the client may retry with a different version;
    /// the reconnect driver special-cases it.
    #[must_use]
    pub const fn is_non_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SignatureVerification
                | Self::PinMismatch
                | Self::MalformedMessage { .. }
                | Self::MessageTooShort { .. }
                | Self::RecordDecode { .. }
                | Self::UnsupportedVersion { .. }
                | Self::PlaintextRefused
                | Self::UnexpectedFrame { .. }
                | Self::KeyParse { .. }
        )
    }
}

// ============================================
// Tests
// ============================================
