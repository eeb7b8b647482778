// ============================================
// File: crates/protov2d-node/src/error.rs
// ============================================
//! # Node Error Types
//!
//! ## Creation Reason
//! Wraps the lower-layer error types and adds the session-layer
//! failures. The recoverable/non-recoverable split drives the client
//! reconnect loop: recoverable errors retry after `reconnection_time`,
//! non-recoverable ones abort it.
//!
//! ## ⚠️ Important Note for Next Developer
//! - QoS-1 sends never fail on transient disconnects; they settle
//!   with `SessionClosed` only on definitive session teardown
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use protov2d_common::error::CommonError;
use protov2d_core::error::CoreError;
use protov2d_transport::error::TransportError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

// ============================================
// NodeError
// ============================================

/// Session-layer error types.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Handshake or protocol failure from the core.
    #[error(transparent)]
    Handshake(#[from] CoreError),

    /// Frame-carrier failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Error from the common crate.
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Invalid configuration.
    #[error("Invalid configuration: {reason}")]
    Config {
        /// What's wrong with the configuration
        reason: String,
    },

    /// The session has been destroyed; pending operations settle with
    /// this error.
    #[error("Session closed")]
    SessionClosed,

    /// No transport is currently attached.
    #[error("Session not connected")]
    NotConnected,

    /// The transport closed mid-handshake.
    #[error("Transport closed during handshake")]
    HandshakeAborted,

    /// The handshake did not finish within the allowed time.
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// The initial connect loop ran out of attempts.
    #[error("Connection failed after {attempts} attempts")]
    ConnectExhausted {
        /// Number of attempts made
        attempts: u32,
    },
}

impl NodeError {
    /// Creates a `Config` error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the reconnect loop may retry after this
    /// error.
    ///
    /// Transport loss and timeouts retry; identity and protocol
    /// violations do not. A `VersionRejected` handshake error is
    /// handled specially by the connect driver (possible v1 fallback)
    /// before this classification applies.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Handshake(e) => !e.is_non_recoverable(),
            Self::Transport(_) | Self::HandshakeAborted | Self::HandshakeTimeout
            | Self::NotConnected => true,
            Self::Common(e) => e.is_retryable(),
            Self::Config { .. } | Self::SessionClosed | Self::ConnectExhausted { .. } => false,
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(NodeError::HandshakeAborted.is_recoverable());
        assert!(NodeError::HandshakeTimeout.is_recoverable());
        assert!(NodeError::from(TransportError::Closed).is_recoverable());
        assert!(NodeError::from(CoreError::Decryption).is_recoverable());

        assert!(!NodeError::from(CoreError::PinMismatch).is_recoverable());
        assert!(!NodeError::from(CoreError::SignatureVerification).is_recoverable());
        assert!(!NodeError::SessionClosed.is_recoverable());
        assert!(!NodeError::config("bad key").is_recoverable());
    }
}
