// ============================================
// File: crates/protov2d-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines error types specific to frame-carrier operations: connect
//! failures, oversized frames, and writes against closed transports.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Transport errors are transient by nature; the session layer
//!   treats them as recoverable and waits for a resume
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use protov2d_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Frame-carrier error types.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to establish a connection.
    #[error("Failed to connect to {addr}: {reason}")]
    ConnectFailed {
        /// Address we tried to reach
        addr: String,
        /// Why the connection failed
        reason: String,
    },

    /// The transport is closed; no further sends are possible.
    #[error("Transport closed")]
    Closed,

    /// Send operation failed.
    #[error("Failed to send frame: {reason}")]
    SendFailed {
        /// Why the send failed
        reason: String,
    },

    /// A frame exceeded the maximum allowed size.
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Offending frame size
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Error from the common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    /// Creates a `ConnectFailed` error.
    pub fn connect_failed(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `SendFailed` error.
    pub fn send_failed(reason: impl Into<String>) -> Self {
        Self::SendFailed {
            reason: reason.into(),
        }
    }
}

// ============================================
// Tests
// ============================================
