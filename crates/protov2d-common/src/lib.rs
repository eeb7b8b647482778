// ============================================
// File: crates/protov2d-common/src/lib.rs
// ============================================
//! # ProtoV2d Common - Shared Foundation Layer
//!
//! ## Creation Reason
//! Provides the foundational pieces shared by every ProtoV2d crate:
//! the base error type, byte-stream utilities, and proxy-chain IP
//! resolution.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`error`]: Base error enum and `Result` alias
//! - [`bytes`]: Hex serialization and length-prefixed concatenation
//! - [`net`]: Trusted-proxy CIDR handling and real-IP resolution
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              protov2d-node                          │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │   protov2d-core       protov2d-transport           │
//! │         │                     │                    │
//! │         └──────────┬──────────┘                    │
//! │                    ▼                               │
//! │             protov2d-common                        │
//! │             You are here ◄──                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Keep this crate dependency-light; everything depends on it
//! - Hex output is always lowercase with no delimiters (wire contract)
//! - Never include key material in error messages
//!
//! ## Last Modified
//! v0.1.0 - Initial foundation layer

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bytes;
pub mod error;
pub mod net;

pub use error::{CommonError, Result};
pub use net::TrustedProxies;
