// ============================================
// File: crates/protov2d-core/src/lib.rs
// ============================================
//! # ProtoV2d Core - Protocol & Cryptography Library
//!
//! ## Creation Reason
//! Provides the protocol definitions, hybrid post-quantum cryptography,
//! and the two-version handshake engine for the ProtoV2d resumable
//! tunnel. This crate is the security backbone of the system.
//!
//! ## Main Functionality
//!
//! ### Crypto Module ([`crypto`])
//! - Hybrid identity keys (`Ed25519 ∥ Dilithium-5`)
//! - Key exchange (X25519 + Kyber-1024 KEM)
//! - Layered AES-256-GCM encryption with optional integrity digest
//!
//! ### Protocol Module ([`protocol`])
//! - Channel tags and data-plane frame layouts
//! - MessagePack handshake control records
//! - Protocol version negotiation
//!
//! ### Handshake Module ([`handshake`])
//! - Server and client per-connection state machines
//! - Public-key pin sets and identity verification
//!
//! ## Security Guarantees
//! - **Confidentiality**: nested AES-256-GCM under both KEX secrets
//! - **Authenticity**: hybrid Ed25519 + Dilithium-5 signatures
//! - **Quantum resistance**: Kyber-1024 KEM alongside classical DH
//! - **Session proof**: client proves possession of its session key
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL cryptographic code uses audited implementations (RustCrypto,
//!   dalek, PQClean bindings); NEVER implement primitives here
//! - Keys are never logged at any level
//! - Wire layouts are byte-exact contracts; do not reorder fields
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod error;
pub mod handshake;
pub mod protocol;

pub use crypto::{AesKey, IdentityKeyPair, IdentityPublicKey, KeyStack};
pub use error::{CoreError, Result};
pub use handshake::{
    ClientHandshake, ClientStep, HandshakeResult, PinEntry, PinSet, ServerHandshake, ServerStep,
};
pub use protocol::version::{PROTOCOL_V1, PROTOCOL_V2};
