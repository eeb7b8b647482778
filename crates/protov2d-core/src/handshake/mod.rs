// ============================================
// File: crates/protov2d-core/src/handshake/mod.rs
// ============================================
//! # Handshake Engine
//!
//! ## Creation Reason
//! Implements the per-connection handshake state machines for both
//! protocol versions: negotiation of the key stack, verification of
//! the server's root identity against pinned material, and the
//! client's proof of session-key possession.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`pin`]: client-side public-key pin sets
//! - [`server`]: server-side state machine
//! - [`client`]: client-side state machine
//!
//! ## Handshake Flow (v2 encrypted)
//! ```text
//! Client                                             Server
//!   │  0x02 msgpack[1, ver, supported, mode] ───────►  │
//!   │                                                  │
//!   │  ◄── 0x02 0x02 0x01 x25519Pub ∥ kyberPub         │
//!   │        ∥ sigClassic ∥ sigPq ∥ challenge ∥ pin    │
//!   │                                                  │
//!   │  verify sigs, match pin                          │
//!   │  DH + encapsulate ──► kClassic, kPQ              │
//!   │                                                  │
//!   │  0x02 0x03 clientX25519 ∥ kyberCt                │
//!   │    ∥ E_kClassic(E_kPQ(sessionPub ∥ sigs)) ─────► │
//!   │                                                  │
//!   │                      verify session proof        │
//!   │  ◄─────────────────── 0x02 0x04 newSession       │
//! ```
//!
//! Any signature failure, pin mismatch, malformed frame, or frame
//! arriving outside the expected step fails the handshake; no partial
//! state escapes the engine.
//!
//! ## Last Modified
//! v0.1.0 - Initial handshake engine

pub mod client;
pub mod pin;
pub mod server;

pub use client::{ClientHandshake, ClientHandshakeResult, ClientStep};
pub use pin::{PinEntry, PinSet};
pub use server::{ServerHandshake, ServerStep};

use crate::crypto::aead::{aes_encrypt, KeyStack};
use crate::crypto::{sha512, ED25519_PUBLIC_KEY_SIZE};
use crate::error::{CoreError, Result};
use crate::protocol::records::{encode_record, V1Established};
use crate::protocol::version::PROTOCOL_V1;
use crate::protocol::{ChannelTag, HS_ESTABLISHED};

// ============================================
// Session Identity
// ============================================

/// Derives the session ID from a session public key.
///
/// v2 identifies a session by the full hybrid key; v1 predates the
/// hybrid identity and uses only the Dilithium half. The wire always
/// carries the full key so both proof signatures stay verifiable.
#[must_use]
pub fn session_id_for(session_public: &[u8], version: u8) -> String {
    if version == PROTOCOL_V1 && session_public.len() > ED25519_PUBLIC_KEY_SIZE {
        hex::encode(&session_public[ED25519_PUBLIC_KEY_SIZE..])
    } else {
        hex::encode(session_public)
    }
}

// ============================================
// v1 Challenge
// ============================================

/// Computes the v1 proof challenge from the server's nonce string.
///
/// The construction is `SHA-512(SHA-512("") ∥ SHA-512(nonce))`; the
/// empty-string inner hash is part of the fixed legacy format and
/// must be preserved exactly.
#[must_use]
pub fn v1_challenge(nonce: &str) -> [u8; 64] {
    let mut buf = Vec::with_capacity(128);
    buf.extend_from_slice(&sha512(b""));
    buf.extend_from_slice(&sha512(nonce.as_bytes()));
    sha512(&buf)
}

// ============================================
// HandshakeResult
// ============================================

/// Outcome of a completed server-side handshake, handed to the
/// session layer so it can create or resume the session and send the
/// establishment confirmation.
#[derive(Debug)]
pub struct HandshakeResult {
    /// The client's full session public key (2624 bytes).
    pub session_public: Vec<u8>,
    /// Session ID derived from the session public key.
    pub session_id: String,
    /// Negotiated protocol version.
    pub version: u8,
    /// Derived key stack (empty for plaintext sessions).
    pub key_stack: KeyStack,
}

impl HandshakeResult {
    /// Builds the establishment confirmation frame once the session
    /// table has decided whether this is a fresh session.
    ///
    /// # Errors
    /// Returns `Encryption` if the v1 confirmation cannot be sealed.
    pub fn established_reply(&self, new_session: bool) -> Result<Vec<u8>> {
        if self.version == PROTOCOL_V1 {
            let key = self
                .key_stack
                .keys()
                .first()
                .ok_or_else(|| CoreError::encryption("v1 session missing key"))?;
            let record = encode_record(&V1Established::new(new_session))?;
            let sealed = aes_encrypt(&record, key, false)?;
            let mut out = Vec::with_capacity(1 + sealed.len());
            out.push(ChannelTag::Handshake.as_byte());
            out.extend_from_slice(&sealed);
            Ok(out)
        } else {
            Ok(vec![
                ChannelTag::Handshake.as_byte(),
                HS_ESTABLISHED,
                u8::from(new_session),
            ])
        }
    }
}

// ============================================
// Tests
// ============================================
