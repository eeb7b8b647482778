// ============================================
// File: crates/protov2d-core/src/protocol/frame.rs
// ============================================
//! # Data-Plane Frame Layouts
//!
//! ## Creation Reason
//! Encodes and decodes the post-handshake frame bodies: the QoS-tagged
//! data payloads that travel inside the key-stack envelope, and the
//! ping frames that travel bare.
//!
//! ## Data Body Layout (inside the AES envelope)
//! ```text
//! QoS 0:  ┌──────┬─────────────────┐
//!         │ 0x00 │ payload          │
//!         └──────┴─────────────────┘
//! QoS 1:  ┌──────┬────────────┬──────┬─────────┐
//!         │ 0x01 │ dupID (4BE)│ ctrl │ payload │
//!         └──────┴────────────┴──────┴─────────┘
//! ```
//! `ctrl` is `0x00` for a first send, `0x01` for a retransmission,
//! `0xFF` for an acknowledgement (no payload follows).
//!
//! ## Ping Frame Layout (bare on the wire)
//! ```text
//! ┌──────┬─────────┬────────────┐
//! │ 0x04 │ subtype │ nonce (16) │
//! └──────┴─────────┴────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Duplicate IDs are big-endian; the low bit is the minting side
//! - These decoders see attacker-reachable bytes; validate lengths
//!
//! ## Last Modified
//! v0.1.0 - Initial frame layouts

use bytes::Bytes;

use super::{ChannelTag, PING_NONCE_SIZE, PING_REPLY, PING_REQUEST};
use crate::error::{CoreError, Result};

// ============================================
// QoS and Control Bytes
// ============================================

/// QoS byte: fire-and-forget.
pub const QOS_0: u8 = 0x00;

/// QoS byte: acknowledged at-least-once delivery.
pub const QOS_1: u8 = 0x01;

/// Control byte: first transmission.
pub const CTRL_FIRST: u8 = 0x00;

/// Control byte: retransmission.
pub const CTRL_RETRANSMIT: u8 = 0x01;

/// Control byte: acknowledgement.
pub const CTRL_ACK: u8 = 0xFF;

// ============================================
// DataFrame
// ============================================

/// A decoded data-plane frame body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataFrame {
    /// QoS-0 payload: delivered once, never acknowledged.
    Fire {
        /// Opaque application payload.
        payload: Bytes,
    },
    /// QoS-1 payload: acknowledged and retried until confirmed.
    Reliable {
        /// Per-session, per-direction duplicate ID.
        dup_id: u32,
        /// `true` when this is a retransmission.
        retransmit: bool,
        /// Opaque application payload.
        payload: Bytes,
    },
    /// QoS-1 acknowledgement for a received payload.
    Ack {
        /// Duplicate ID being acknowledged.
        dup_id: u32,
    },
}

impl DataFrame {
    /// Encodes the frame body (the plaintext that goes into the key
    /// stack; the `0x03` channel tag is added after sealing).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Fire { payload } => {
                let mut out = Vec::with_capacity(1 + payload.len());
                out.push(QOS_0);
                out.extend_from_slice(payload);
                out
            }
            Self::Reliable {
                dup_id,
                retransmit,
                payload,
            } => {
                let mut out = Vec::with_capacity(6 + payload.len());
                out.push(QOS_1);
                out.extend_from_slice(&dup_id.to_be_bytes());
                out.push(if *retransmit { CTRL_RETRANSMIT } else { CTRL_FIRST });
                out.extend_from_slice(payload);
                out
            }
            Self::Ack { dup_id } => {
                let mut out = Vec::with_capacity(6);
                out.push(QOS_1);
                out.extend_from_slice(&dup_id.to_be_bytes());
                out.push(CTRL_ACK);
                out
            }
        }
    }

    /// Decodes a frame body.
    ///
    /// # Errors
    /// Returns `MalformedMessage`/`MessageTooShort` on an unknown QoS
    /// byte, unknown control byte, or truncated header.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let (&qos, rest) = body
            .split_first()
            .ok_or(CoreError::too_short(1, 0))?;

        match qos {
            QOS_0 => Ok(Self::Fire {
                payload: Bytes::copy_from_slice(rest),
            }),
            QOS_1 => {
                if rest.len() < 5 {
                    return Err(CoreError::too_short(6, body.len()));
                }
                let mut id_bytes = [0u8; 4];
                id_bytes.copy_from_slice(&rest[..4]);
                let dup_id = u32::from_be_bytes(id_bytes);
                let ctrl = rest[4];
                let payload = &rest[5..];

                match ctrl {
                    CTRL_FIRST | CTRL_RETRANSMIT => Ok(Self::Reliable {
                        dup_id,
                        retransmit: ctrl == CTRL_RETRANSMIT,
                        payload: Bytes::copy_from_slice(payload),
                    }),
                    CTRL_ACK => {
                        if !payload.is_empty() {
                            return Err(CoreError::malformed("ack frame carries payload"));
                        }
                        Ok(Self::Ack { dup_id })
                    }
                    other => Err(CoreError::malformed(format!(
                        "unknown QoS-1 control byte 0x{other:02x}"
                    ))),
                }
            }
            other => Err(CoreError::malformed(format!("unknown QoS byte 0x{other:02x}"))),
        }
    }
}

// ============================================
// Duplicate-ID Minting
// ============================================

/// Mints a duplicate ID from a 31-bit counter value and the minting
/// side. Client-minted IDs have low bit 0, server-minted low bit 1,
/// keeping the two namespaces disjoint on the wire.
#[must_use]
pub const fn mint_dup_id(counter: u32, client_side: bool) -> u32 {
    ((counter & 0x7FFF_FFFF) << 1) | if client_side { 0 } else { 1 }
}

/// Returns `true` if the given duplicate ID was minted by a client.
#[must_use]
pub const fn dup_id_from_client(dup_id: u32) -> bool {
    dup_id & 1 == 0
}

// ============================================
// Ping Frames
// ============================================

/// Encodes a full ping frame, channel tag included.
#[must_use]
pub fn encode_ping(reply: bool, nonce: &[u8; PING_NONCE_SIZE]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + PING_NONCE_SIZE);
    out.push(ChannelTag::Ping.as_byte());
    out.push(if reply { PING_REPLY } else { PING_REQUEST });
    out.extend_from_slice(nonce);
    out
}

/// Decodes a ping frame body (bytes after the channel tag).
///
/// Returns `(is_reply, nonce)`.
///
/// # Errors
/// Returns `MalformedMessage`/`MessageTooShort` on bad subtype or
/// length.
pub fn decode_ping(body: &[u8]) -> Result<(bool, [u8; PING_NONCE_SIZE])> {
    if body.len() != 1 + PING_NONCE_SIZE {
        return Err(CoreError::too_short(1 + PING_NONCE_SIZE, body.len()));
    }
    let reply = match body[0] {
        PING_REQUEST => false,
        PING_REPLY => true,
        other => {
            return Err(CoreError::malformed(format!(
                "unknown ping subtype 0x{other:02x}"
            )))
        }
    };
    let mut nonce = [0u8; PING_NONCE_SIZE];
    nonce.copy_from_slice(&body[1..]);
    Ok((reply, nonce))
}

// ============================================
// Tests
// ============================================
