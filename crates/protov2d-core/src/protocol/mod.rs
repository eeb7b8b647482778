// ============================================
// File: crates/protov2d-core/src/protocol/mod.rs
// ============================================
//! # Wire Protocol Definitions
//!
//! ## Creation Reason
//! Defines the byte-level contract every ProtoV2d frame follows: the
//! leading channel tag, handshake packet types, and data-plane frame
//! layouts.
//!
//! ## Channel Tags
//! | Tag | Channel |
//! |------|----------------|
//! | 0x02 | Handshake |
//! | 0x03 | Data |
//! | 0x04 | Ping |
//! | 0x05 | Graceful close |
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every multi-byte integer on the wire is big-endian
//! - These values are cross-implementation contracts; never renumber
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod frame;
pub mod records;
pub mod version;

pub use frame::DataFrame;

// ============================================
// ChannelTag
// ============================================

/// Leading byte of every wire frame, selecting its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelTag {
    /// Handshake control traffic.
    Handshake = 0x02,
    /// Encrypted (or plaintext-session) data frames.
    Data = 0x03,
    /// Keepalive ping/pong.
    Ping = 0x04,
    /// Graceful session close.
    Close = 0x05,
}

impl ChannelTag {
    /// Converts a byte to a channel tag.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x02 => Some(Self::Handshake),
            0x03 => Some(Self::Data),
            0x04 => Some(Self::Ping),
            0x05 => Some(Self::Close),
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
// Handshake Packet Bytes (v2)
// ============================================

/// Second byte of a v2 server handshake response.
pub const HS_SERVER_RESPONSE: u8 = 0x02;

/// Second byte of a v2 client completion packet.
pub const HS_CLIENT_COMPLETE: u8 = 0x03;

/// Second byte of the v2 session-established packet.
pub const HS_ESTABLISHED: u8 = 0x04;

/// Server response mode: encrypted key exchange material follows.
pub const RESPONSE_ENCRYPTED: u8 = 0x01;

/// Server response mode: unencrypted session, challenge only.
pub const RESPONSE_PLAINTEXT: u8 = 0x02;

/// Server response mode: plaintext refused by configuration.
pub const RESPONSE_PLAINTEXT_REFUSED: u8 = 0x03;

/// Server response mode: requested version rejected, supported list
/// follows as MessagePack.
pub const RESPONSE_VERSION_REJECT: u8 = 0x04;

// ============================================
// Ping Subtypes
// ============================================

/// Ping request subtype byte.
pub const PING_REQUEST: u8 = 0x00;

/// Ping reply subtype byte.
pub const PING_REPLY: u8 = 0x01;

/// Size of the ping nonce in bytes.
pub const PING_NONCE_SIZE: usize = 16;

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_tag_roundtrip() {
        for tag in [
            ChannelTag::Handshake,
            ChannelTag::Data,
            ChannelTag::Ping,
            ChannelTag::Close,
        ] {
            assert_eq!(ChannelTag::from_byte(tag.as_byte()), Some(tag));
        }
    }

    #[test]
    fn test_unknown_tags_rejected() {
        assert_eq!(ChannelTag::from_byte(0x00), None);
        assert_eq!(ChannelTag::from_byte(0x01), None);
        assert_eq!(ChannelTag::from_byte(0x06), None);
        assert_eq!(ChannelTag::from_byte(0xFF), None);
    }
}
