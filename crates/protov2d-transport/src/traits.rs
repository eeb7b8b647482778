// ============================================
// File: crates/protov2d-transport/src/traits.rs
// ============================================
//! # Frame Transport Contract
//!
//! ## Creation Reason
//! Abstracts the underlying byte-frame carrier (WebSocket, TCP,
//! in-memory pair) into the three signals the session layer consumes:
//! received frames, outbound writes, and a single close notification.
//!
//! ## Adapter Contract
//! - Each carrier frame surfaces as one `Frame` event with the exact
//!   payload bytes
//! - `Closed { explicit, reason }` is emitted exactly once per logical
//!   close; duplicate carrier notifications are swallowed
//! - `send` after close fails with `TransportError::Closed`
//! - Writes go out in call order; backpressure is the carrier's
//!   business
//!
//! The session holds the transport through an `Arc` with no
//! back-pointer from transport to session; dropping the session's
//! handle is enough to sever the pair.
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

// ============================================
// TransportEvent
// ============================================

/// One observable event from a frame transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A frame arrived with exactly these payload bytes.
    Frame(Bytes),
    /// The transport closed. Emitted once per logical close.
    Closed {
        /// `true` for a deliberate close (local call or peer
        /// shutdown), `false` for carrier loss.
        explicit: bool,
        /// Human-readable close reason, if one was given.
        reason: Option<String>,
    },
}

// ============================================
// FrameTransport
// ============================================

/// A reliable, ordered, bidirectional frame carrier.
///
/// # Thread Safety
/// Implementations are `Send + Sync`; the session layer calls `send`
/// and `close` from multiple tasks while a single reader drives
/// `recv`.
#[async_trait]
pub trait FrameTransport: Send + Sync {
    /// Writes one frame to the carrier.
    ///
    /// # Errors
    /// Returns `Closed` if the transport has closed, or a send error
    /// from the carrier.
    async fn send(&self, frame: Bytes) -> Result<()>;

    /// Waits for the next event.
    ///
    /// After the close event has been delivered, further calls keep
    /// returning a `Closed` event with the same values.
    async fn recv(&self) -> TransportEvent;

    /// Closes the transport.
    ///
    /// Idempotent: the first call wins and fixes the `(explicit,
    /// reason)` pair observed by the reader; later calls are no-ops.
    async fn close(&self, explicit: bool, reason: Option<String>);

    /// Returns `true` once the transport has closed.
    fn is_closed(&self) -> bool;
}
