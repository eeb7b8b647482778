// ============================================
// File: crates/protov2d-node/src/events.rs
// ============================================
//! # Session and Server Events
//!
//! ## Creation Reason
//! The user-visible surface of a session is a typed event stream over
//! a channel, not string-keyed callbacks: the application consumes a
//! receiver per session and one per server.
//!
//! ## Event Ordering
//! Within one session, events are delivered in the order the session
//! task produced them: `Connected` always precedes `Data`,
//! `ResumeFailed` (when emitted) precedes the `Connected` of the
//! replacement handshake, and `Closed` is the final event.
//!
//! ## Last Modified
//! v0.1.0 - Initial event definitions

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::session::Session;

/// Receiver half of a session's event stream.
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

/// Receiver half of a server's event stream.
pub type ServerEvents = mpsc::UnboundedReceiver<ServerEvent>;

// ============================================
// SessionEvent
// ============================================

/// Per-session events, delivered in order.
#[derive(Debug)]
pub enum SessionEvent {
    /// An application payload arrived (QoS-0 or first delivery of a
    /// QoS-1 payload; duplicates are suppressed).
    Data(Bytes),
    /// A transport is attached and the session is live.
    Connected,
    /// The transport was lost; the session is awaiting resume.
    Disconnected,
    /// A reconnect handshake succeeded but the server no longer knew
    /// this session; a fresh one was created in its place.
    ResumeFailed,
    /// A keepalive round-trip completed with this RTT.
    Ping(Duration),
    /// The session is destroyed. Final event.
    Closed,
    /// The session ended deliberately: a graceful-close frame arrived
    /// or the local side closed. Emitted just before `Closed`.
    FinalClose,
}

// ============================================
// ServerEvent
// ============================================

/// Server-level events.
pub enum ServerEvent {
    /// A fresh session completed its first handshake. Resumed
    /// sessions do not reappear here; they emit `Connected` on their
    /// existing stream.
    Connection {
        /// Handle to the new session.
        session: Session,
        /// The session's event stream, owned by the application from
        /// here on.
        events: SessionEvents,
    },
    /// A disconnected session outlived the reconnect window and was
    /// dropped from the session table.
    DropConnection(String),
}

impl std::fmt::Debug for ServerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection { session, .. } => f
                .debug_struct("Connection")
                .field("session_id", &session.id())
                .finish_non_exhaustive(),
            Self::DropConnection(id) => f.debug_tuple("DropConnection").field(id).finish(),
        }
    }
}
