// ============================================
// File: crates/protov2d-transport/src/memory.rs
// ============================================
//! # In-Memory Transport Pairs
//!
//! ## Creation Reason
//! Embedders may inject transports directly instead of binding a
//! listener, and the integration tests need a carrier they can sever
//! on demand. A memory pair is two linked adapters whose frames cross
//! over unbounded channels; closing either half closes the link for
//! both, with one shared `(explicit, reason)` pair.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Frames already queued when the link closes still deliver, then
//!   the close surfaces, matching kernel socket semantics
//! - `close(false, ..)` models carrier loss; the session layer then
//!   waits for a resume
//!
//! ## Last Modified
//! v0.1.0 - Initial in-memory pair

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch, Mutex};

use crate::error::{Result, TransportError};
use crate::traits::{FrameTransport, TransportEvent};

#[derive(Debug, Clone)]
struct CloseInfo {
    explicit: bool,
    reason: Option<String>,
}

/// Shared close state for both halves of a link.
struct Link {
    state: watch::Sender<Option<CloseInfo>>,
}

// ============================================
// MemoryTransport
// ============================================

/// One half of a linked in-memory transport pair.
pub struct MemoryTransport {
    out: mpsc::UnboundedSender<Bytes>,
    inbox: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    link: Arc<Link>,
}

/// Creates a linked pair of in-memory transports.
///
/// Frames sent on one half arrive on the other. Closing either half
/// closes the link for both.
#[must_use]
pub fn memory_pair() -> (Arc<MemoryTransport>, Arc<MemoryTransport>) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    let (state, _) = watch::channel(None);
    let link = Arc::new(Link { state });

    let a = Arc::new(MemoryTransport {
        out: b_tx,
        inbox: Mutex::new(a_rx),
        link: Arc::clone(&link),
    });
    let b = Arc::new(MemoryTransport {
        out: a_tx,
        inbox: Mutex::new(b_rx),
        link,
    });
    (a, b)
}

impl MemoryTransport {
    fn close_info(&self) -> Option<CloseInfo> {
        self.link.state.borrow().clone()
    }

    fn mark_closed(&self, explicit: bool, reason: Option<String>) {
        self.link.state.send_if_modified(|state| {
            if state.is_some() {
                false
            } else {
                *state = Some(CloseInfo { explicit, reason });
                true
            }
        });
    }
}

#[async_trait]
impl FrameTransport for MemoryTransport {
    async fn send(&self, frame: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.out.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> TransportEvent {
        let mut inbox = self.inbox.lock().await;
        let mut state = self.link.state.subscribe();
        loop {
            // Frames already on the wire win over the close, like a
            // kernel socket buffer draining before EOF.
            if let Ok(frame) = inbox.try_recv() {
                return TransportEvent::Frame(frame);
            }
            if let Some(info) = state.borrow_and_update().clone() {
                return TransportEvent::Closed {
                    explicit: info.explicit,
                    reason: info.reason,
                };
            }
            tokio::select! {
                frame = inbox.recv() => match frame {
                    Some(frame) => return TransportEvent::Frame(frame),
                    None => {
                        self.mark_closed(false, None);
                    }
                },
                changed = state.changed() => {
                    if changed.is_err() {
                        return TransportEvent::Closed { explicit: false, reason: None };
                    }
                }
            }
        }
    }

    async fn close(&self, explicit: bool, reason: Option<String>) {
        self.mark_closed(explicit, reason);
    }

    fn is_closed(&self) -> bool {
        self.close_info().is_some()
    }
}

// ============================================
// Tests
// ============================================
