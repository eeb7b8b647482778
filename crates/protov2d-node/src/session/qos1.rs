// ============================================
// File: crates/protov2d-node/src/session/qos1.rs
// ============================================
//! # QoS-1 Reliable Delivery
//!
//! ## Creation Reason
//! Implements the acknowledged delivery tier: duplicate-ID minting,
//! the outbox that survives transport swaps, and the retransmission
//! loop behind every reliable send.
//!
//! ## Send Algorithm
//! ```text
//! mint dupID, buffer payload, mark awaiting
//! loop:
//!   wait until the session may transmit
//!   write frame (ctrl marks retransmissions)
//!   wait up to ack_timeout for the ack
//!   acked? -> done        timeout? -> retransmit
//! mark acknowledged, settle the caller
//! ```
//! The dupID is minted once and reused across every retransmission
//! and transport swap; the receiver dedupes on it alone. A send
//! settles with an error only when the session is destroyed.
//!
//! ## Last Modified
//! v0.1.0 - Initial QoS-1 implementation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::trace;

use protov2d_core::protocol::frame::{mint_dup_id, DataFrame};

use super::SessionInner;
use crate::error::{NodeError, Result};

// ============================================
// State
// ============================================

/// Outcome delivered to a waiting retransmission loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckOutcome {
    /// The peer acknowledged the dupID.
    Acked,
    /// The session closed; stop retrying.
    Aborted,
}

/// An outbox slot for one minted dupID.
#[derive(Debug, Clone)]
pub(crate) enum OutboxEntry {
    /// Buffered payload awaiting acknowledgement.
    Pending(Bytes),
    /// Acknowledged; retained as a tombstone for the dupID.
    Acknowledged,
}

/// Per-session QoS-1 bookkeeping, touched only under the session
/// mutex.
#[derive(Default)]
pub(crate) struct Qos1State {
    /// dupID -> payload or acknowledged marker.
    pub(crate) outbox: HashMap<u32, OutboxEntry>,
    /// dupIDs currently in flight.
    pub(crate) awaiting: HashSet<u32>,
    /// dupID -> resolver for the active retransmission wait.
    pub(crate) resolvers: HashMap<u32, oneshot::Sender<AckOutcome>>,
    /// Monotonic 31-bit counter behind dupID minting.
    pub(crate) counter: u32,
    /// Remote dupIDs already delivered to the application.
    pub(crate) delivered: HashSet<u32>,
}

impl Qos1State {
    fn mint(&mut self, client_side: bool) -> u32 {
        let dup_id = mint_dup_id(self.counter, client_side);
        self.counter = (self.counter + 1) & 0x7FFF_FFFF;
        dup_id
    }
}

// ============================================
// Send Path
// ============================================

/// Sends one payload with acknowledged delivery, settling when the
/// peer confirms it.
pub(crate) async fn send_reliable(inner: &Arc<SessionInner>, payload: Bytes) -> Result<()> {
    if inner.is_closed() {
        return Err(NodeError::SessionClosed);
    }

    let client_side = inner.client_side;
    let dup_id = {
        let mut qos1 = inner.qos1.lock();
        let dup_id = qos1.mint(client_side);
        qos1.outbox.insert(dup_id, OutboxEntry::Pending(payload.clone()));
        qos1.awaiting.insert(dup_id);
        dup_id
    };

    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(run_delivery(Arc::clone(inner), dup_id, payload, done_tx));

    match done_rx.await {
        Ok(result) => result,
        Err(_) => Err(NodeError::SessionClosed),
    }
}

/// The retransmission loop for one dupID. Detached from the caller so
/// delivery continues even if the caller's future is dropped.
async fn run_delivery(
    inner: Arc<SessionInner>,
    dup_id: u32,
    payload: Bytes,
    done: oneshot::Sender<Result<()>>,
) {
    let mut retransmit = false;

    let result = loop {
        if let Err(e) = wait_ready(&inner).await {
            break Err(e);
        }

        let body = DataFrame::Reliable {
            dup_id,
            retransmit,
            payload: payload.clone(),
        }
        .encode();

        let (ack_tx, ack_rx) = oneshot::channel();
        inner.qos1.lock().resolvers.insert(dup_id, ack_tx);

        if let Err(e) = inner.transmit_data(&body).await {
            // The transport flapped under us; the ack wait below
            // times out and the loop re-enters through wait_ready.
            trace!(dup_id, error = %e, "reliable write failed");
        } else {
            trace!(dup_id, retransmit, "reliable frame written");
        }

        match tokio::time::timeout(inner.config.ack_timeout, ack_rx).await {
            Ok(Ok(AckOutcome::Acked)) => break Ok(()),
            Ok(Ok(AckOutcome::Aborted)) | Ok(Err(_)) => break Err(NodeError::SessionClosed),
            Err(_elapsed) => {
                inner.qos1.lock().resolvers.remove(&dup_id);
                retransmit = true;
            }
        }
    };

    if result.is_ok() {
        let mut qos1 = inner.qos1.lock();
        qos1.awaiting.remove(&dup_id);
        qos1.outbox.insert(dup_id, OutboxEntry::Acknowledged);
        trace!(dup_id, "reliable send acknowledged");
    }

    let _ = done.send(result);
}

/// Blocks until the session may transmit, or fails once it closes.
async fn wait_ready(inner: &SessionInner) -> Result<()> {
    let mut ready = inner.subscribe_ready();
    loop {
        if inner.is_closed() {
            return Err(NodeError::SessionClosed);
        }
        if *ready.borrow_and_update() {
            return Ok(());
        }
        if ready.changed().await.is_err() {
            return Err(NodeError::SessionClosed);
        }
    }
}
