// ============================================
// File: crates/protov2d-node/src/session/ping.rs
// ============================================
//! # Keepalive Clock
//!
//! ## Creation Reason
//! Each side pings the other on an interval with a fresh 16-byte
//! nonce. A missed pong closes the transport non-explicitly; the
//! session survives and awaits resume. RTT samples feed a small ring
//! buffer exposing instantaneous and average ping.
//!
//! ## Clock Restart
//! A new clock task is spawned per attached transport. The client
//! pings as soon as it may transmit; the server waits for the first
//! client ping before its clock starts, which also re-arms QoS-1
//! retransmissions on that side.
//!
//! ## Last Modified
//! v0.1.0 - Initial keepalive implementation

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use protov2d_core::crypto::random_array;
use protov2d_core::protocol::frame::encode_ping;
use protov2d_core::protocol::PING_NONCE_SIZE;
use protov2d_transport::FrameTransport;

use super::SessionInner;
use crate::events::SessionEvent;

// ============================================
// PingState
// ============================================

/// RTT bookkeeping and outstanding ping nonces.
#[derive(Default)]
pub(crate) struct PingState {
    last: Mutex<Option<Duration>>,
    samples: Mutex<VecDeque<Duration>>,
    pending: Mutex<HashMap<[u8; PING_NONCE_SIZE], oneshot::Sender<()>>>,
}

impl PingState {
    /// Last measured RTT.
    pub(crate) fn last(&self) -> Option<Duration> {
        *self.last.lock()
    }

    /// Average over the ring buffer.
    pub(crate) fn average(&self) -> Option<Duration> {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return None;
        }
        let total: Duration = samples.iter().sum();
        Some(total / samples.len() as u32)
    }

    fn record(&self, rtt: Duration, capacity: usize) {
        *self.last.lock() = Some(rtt);
        let mut samples = self.samples.lock();
        if samples.len() >= capacity.max(1) {
            samples.pop_front();
        }
        samples.push_back(rtt);
    }

    fn register(&self, nonce: [u8; PING_NONCE_SIZE]) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(nonce, tx);
        rx
    }

    fn forget(&self, nonce: &[u8; PING_NONCE_SIZE]) {
        self.pending.lock().remove(nonce);
    }

    /// Resolves a pong by nonce; unknown nonces are ignored.
    pub(crate) fn resolve(&self, nonce: &[u8; PING_NONCE_SIZE]) {
        if let Some(tx) = self.pending.lock().remove(nonce) {
            let _ = tx.send(());
        }
    }

    /// Drops all outstanding waiters (session teardown).
    pub(crate) fn clear(&self) {
        self.pending.lock().clear();
    }
}

// ============================================
// Clock Task
// ============================================

/// Keepalive loop for one attached transport. Exits when the
/// transport dies, the session closes, or a swap makes it stale.
pub(crate) async fn ping_loop(
    inner: Arc<SessionInner>,
    transport: Arc<dyn FrameTransport>,
    epoch: u64,
) {
    let mut ready = inner.subscribe_ready();
    loop {
        if stale(&inner, &transport, epoch) {
            return;
        }

        // Hold fire until the session may transmit on this transport.
        while !*ready.borrow_and_update() {
            if ready.changed().await.is_err() || stale(&inner, &transport, epoch) {
                return;
            }
        }

        let nonce: [u8; PING_NONCE_SIZE] = random_array();
        let pong = inner.ping.register(nonce);
        let started = Instant::now();

        if transport
            .send(Bytes::from(encode_ping(false, &nonce)))
            .await
            .is_err()
        {
            inner.ping.forget(&nonce);
            return;
        }

        match tokio::time::timeout(inner.config.ping_timeout, pong).await {
            Ok(Ok(())) => {
                let rtt = started.elapsed();
                inner.ping.record(rtt, inner.config.avg_ping_count);
                inner.emit(SessionEvent::Ping(rtt));
                trace!(session_id = %inner.session_id, rtt_ms = rtt.as_millis() as u64, "pong");
            }
            _ => {
                inner.ping.forget(&nonce);
                if !stale(&inner, &transport, epoch) {
                    debug!(session_id = %inner.session_id, "ping timeout, dropping transport");
                    transport.close(false, Some("ping timeout".into())).await;
                }
                return;
            }
        }

        tokio::time::sleep(inner.config.ping_interval).await;
    }
}

fn stale(inner: &SessionInner, transport: &Arc<dyn FrameTransport>, epoch: u64) -> bool {
    inner.is_closed() || transport.is_closed() || inner.current_epoch() != epoch
}
