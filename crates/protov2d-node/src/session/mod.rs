// ============================================
// File: crates/protov2d-node/src/session/mod.rs
// ============================================
//! # Session & Reliability Layer
//!
//! ## Creation Reason
//! The session is the long-lived object keyed by the client's session
//! public key. Transports come and go; the session owns everything
//! that must survive them: the key stack, the QoS-1 outbox, keepalive
//! state, and the event stream.
//!
//! ## Session Lifecycle
//! ```text
//! ┌──────────┐   handshake    ┌─────────────┐  transport lost
//! │  (none)  │ ─────────────► │  Connected  │ ───────────────┐
//! └──────────┘                └──────▲──────┘                │
//!                                    │ resume                ▼
//!                                    │              ┌──────────────┐
//!                                    └───────────── │ Disconnected │
//!                                                   └──────┬───────┘
//!                        close / graceful frame /          │ window
//!                        reconnect window elapsed          ▼ elapsed
//!                                                   ┌──────────────┐
//!                                                   │    Closed    │
//!                                                   └──────────────┘
//! ```
//!
//! ## Transport Swap
//! The handshake layer attaches a fresh transport on resume. The old
//! one is closed with reason "Replaced by new transport", listeners
//! move over, `Connected` is emitted, the ping clock restarts, and
//! unacknowledged QoS-1 entries retransmit. The server side gates its
//! first ping and retransmissions until the first client ping, so the
//! client's handshake completion is never interleaved with data.
//!
//! ## Concurrency Model
//! One reader task per attached transport serializes all inbound
//! state transitions. Senders and the keepalive clock touch shared
//! state only through short `parking_lot` critical sections; waiting
//! happens on `watch`/`oneshot` channels, never under a lock.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The transport holds no back-pointer to the session; dropping the
//!   session's handle severs the cycle
//! - Acks are sent only after the payload is handed to the
//!   application, preserving at-least-once across receiver crashes
//!
//! ## Last Modified
//! v0.1.0 - Initial session layer

pub(crate) mod ping;
pub(crate) mod qos1;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

use protov2d_core::crypto::KeyStack;
use protov2d_core::protocol::frame::{encode_ping, DataFrame};
use protov2d_core::protocol::version::uses_digest;
use protov2d_core::protocol::ChannelTag;
use protov2d_transport::{FrameTransport, TransportEvent};

use crate::config::SessionConfig;
use crate::error::{NodeError, Result};
use crate::events::{SessionEvent, SessionEvents};

use ping::PingState;
use qos1::{AckOutcome, Qos1State};

// ============================================
// Qos
// ============================================

/// Delivery tier for an outbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    /// QoS 0: fire-and-forget, delivered at most once.
    Fire,
    /// QoS 1: acknowledged, redelivered until confirmed.
    Reliable,
}

// ============================================
// Session
// ============================================

/// Handle to a live session. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    session_id: String,
    client_side: bool,
    version: AtomicU8,
    key_stack: RwLock<KeyStack>,
    transport: RwLock<Option<Arc<dyn FrameTransport>>>,
    /// Bumped on every transport swap; stale reader/ping tasks use it
    /// to tell a replacement apart from a genuine disconnect.
    epoch: AtomicU64,
    closed: AtomicBool,
    /// Whether the explicit flag was set on the last transport close.
    last_close_explicit: AtomicBool,
    connected: watch::Sender<bool>,
    /// Transmission gate: follows `connected` on the client; on the
    /// server it opens only once the first client ping arrives.
    ready: watch::Sender<bool>,
    events: mpsc::UnboundedSender<SessionEvent>,
    pub(crate) qos1: Mutex<Qos1State>,
    pub(crate) ping: PingState,
    pub(crate) config: SessionConfig,
}

impl Session {
    /// Creates a detached session; a transport is attached separately.
    pub(crate) fn new(
        session_id: String,
        client_side: bool,
        config: SessionConfig,
    ) -> (Self, SessionEvents) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (connected, _) = watch::channel(false);
        let (ready, _) = watch::channel(false);
        let inner = Arc::new(SessionInner {
            session_id,
            client_side,
            version: AtomicU8::new(0),
            key_stack: RwLock::new(KeyStack::plaintext()),
            transport: RwLock::new(None),
            epoch: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            last_close_explicit: AtomicBool::new(false),
            connected,
            ready,
            events: events_tx,
            qos1: Mutex::new(Qos1State::default()),
            ping: PingState::default(),
            config,
        });
        (Self { inner }, events_rx)
    }

    // ========================================
    // Introspection
    // ========================================

    /// The session ID (hex of the session public key).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.session_id
    }

    /// `true` on the client side of the tunnel.
    #[must_use]
    pub fn is_client(&self) -> bool {
        self.inner.client_side
    }

    /// Negotiated protocol version of the current/last transport.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.inner.version.load(Ordering::SeqCst)
    }

    /// `true` while a transport is attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// `true` once the session is destroyed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Last measured keepalive RTT.
    #[must_use]
    pub fn last_ping(&self) -> Option<Duration> {
        self.inner.ping.last()
    }

    /// Average over the recent RTT ring buffer.
    #[must_use]
    pub fn average_ping(&self) -> Option<Duration> {
        self.inner.ping.average()
    }

    /// Number of QoS-1 payloads still awaiting acknowledgement.
    #[must_use]
    pub fn pending_reliable(&self) -> usize {
        self.inner.qos1.lock().awaiting.len()
    }

    // ========================================
    // Sending
    // ========================================

    /// Sends an application payload.
    ///
    /// QoS-0 requires a live transport and settles immediately. QoS-1
    /// settles once the peer acknowledges, surviving disconnects and
    /// transport swaps in between; it fails only on definitive
    /// session close.
    ///
    /// # Errors
    /// `NotConnected` for QoS-0 without a transport; `SessionClosed`
    /// when the session is destroyed before the acknowledgement.
    pub async fn send(&self, payload: impl Into<Bytes>, qos: Qos) -> Result<()> {
        let payload = payload.into();
        match qos {
            Qos::Fire => {
                if self.inner.is_closed() {
                    return Err(NodeError::SessionClosed);
                }
                let body = DataFrame::Fire { payload }.encode();
                self.inner.transmit_data(&body).await
            }
            Qos::Reliable => qos1::send_reliable(&self.inner, payload).await,
        }
    }

    /// Gracefully closes the session: notifies the peer with a close
    /// frame when a transport is live, settles pending sends with an
    /// error, and emits `FinalClose` + `Closed`.
    pub async fn close(&self) {
        self.inner.close_session(true, true).await;
    }

    // ========================================
    // Crate-Internal Surface
    // ========================================

    /// Attaches a transport after a completed handshake, replacing
    /// any current one.
    pub(crate) async fn attach(
        &self,
        transport: Arc<dyn FrameTransport>,
        key_stack: KeyStack,
        version: u8,
    ) {
        self.inner.attach(transport, key_stack, version).await;
    }

    /// Closes without notifying the peer (reconnect window elapsed or
    /// non-recoverable reconnect failure).
    pub(crate) async fn expire(&self) {
        self.inner.close_session(false, false).await;
    }

    /// Signals that a resume handshake came back as a fresh session.
    /// The replacement server session mints duplicate IDs from zero,
    /// so the inbound dedupe set must start over with it.
    pub(crate) fn notify_resume_failed(&self) {
        self.inner.qos1.lock().delivered.clear();
        self.inner.emit(SessionEvent::ResumeFailed);
    }

    pub(crate) fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }

    pub(crate) fn last_close_explicit(&self) -> bool {
        self.inner.last_close_explicit.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.inner.session_id)
            .field("client_side", &self.inner.client_side)
            .field("version", &self.version())
            .field("connected", &self.is_connected())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================
// SessionInner
// ============================================

impl SessionInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    fn set_ready(&self, ready: bool) {
        self.ready.send_replace(ready);
    }

    fn current_transport(&self) -> Option<Arc<dyn FrameTransport>> {
        self.transport.read().clone()
    }

    /// Seals a data-plane body under the session's key stack and
    /// writes it to the current transport.
    pub(crate) async fn transmit_data(&self, body: &[u8]) -> Result<()> {
        let transport = self.current_transport().ok_or(NodeError::NotConnected)?;
        let sealed = {
            let stack = self.key_stack.read().clone();
            stack.seal(body, uses_digest(self.version.load(Ordering::SeqCst)))?
        };
        let mut frame = Vec::with_capacity(1 + sealed.len());
        frame.push(ChannelTag::Data.as_byte());
        frame.extend_from_slice(&sealed);
        transport.send(Bytes::from(frame)).await?;
        Ok(())
    }

    // ========================================
    // Transport Swap
    // ========================================

    async fn attach(
        self: &Arc<Self>,
        transport: Arc<dyn FrameTransport>,
        key_stack: KeyStack,
        version: u8,
    ) {
        if self.is_closed() {
            transport.close(true, Some("session closed".into())).await;
            return;
        }

        // Epoch and slot change under one lock so a dying old
        // transport's reader can never mistake itself for current.
        let (old, epoch) = {
            let mut slot = self.transport.write();
            *self.key_stack.write() = key_stack;
            self.version.store(version, Ordering::SeqCst);
            let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            (slot.replace(Arc::clone(&transport)), epoch)
        };

        if let Some(old) = old {
            old.close(true, Some("Replaced by new transport".into())).await;
        }

        self.connected.send_replace(true);
        // The client may transmit immediately; the server holds fire
        // until the client's first ping confirms the handshake reply
        // landed.
        self.set_ready(self.client_side);
        self.emit(SessionEvent::Connected);

        debug!(
            session_id = %self.session_id,
            version,
            epoch,
            "transport attached"
        );

        tokio::spawn(rx_loop(Arc::clone(self), Arc::clone(&transport), epoch));
        tokio::spawn(ping::ping_loop(Arc::clone(self), transport, epoch));
    }

    // ========================================
    // Teardown
    // ========================================

    pub(crate) async fn close_session(self: &Arc<Self>, deliberate: bool, notify_peer: bool) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(session_id = %self.session_id, deliberate, "session closing");

        let transport = self.transport.write().take();
        if notify_peer {
            if let Some(t) = &transport {
                let _ = t
                    .send(Bytes::from(vec![ChannelTag::Close.as_byte()]))
                    .await;
            }
        }

        self.connected.send_replace(false);
        self.ready.send_replace(false);

        // Settle every pending QoS-1 send with an error and clear the
        // outbox; nothing survives a destroyed session.
        let resolvers: Vec<oneshot::Sender<AckOutcome>> = {
            let mut qos1 = self.qos1.lock();
            qos1.awaiting.clear();
            qos1.outbox.clear();
            qos1.resolvers.drain().map(|(_, tx)| tx).collect()
        };
        for resolver in resolvers {
            let _ = resolver.send(AckOutcome::Aborted);
        }
        self.ping.clear();

        if deliberate {
            self.emit(SessionEvent::FinalClose);
        }
        self.emit(SessionEvent::Closed);

        if let Some(t) = transport {
            t.close(true, Some("session closed".into())).await;
        }
    }

    // ========================================
    // Inbound Dispatch
    // ========================================

    async fn handle_frame(
        self: &Arc<Self>,
        transport: &Arc<dyn FrameTransport>,
        frame: &[u8],
    ) -> Result<()> {
        let (&tag, body) = frame
            .split_first()
            .ok_or_else(|| NodeError::Handshake(protov2d_core::CoreError::too_short(1, 0)))?;

        match ChannelTag::from_byte(tag) {
            Some(ChannelTag::Data) => self.on_data(transport, body).await,
            Some(ChannelTag::Ping) => self.on_ping(transport, body).await,
            Some(ChannelTag::Close) => {
                debug!(session_id = %self.session_id, "graceful close received");
                self.close_session(true, false).await;
                Ok(())
            }
            Some(ChannelTag::Handshake) | None => Err(NodeError::Handshake(
                protov2d_core::CoreError::malformed(format!(
                    "unexpected channel tag 0x{tag:02x} after establishment"
                )),
            )),
        }
    }

    async fn on_data(
        self: &Arc<Self>,
        transport: &Arc<dyn FrameTransport>,
        body: &[u8],
    ) -> Result<()> {
        let (stack, digest) = {
            let stack = self.key_stack.read().clone();
            (stack, uses_digest(self.version.load(Ordering::SeqCst)))
        };
        let plain = stack.open(body, digest)?;

        match DataFrame::decode(&plain)? {
            DataFrame::Fire { payload } => {
                self.emit(SessionEvent::Data(payload));
                Ok(())
            }
            DataFrame::Reliable { dup_id, payload, .. } => {
                let first_delivery = self.qos1.lock().delivered.insert(dup_id);
                if first_delivery {
                    self.emit(SessionEvent::Data(payload));
                } else {
                    trace!(session_id = %self.session_id, dup_id, "duplicate suppressed");
                }
                // Ack after delivery; duplicates are re-acked so the
                // sender stops retransmitting.
                let ack = DataFrame::Ack { dup_id }.encode();
                let sealed = stack.seal(&ack, digest)?;
                let mut frame = Vec::with_capacity(1 + sealed.len());
                frame.push(ChannelTag::Data.as_byte());
                frame.extend_from_slice(&sealed);
                let _ = transport.send(Bytes::from(frame)).await;
                Ok(())
            }
            DataFrame::Ack { dup_id } => {
                let resolver = self.qos1.lock().resolvers.remove(&dup_id);
                match resolver {
                    Some(tx) => {
                        let _ = tx.send(AckOutcome::Acked);
                    }
                    None => {
                        trace!(session_id = %self.session_id, dup_id, "ack with no waiter");
                    }
                }
                Ok(())
            }
        }
    }

    async fn on_ping(
        self: &Arc<Self>,
        transport: &Arc<dyn FrameTransport>,
        body: &[u8],
    ) -> Result<()> {
        let (is_reply, nonce) = protov2d_core::protocol::frame::decode_ping(body)?;
        if is_reply {
            self.ping.resolve(&nonce);
        } else {
            // First client ping after a swap opens the server's
            // transmission gate.
            if !self.client_side && !*self.ready.borrow() {
                self.set_ready(true);
            }
            let _ = transport.send(Bytes::from(encode_ping(true, &nonce))).await;
        }
        Ok(())
    }
}

// ============================================
// Reader Task
// ============================================

async fn rx_loop(inner: Arc<SessionInner>, transport: Arc<dyn FrameTransport>, epoch: u64) {
    loop {
        match transport.recv().await {
            TransportEvent::Frame(frame) => {
                if inner.is_closed() {
                    return;
                }
                if let Err(e) = inner.handle_frame(&transport, &frame).await {
                    warn!(
                        session_id = %inner.session_id,
                        error = %e,
                        "dropping transport after bad frame"
                    );
                    transport.close(false, Some("protocol error".into())).await;
                }
            }
            TransportEvent::Closed { explicit, reason } => {
                // Only the current transport's reader reports the
                // disconnect; a replaced transport closes silently.
                // The epoch check happens under the slot lock, which
                // attach() also holds while bumping the epoch.
                let is_current = {
                    let mut slot = inner.transport.write();
                    if inner.current_epoch() == epoch && !inner.is_closed() {
                        if slot
                            .as_ref()
                            .is_some_and(|current| Arc::ptr_eq(current, &transport))
                        {
                            *slot = None;
                        }
                        true
                    } else {
                        false
                    }
                };
                if is_current {
                    inner
                        .last_close_explicit
                        .store(explicit, Ordering::SeqCst);
                    inner.connected.send_replace(false);
                    inner.set_ready(false);
                    debug!(
                        session_id = %inner.session_id,
                        explicit,
                        reason = reason.as_deref().unwrap_or(""),
                        "transport lost"
                    );
                    inner.emit(SessionEvent::Disconnected);
                }
                return;
            }
        }
    }
}
