// ============================================
// File: crates/protov2d-node/src/server.rs
// ============================================
//! # Server Endpoint
//!
//! ## Creation Reason
//! Owns the session table and the server side of the protocol: for
//! every incoming transport it drives a handshake, then either
//! resumes the matching session or creates a fresh one, and enforces
//! the reconnect window on disconnected sessions.
//!
//! ## Establishment Rules
//! - Known, non-closed session ID: transport pointer swapped onto the
//!   existing object, key stack replaced, version recorded, reconnect
//!   window reset, `newSession = 0`
//! - Otherwise: fresh session inserted into the table,
//!   `newSession = 1`, `Connection` emitted; resumed sessions only
//!   re-emit `Connected` on their own stream
//!
//! ## Reconnect Window
//! A watcher task per session arms a one-shot timer on disconnect and
//! cancels it on resume; expiry closes the session, removes it from
//! the table, and emits `DropConnection`.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Transports may be injected directly (`accept_transport`); the
//!   TCP accept loop is optional sugar around it
//! - Handshake failures close the transport with no session-table
//!   side effects
//!
//! ## Last Modified
//! v0.1.0 - Initial server endpoint

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use protov2d_common::net::{real_ip, TrustedProxies};
use protov2d_core::crypto::IdentityKeyPair;
use protov2d_core::handshake::{HandshakeResult, ServerHandshake, ServerStep};
use protov2d_transport::{FrameTransport, TcpFrameTransport, TransportEvent};

use crate::config::{ServerConfig, SessionConfig};
use crate::error::{NodeError, Result};
use crate::events::{ServerEvent, ServerEvents};
use crate::session::Session;

/// Ceiling on how long a connection may sit in the handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================
// Server
// ============================================

/// The server endpoint. Cheap to clone; all clones share the session
/// table.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    identity: Arc<IdentityKeyPair>,
    sessions: DashMap<String, Session>,
    trusted_proxies: TrustedProxies,
    allow_plaintext: bool,
    stream_timeout: Duration,
    session_config: SessionConfig,
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl Server {
    /// Creates a server from its configuration.
    ///
    /// # Errors
    /// Returns `Config` on invalid key material or policy entries.
    pub fn new(config: &ServerConfig) -> Result<(Self, ServerEvents)> {
        let identity = Arc::new(config.identity()?);
        let trusted_proxies = config.trusted_proxies()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let server = Self {
            inner: Arc::new(ServerInner {
                identity,
                sessions: DashMap::new(),
                trusted_proxies,
                allow_plaintext: config.allow_plaintext,
                stream_timeout: config.stream_timeout(),
                session_config: config.session_config(),
                events: events_tx,
            }),
        };
        Ok((server, events_rx))
    }

    /// Number of sessions currently in the table.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Looks up a session by ID.
    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.inner.sessions.get(session_id).map(|s| s.value().clone())
    }

    /// Resolves the real client address from forwarded-for entries
    /// and the transport remote address, per the configured
    /// trusted-proxy policy.
    #[must_use]
    pub fn real_client_ip(&self, forwarded: &[IpAddr], remote: IpAddr) -> IpAddr {
        real_ip(forwarded, remote, &self.inner.trusted_proxies)
    }

    /// Accepts TCP connections forever, handshaking each in its own
    /// task.
    ///
    /// # Errors
    /// Returns the accept-loop error if the listener fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(addr = ?listener.local_addr().ok(), "server listening");
        loop {
            let (stream, addr) = listener.accept().await.map_err(|e| {
                NodeError::Transport(protov2d_transport::TransportError::connect_failed(
                    "accept", e.to_string(),
                ))
            })?;
            debug!(%addr, "inbound connection");
            let transport = TcpFrameTransport::from_stream(stream);
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.accept_transport(transport).await {
                    debug!(%addr, error = %e, "handshake failed");
                }
            });
        }
    }

    /// Drives the handshake on an already-established transport and
    /// binds the resulting session.
    ///
    /// # Errors
    /// Returns the handshake failure; the transport is closed and no
    /// session state is touched.
    pub async fn accept_transport(
        &self,
        transport: Arc<dyn FrameTransport>,
    ) -> Result<Session> {
        let result = match tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            self.drive_handshake(&transport),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                transport
                    .close(true, Some("handshake timeout".into()))
                    .await;
                return Err(NodeError::HandshakeTimeout);
            }
        };

        self.bind_session(transport, result).await
    }

    // ========================================
    // Handshake
    // ========================================

    async fn drive_handshake(
        &self,
        transport: &Arc<dyn FrameTransport>,
    ) -> Result<HandshakeResult> {
        let mut handshake =
            ServerHandshake::new(Arc::clone(&self.inner.identity), self.inner.allow_plaintext);

        loop {
            match transport.recv().await {
                TransportEvent::Frame(frame) => match handshake.process(&frame) {
                    Ok(ServerStep::Reply(reply)) => {
                        transport.send(Bytes::from(reply)).await?;
                    }
                    Ok(ServerStep::Reject { reply, error }) => {
                        let _ = transport.send(Bytes::from(reply)).await;
                        transport
                            .close(true, Some("handshake rejected".into()))
                            .await;
                        return Err(error.into());
                    }
                    Ok(ServerStep::Complete(result)) => return Ok(result),
                    Err(e) => {
                        warn!(error = %e, "handshake failed");
                        transport.close(true, Some("handshake failed".into())).await;
                        return Err(e.into());
                    }
                },
                TransportEvent::Closed { .. } => return Err(NodeError::HandshakeAborted),
            }
        }
    }

    // ========================================
    // Session Binding
    // ========================================

    async fn bind_session(
        &self,
        transport: Arc<dyn FrameTransport>,
        result: HandshakeResult,
    ) -> Result<Session> {
        let existing = self
            .inner
            .sessions
            .get(&result.session_id)
            .map(|s| s.value().clone())
            .filter(|s| !s.is_closed());

        let (session, pending_events, new_session) = match existing {
            Some(session) => {
                debug!(session_id = %result.session_id, "resuming session");
                (session, None, false)
            }
            None => {
                let (session, events) = Session::new(
                    result.session_id.clone(),
                    false,
                    self.inner.session_config.clone(),
                );
                self.inner
                    .sessions
                    .insert(result.session_id.clone(), session.clone());
                self.spawn_lifecycle_watcher(session.clone());
                info!(session_id = %result.session_id, version = result.version, "session created");
                (session, Some(events), true)
            }
        };

        let reply = result.established_reply(new_session)?;
        session
            .attach(Arc::clone(&transport), result.key_stack, result.version)
            .await;
        transport.send(Bytes::from(reply)).await?;

        if let Some(events) = pending_events {
            let _ = self.inner.events.send(ServerEvent::Connection {
                session: session.clone(),
                events,
            });
        }

        Ok(session)
    }

    /// Watches one session's connection state, enforcing the
    /// reconnect window and cleaning the table up on close.
    fn spawn_lifecycle_watcher(&self, session: Session) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut connected = session.subscribe_connected();
            loop {
                if session.is_closed() {
                    break;
                }
                if *connected.borrow_and_update() {
                    if connected.changed().await.is_err() {
                        break;
                    }
                    continue;
                }

                // Disconnected: arm the reconnect window.
                let expired = tokio::select! {
                    changed = connected.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        false
                    }
                    () = tokio::time::sleep(inner.stream_timeout) => true,
                };

                if expired && !session.is_connected() && !session.is_closed() {
                    info!(session_id = %session.id(), "reconnect window elapsed, dropping session");
                    session.expire().await;
                    inner.sessions.remove(session.id());
                    let _ = inner
                        .events
                        .send(ServerEvent::DropConnection(session.id().to_string()));
                    return;
                }
            }

            inner.sessions.remove(session.id());
        });
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("sessions", &self.session_count())
            .field("allow_plaintext", &self.inner.allow_plaintext)
            .field("stream_timeout", &self.inner.stream_timeout)
            .finish()
    }
}
