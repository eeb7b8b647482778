// ============================================
// File: crates/protov2d-node/src/client.rs
// ============================================
//! # Client Endpoint
//!
//! ## Creation Reason
//! Owns the client side of the protocol: the initial connect loop,
//! the handshake (including the v1 fallback), and the background
//! reconnect driver that resumes the same session over fresh
//! transports.
//!
//! ## Reconnect Policy
//! Recoverable failures (carrier loss, timeouts) retry after
//! `reconnection_time`; the initial loop additionally honors
//! `max_initial_retries`. Non-recoverable errors (pin mismatch,
//! signature failure, malformed handshake, a v1-only server with v1
//! disabled) abort immediately. A resume answered with
//! `newSession = 1` emits `ResumeFailed` and carries on with the
//! outbox intact, so buffered payloads still go out.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The session identity travels with the client, not the
//!   transport: the same key pair must sign every resume
//! - `always_reconnect` only widens the policy to deliberate peer
//!   closes; it never overrides a non-recoverable error
//!
//! ## Last Modified
//! v0.1.0 - Initial client endpoint

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use protov2d_core::crypto::IdentityKeyPair;
use protov2d_core::handshake::client::{ClientHandshake, ClientHandshakeResult, ClientStep};
use protov2d_core::handshake::{session_id_for, PinSet};
use protov2d_core::protocol::records::EncryptionMode;
use protov2d_core::protocol::version::{PROTOCOL_V1, PROTOCOL_V2};
use protov2d_core::CoreError;
use protov2d_transport::{
    FrameTransport, TcpFrameTransport, TransportError, TransportEvent,
};

use crate::config::{ClientConfig, HandshakeV1};
use crate::error::{NodeError, Result};
use crate::events::SessionEvents;
use crate::session::Session;

// ============================================
// Connector
// ============================================

/// Factory for fresh transports; invoked per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establishes a new transport to the server.
    async fn connect(&self) -> std::result::Result<Arc<dyn FrameTransport>, TransportError>;
}

/// Default connector: length-delimited frames over TCP.
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// Creates a connector for `host:port`.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> std::result::Result<Arc<dyn FrameTransport>, TransportError> {
        let transport = TcpFrameTransport::connect(&self.addr).await?;
        Ok(transport as Arc<dyn FrameTransport>)
    }
}

// ============================================
// Client
// ============================================

/// The client endpoint: one session plus its reconnect driver.
pub struct Client {
    session: Session,
}

impl Client {
    /// Connects to the server and establishes a session.
    ///
    /// Retries recoverable failures per the configuration; resolves
    /// once the first handshake completes, returning the session's
    /// event stream alongside the client.
    ///
    /// # Errors
    /// Non-recoverable handshake failures, exhausted retries, or a
    /// configuration without `url`/connector.
    pub async fn connect(config: ClientConfig) -> Result<(Self, SessionEvents)> {
        let connector: Arc<dyn Connector> = match (&config.connector, &config.url) {
            (Some(connector), _) => Arc::clone(connector),
            (None, Some(url)) => Arc::new(TcpConnector::new(url.clone())),
            (None, None) => {
                return Err(NodeError::config("either url or connector is required"));
            }
        };

        let session_keys = config
            .session_keys
            .clone()
            .unwrap_or_else(|| Arc::new(IdentityKeyPair::generate()));

        let (mut version, supported) = version_plan(config.handshake_v1);
        let mode = config.pins.preferred_mode(config.disable_encryption);

        // Initial connect loop.
        let mut attempts: u32 = 0;
        let (transport, result) = loop {
            attempts += 1;
            match try_handshake(
                &connector,
                &config,
                &session_keys,
                version,
                supported.clone(),
                mode,
            )
            .await
            {
                Ok(established) => break established,
                Err(NodeError::Handshake(CoreError::VersionRejected { supported: server })) => {
                    if config.handshake_v1 == HandshakeV1::Auto
                        && version == PROTOCOL_V2
                        && server.contains(&PROTOCOL_V1)
                    {
                        info!("server only speaks v1, falling back");
                        version = PROTOCOL_V1;
                        continue;
                    }
                    return Err(NodeError::Handshake(CoreError::VersionRejected {
                        supported: server,
                    }));
                }
                Err(e) if !e.is_recoverable() => {
                    warn!(error = %e, "handshake failed, not retrying");
                    return Err(e);
                }
                Err(e) => {
                    if let Some(max) = config.max_initial_retries {
                        if attempts >= max {
                            warn!(attempts, error = %e, "initial connect exhausted");
                            return Err(NodeError::ConnectExhausted { attempts });
                        }
                    }
                    debug!(attempt = attempts, error = %e, "connect attempt failed");
                    sleep(config.reconnection_time).await;
                }
            }
        };

        let session_id = session_id_for(&session_keys.public_key_bytes(), result.version);
        let (session, events) = Session::new(session_id, true, config.session_config());
        let negotiated = result.version;
        session
            .attach(transport, result.key_stack, result.version)
            .await;

        info!(session_id = %session.id(), version = negotiated, "connected");

        tokio::spawn(reconnect_driver(
            session.clone(),
            connector,
            config.clone(),
            session_keys,
            negotiated,
            mode,
        ));

        Ok((Self { session: session.clone() }, events))
    }

    /// The underlying session handle.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Gracefully closes the session and stops reconnecting.
    pub async fn close(&self) {
        self.session.close().await;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("session", &self.session)
            .finish()
    }
}

// ============================================
// Handshake Attempt
// ============================================

fn version_plan(policy: HandshakeV1) -> (u8, Vec<u8>) {
    match policy {
        HandshakeV1::Auto => (PROTOCOL_V2, vec![PROTOCOL_V1, PROTOCOL_V2]),
        HandshakeV1::Forced => (PROTOCOL_V1, vec![PROTOCOL_V1]),
        HandshakeV1::Disabled => (PROTOCOL_V2, vec![PROTOCOL_V2]),
    }
}

async fn try_handshake(
    connector: &Arc<dyn Connector>,
    config: &ClientConfig,
    session_keys: &Arc<IdentityKeyPair>,
    version: u8,
    supported: Vec<u8>,
    mode: EncryptionMode,
) -> Result<(Arc<dyn FrameTransport>, ClientHandshakeResult)> {
    let transport = connector.connect().await?;

    let outcome = timeout(
        config.timeout,
        drive_handshake(
            &transport,
            config.pins.clone(),
            Arc::clone(session_keys),
            version,
            supported,
            mode,
        ),
    )
    .await;

    match outcome {
        Ok(Ok(result)) => Ok((transport, result)),
        Ok(Err(e)) => {
            transport.close(true, Some("handshake failed".into())).await;
            Err(e)
        }
        Err(_) => {
            transport
                .close(true, Some("handshake timeout".into()))
                .await;
            Err(NodeError::HandshakeTimeout)
        }
    }
}

async fn drive_handshake(
    transport: &Arc<dyn FrameTransport>,
    pins: PinSet,
    session_keys: Arc<IdentityKeyPair>,
    version: u8,
    supported: Vec<u8>,
    mode: EncryptionMode,
) -> Result<ClientHandshakeResult> {
    let mut handshake = ClientHandshake::new(pins, session_keys, version, supported, mode);
    transport.send(Bytes::from(handshake.initial()?)).await?;

    loop {
        match transport.recv().await {
            TransportEvent::Frame(frame) => match handshake.process(&frame)? {
                ClientStep::Send(out) => transport.send(Bytes::from(out)).await?,
                ClientStep::Complete(result) => return Ok(result),
            },
            TransportEvent::Closed { .. } => return Err(NodeError::HandshakeAborted),
        }
    }
}

// ============================================
// Reconnect Driver
// ============================================

async fn reconnect_driver(
    session: Session,
    connector: Arc<dyn Connector>,
    config: ClientConfig,
    session_keys: Arc<IdentityKeyPair>,
    version: u8,
    mode: EncryptionMode,
) {
    let supported = vec![version];
    let mut connected = session.subscribe_connected();

    loop {
        // Wait for a disconnect.
        while *connected.borrow_and_update() {
            if connected.changed().await.is_err() {
                return;
            }
        }
        if session.is_closed() {
            return;
        }
        if session.last_close_explicit() && !config.always_reconnect {
            info!(session_id = %session.id(), "peer closed transport, not reconnecting");
            session.expire().await;
            return;
        }

        // Resume loop.
        loop {
            if session.is_closed() {
                return;
            }
            match try_handshake(
                &connector,
                &config,
                &session_keys,
                version,
                supported.clone(),
                mode,
            )
            .await
            {
                Ok((transport, result)) => {
                    if result.new_session {
                        warn!(session_id = %session.id(), "server lost our session");
                        session.notify_resume_failed();
                    }
                    session
                        .attach(transport, result.key_stack, result.version)
                        .await;
                    debug!(session_id = %session.id(), "session resumed");
                    break;
                }
                Err(e) if !e.is_recoverable() => {
                    warn!(session_id = %session.id(), error = %e, "resume failed permanently");
                    session.expire().await;
                    return;
                }
                Err(e) => {
                    debug!(session_id = %session.id(), error = %e, "resume attempt failed");
                    sleep(config.reconnection_time).await;
                }
            }
        }
    }
}
