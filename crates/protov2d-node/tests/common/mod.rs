// ============================================
// File: crates/protov2d-node/tests/common/mod.rs
// ============================================
//! Shared fixtures: an in-memory connector wiring clients straight
//! into a server, plus fast-timing configurations.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use protov2d_common::bytes::to_hex;
use protov2d_core::crypto::sha256;
use protov2d_node::{
    memory_pair, Client, ClientConfig, Connector, FrameTransport, IdentityKeyPair,
    MemoryTransport, PinSet, Qos, Server, ServerConfig, ServerEvent, ServerEvents, Session,
    SessionEvent, SessionEvents,
};
use protov2d_transport::TransportError;

/// A server wired for tests plus everything a client needs to pin it.
pub struct TestServer {
    pub server: Server,
    pub events: ServerEvents,
    pub root_public: Vec<u8>,
}

/// Builds a server with fast timings.
pub fn test_server(allow_plaintext: bool, stream_timeout_secs: u64) -> TestServer {
    let identity = IdentityKeyPair::generate();
    let mut config = ServerConfig::new(
        to_hex(&identity.private_key_bytes()),
        to_hex(&identity.public_key_bytes()),
    );
    config.allow_plaintext = allow_plaintext;
    config.stream_timeout_secs = stream_timeout_secs;
    config.ack_timeout_secs = 2;
    config.ping_timeout_secs = 2;

    let root_public = identity.public_key_bytes();
    let (server, events) = Server::new(&config).unwrap();
    TestServer {
        server,
        events,
        root_public,
    }
}

/// Pin set matching the test server by hash.
pub fn hash_pins(root_public: &[u8]) -> PinSet {
    PinSet::single_hash(sha256(root_public).to_vec()).unwrap()
}

/// Client configuration with fast timings, no URL (injected
/// connector).
pub fn fast_client_config(pins: PinSet) -> ClientConfig {
    ClientConfig::new(pins)
        .with_timeout(Duration::from_secs(2))
        .with_reconnection_time(Duration::from_millis(100))
        .with_ping_interval(Duration::from_millis(500))
}

// ============================================
// MemoryConnector
// ============================================

/// Connector that hands each new memory-pair half straight to the
/// server's handshake intake.
pub struct MemoryConnector {
    server: Server,
    pub attempts: AtomicU32,
    offline: std::sync::atomic::AtomicBool,
    last: Mutex<Option<Arc<MemoryTransport>>>,
}

impl MemoryConnector {
    pub fn new(server: Server) -> Arc<Self> {
        Arc::new(Self {
            server,
            attempts: AtomicU32::new(0),
            offline: std::sync::atomic::AtomicBool::new(false),
            last: Mutex::new(None),
        })
    }

    /// Makes future connect attempts fail, simulating an unreachable
    /// server.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Severs the current client transport as if the carrier died.
    pub async fn kill_current(&self) {
        let transport = self.last.lock().clone();
        if let Some(transport) = transport {
            transport.close(false, Some("carrier lost".into())).await;
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn FrameTransport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::connect_failed("memory", "offline"));
        }
        let (client_half, server_half) = memory_pair();
        *self.last.lock() = Some(Arc::clone(&client_half));

        let server = self.server.clone();
        tokio::spawn(async move {
            let transport: Arc<dyn FrameTransport> = server_half;
            let _ = server.accept_transport(transport).await;
        });

        Ok(client_half as Arc<dyn FrameTransport>)
    }
}

// ============================================
// Helpers
// ============================================

/// Connects a client through a fresh memory connector.
pub async fn connect_client(
    server: &Server,
    config: ClientConfig,
) -> (Client, SessionEvents, Arc<MemoryConnector>) {
    let connector = MemoryConnector::new(server.clone());
    let config = config.with_connector(connector.clone() as Arc<dyn Connector>);
    let (client, events) = Client::connect(config).await.unwrap();
    (client, events, connector)
}

/// Pulls the next fresh-session event off the server stream.
pub async fn next_connection(events: &mut ServerEvents) -> (Session, SessionEvents) {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("server event")
            .expect("server stream open")
        {
            ServerEvent::Connection { session, events } => return (session, events),
            ServerEvent::DropConnection(_) => {}
        }
    }
}

/// Echoes every payload on a session back over QoS-1.
pub fn spawn_echo(session: Session, mut events: SessionEvents) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let SessionEvent::Data(payload) = event {
                let _ = session.send(payload, Qos::Reliable).await;
            }
        }
    });
}

/// Waits for the next `Data` event, skipping lifecycle noise.
pub async fn next_data(events: &mut SessionEvents) -> bytes::Bytes {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("session event")
            .expect("session stream open")
        {
            SessionEvent::Data(payload) => return payload,
            _ => {}
        }
    }
}
