// ============================================
// File: crates/protov2d-node/src/lib.rs
// ============================================
//! # ProtoV2d Node - Session Layer & Endpoints
//!
//! ## Creation Reason
//! Ties the protocol core and the transport adapters together into
//! the user-facing endpoints: a server owning a table of resumable
//! sessions and a client that keeps one session alive across
//! transports.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`session`]: the long-lived session object with QoS-1 delivery,
//!   keepalive, and transport-swap logic
//! - [`server`]: session table, handshake intake, reconnect window
//! - [`client`]: connect/reconnect loops and transport factories
//! - [`config`]: TOML server configuration, builder client
//!   configuration
//! - [`events`]: typed per-session and per-server event streams
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              protov2d-node                          │
//! │              You are here ◄──                       │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │   protov2d-core       protov2d-transport           │
//! │         │                     │                    │
//! │         └──────────┬──────────┘                    │
//! │                    ▼                               │
//! │             protov2d-common                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```ignore
//! let pins = PinSet::single_hash(sha256_of_server_root)?;
//! let config = ClientConfig::new(pins).with_url("tunnel.example:9271");
//! let (client, mut events) = Client::connect(config).await?;
//!
//! client.session().send(payload, Qos::Reliable).await?;
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::Data(bytes) = event { /* ... */ }
//! }
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial node implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod server;
pub mod session;

pub use client::{Client, Connector, TcpConnector};
pub use config::{ClientConfig, HandshakeV1, ServerConfig, SessionConfig};
pub use error::{NodeError, Result};
pub use events::{ServerEvent, ServerEvents, SessionEvent, SessionEvents};
pub use server::Server;
pub use session::{Qos, Session};

// Re-export the types an embedder needs from the lower layers.
pub use protov2d_core::crypto::IdentityKeyPair;
pub use protov2d_core::handshake::{PinEntry, PinSet};
pub use protov2d_transport::{memory_pair, FrameTransport, MemoryTransport, TcpFrameTransport};
