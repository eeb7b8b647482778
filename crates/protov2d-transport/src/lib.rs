// ============================================
// File: crates/protov2d-transport/src/lib.rs
// ============================================
//! # ProtoV2d Transport - Frame Carrier Layer
//!
//! ## Creation Reason
//! The protocol core consumes an already-established bidirectional
//! frame channel; this crate defines that seam and ships two
//! implementations: length-delimited TCP for production and linked
//! in-memory pairs for injected-transport setups and tests.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: the `FrameTransport` adapter contract
//! - [`tcp`]: u32-length-prefixed framing over `tokio::net::TcpStream`
//! - [`memory`]: linked in-memory transport pairs
//! - [`error`]: transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              protov2d-node                          │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │   protov2d-core       protov2d-transport           │
//! │                       You are here ◄──             │
//! │         │                     │                    │
//! │         └──────────┬──────────┘                    │
//! │                    ▼                               │
//! │             protov2d-common                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - An adapter emits `Closed` exactly once per logical close, no
//!   matter how many times the underlying carrier reports it
//! - Frames are delivered with their exact payload bytes; the
//!   transport never inspects them
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod memory;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{memory_pair, MemoryTransport};
pub use tcp::TcpFrameTransport;
pub use traits::{FrameTransport, TransportEvent};
