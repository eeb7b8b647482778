// ============================================
// File: crates/protov2d-node/src/config.rs
// ============================================
//! # Node Configuration
//!
//! ## Creation Reason
//! Provides configuration for both endpoints: a TOML-loadable server
//! configuration and a builder-style client configuration.
//!
//! ## Example Server Configuration
//! ```toml
//! listen_addr = "0.0.0.0:9271"
//! private_key = "<hex: ed25519Seed ∥ dilithium5Secret>"
//! public_key = "<hex: ed25519Pub ∥ dilithium5Pub>"
//! stream_timeout_secs = 120
//! ping_interval_secs = 15
//! ping_timeout_secs = 10
//! trust_proxy = ["10.0.0.0/8"]
//! allow_plaintext = false
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Key material is accepted as lowercase hex or raw byte arrays
//! - `validate` exercises the key pair; call it before serving
//! - Root key *generation* is a deployment task, not a library one
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use protov2d_common::bytes::from_hex;
use protov2d_common::net::{TrustedProxies, TrustedProxiesSpec};
use protov2d_core::crypto::IdentityKeyPair;
use protov2d_core::handshake::PinSet;

use crate::client::Connector;
use crate::error::{NodeError, Result};

// ============================================
// SessionConfig
// ============================================

/// Timing knobs shared by both sides of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interval between keepalive pings.
    pub ping_interval: Duration,
    /// How long to wait for a pong before dropping the transport.
    pub ping_timeout: Duration,
    /// How long to wait for a QoS-1 acknowledgement before
    /// retransmitting.
    pub ack_timeout: Duration,
    /// Ring-buffer size for RTT averaging.
    pub avg_ping_count: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(15),
            ping_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(10),
            avg_ping_count: 10,
        }
    }
}

// ============================================
// KeyMaterial
// ============================================

/// Key material as it appears in configuration: lowercase hex or raw
/// bytes.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeyMaterial {
    /// Hex serialization (lowercase, contiguous, no delimiters).
    Hex(String),
    /// Raw bytes.
    Raw(Vec<u8>),
}

impl KeyMaterial {
    /// Resolves to raw bytes.
    ///
    /// # Errors
    /// Returns `Config` on invalid hex.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Hex(hex) => {
                from_hex(hex).map_err(|e| NodeError::config(format!("key material: {e}")))
            }
            Self::Raw(bytes) => Ok(bytes.clone()),
        }
    }
}

// ============================================
// ServerConfig
// ============================================

fn default_stream_timeout() -> u64 {
    120
}
fn default_ping_interval() -> u64 {
    15
}
fn default_ping_timeout() -> u64 {
    10
}
fn default_ack_timeout() -> u64 {
    10
}
fn default_avg_ping_count() -> usize {
    10
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Root private key (`ed25519Seed ∥ dilithium5Secret`).
    pub private_key: KeyMaterial,
    /// Root public key (`ed25519Pub ∥ dilithium5Pub`).
    pub public_key: KeyMaterial,

    /// Reconnect window for disconnected sessions, in seconds.
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,
    /// Keepalive interval, in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// Keepalive timeout, in seconds.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,
    /// QoS-1 acknowledgement timeout, in seconds.
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,
    /// RTT samples kept for averaging.
    #[serde(default = "default_avg_ping_count")]
    pub avg_ping_count: usize,

    /// Trusted-proxy policy: `true`, `false`, or a CIDR list.
    #[serde(default)]
    pub trust_proxy: Option<TrustedProxiesSpec>,

    /// Whether clients may negotiate unencrypted sessions.
    #[serde(default)]
    pub allow_plaintext: bool,

    /// TCP listen address for the bundled binary. Embedders injecting
    /// transports directly leave this unset.
    #[serde(default)]
    pub listen_addr: Option<SocketAddr>,
}

impl ServerConfig {
    /// Builds a configuration from hex key material with defaults
    /// everywhere else.
    #[must_use]
    pub fn new(private_key_hex: impl Into<String>, public_key_hex: impl Into<String>) -> Self {
        Self {
            private_key: KeyMaterial::Hex(private_key_hex.into()),
            public_key: KeyMaterial::Hex(public_key_hex.into()),
            stream_timeout_secs: default_stream_timeout(),
            ping_interval_secs: default_ping_interval(),
            ping_timeout_secs: default_ping_timeout(),
            ack_timeout_secs: default_ack_timeout(),
            avg_ping_count: default_avg_ping_count(),
            trust_proxy: None,
            allow_plaintext: false,
            listen_addr: None,
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `Config` if the file cannot be read, parsed, or
    /// validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        info!(path = %path_str, "loading configuration");

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| NodeError::config(format!("{path_str}: {e}")))?;
        let config = Self::from_toml_str(&content)?;
        info!("configuration loaded");
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `Config` on parse or validation failure.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| NodeError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration, exercising the key pair.
    ///
    /// # Errors
    /// Returns `Config` on inconsistent key material or timing knobs.
    pub fn validate(&self) -> Result<()> {
        self.identity()?;
        if self.stream_timeout_secs == 0 {
            return Err(NodeError::config("stream_timeout_secs must be positive"));
        }
        if self.ping_interval_secs == 0 || self.ping_timeout_secs == 0 {
            return Err(NodeError::config("keepalive intervals must be positive"));
        }
        if let Some(spec) = &self.trust_proxy {
            spec.resolve()
                .map_err(|e| NodeError::config(e.to_string()))?;
        }
        Ok(())
    }

    /// Reconstructs the root identity key pair.
    ///
    /// # Errors
    /// Returns `Config` on invalid or mismatched key material.
    pub fn identity(&self) -> Result<IdentityKeyPair> {
        let private = self.private_key.to_bytes()?;
        let public = self.public_key.to_bytes()?;
        IdentityKeyPair::from_key_bytes(&private, &public)
            .map_err(|e| NodeError::config(format!("root key pair: {e}")))
    }

    /// Resolves the trusted-proxy policy.
    ///
    /// # Errors
    /// Returns `Config` on an unparseable CIDR entry.
    pub fn trusted_proxies(&self) -> Result<TrustedProxies> {
        match &self.trust_proxy {
            None => Ok(TrustedProxies::None),
            Some(spec) => spec.resolve().map_err(|e| NodeError::config(e.to_string())),
        }
    }

    /// The reconnect window for disconnected sessions.
    #[must_use]
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    /// Session timing knobs derived from this configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            ping_timeout: Duration::from_secs(self.ping_timeout_secs),
            ack_timeout: Duration::from_secs(self.ack_timeout_secs),
            avg_ping_count: self.avg_ping_count,
        }
    }
}

// ============================================
// HandshakeV1
// ============================================

/// Client policy for the legacy v1 handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeV1 {
    /// Prefer v2; fall back to v1 if the server only speaks v1.
    #[default]
    Auto,
    /// Speak v1 only.
    Forced,
    /// Never speak v1; a v1-only server is a non-recoverable error.
    Disabled,
}

// ============================================
// ClientConfig
// ============================================

/// Client configuration, builder style.
#[derive(Clone)]
pub struct ClientConfig {
    /// Acceptable server identities.
    pub pins: PinSet,
    /// Server URL (`host:port` for the TCP transport). Either this or
    /// a connector must be set.
    pub url: Option<String>,
    /// Custom transport factory; overrides `url`.
    pub connector: Option<Arc<dyn Connector>>,
    /// Handshake/ack/keepalive timeout.
    pub timeout: Duration,
    /// Keepalive interval.
    pub ping_interval: Duration,
    /// Delay between reconnect attempts.
    pub reconnection_time: Duration,
    /// Attempt cap for the initial connect; `None` retries forever.
    pub max_initial_retries: Option<u32>,
    /// Legacy-handshake policy.
    pub handshake_v1: HandshakeV1,
    /// Negotiate an unencrypted session (requires server opt-in).
    pub disable_encryption: bool,
    /// Keep reconnecting even after the peer closed the transport
    /// deliberately.
    pub always_reconnect: bool,
    /// Fixed session identity; a fresh one is generated per client
    /// when unset.
    pub session_keys: Option<Arc<IdentityKeyPair>>,
    /// RTT samples kept for averaging.
    pub avg_ping_count: usize,
}

impl ClientConfig {
    /// Creates a configuration with the given pin set and defaults
    /// everywhere else.
    #[must_use]
    pub fn new(pins: PinSet) -> Self {
        Self {
            pins,
            url: None,
            connector: None,
            timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(15),
            reconnection_time: Duration::from_secs(5),
            max_initial_retries: None,
            handshake_v1: HandshakeV1::Auto,
            disable_encryption: false,
            always_reconnect: false,
            session_keys: None,
            avg_ping_count: 10,
        }
    }

    /// Sets the server URL for the TCP transport.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Injects a custom transport factory.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets the handshake/ack/keepalive timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the keepalive interval.
    #[must_use]
    pub const fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Sets the delay between reconnect attempts.
    #[must_use]
    pub const fn with_reconnection_time(mut self, delay: Duration) -> Self {
        self.reconnection_time = delay;
        self
    }

    /// Caps the initial connect attempts.
    #[must_use]
    pub const fn with_max_initial_retries(mut self, retries: u32) -> Self {
        self.max_initial_retries = Some(retries);
        self
    }

    /// Sets the legacy-handshake policy.
    #[must_use]
    pub const fn with_handshake_v1(mut self, policy: HandshakeV1) -> Self {
        self.handshake_v1 = policy;
        self
    }

    /// Requests an unencrypted session.
    #[must_use]
    pub const fn with_disable_encryption(mut self, disable: bool) -> Self {
        self.disable_encryption = disable;
        self
    }

    /// Reconnect even after deliberate transport closes.
    #[must_use]
    pub const fn with_always_reconnect(mut self, always: bool) -> Self {
        self.always_reconnect = always;
        self
    }

    /// Pins the session identity instead of generating a fresh one.
    #[must_use]
    pub fn with_session_keys(mut self, keys: Arc<IdentityKeyPair>) -> Self {
        self.session_keys = Some(keys);
        self
    }

    /// Session timing knobs derived from this configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ping_interval: self.ping_interval,
            ping_timeout: self.timeout,
            ack_timeout: self.timeout,
            avg_ping_count: self.avg_ping_count,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .field("handshake_v1", &self.handshake_v1)
            .field("disable_encryption", &self.disable_encryption)
            .field("always_reconnect", &self.always_reconnect)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use protov2d_common::bytes::to_hex;

    #[test]
    fn test_server_config_toml_roundtrip() {
        let identity = IdentityKeyPair::generate();
        let toml = format!(
            "private_key = \"{}\"\npublic_key = \"{}\"\nstream_timeout_secs = 60\nallow_plaintext = true\ntrust_proxy = [\"10.0.0.0/8\"]\n",
            to_hex(&identity.private_key_bytes()),
            to_hex(&identity.public_key_bytes()),
        );

        let config = ServerConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.stream_timeout(), Duration::from_secs(60));
        assert!(config.allow_plaintext);
        assert_eq!(
            config.identity().unwrap().public_key_bytes(),
            identity.public_key_bytes()
        );
        assert!(matches!(
            config.trusted_proxies().unwrap(),
            TrustedProxies::Cidrs(_)
        ));
    }

    #[test]
    fn test_server_config_defaults() {
        let identity = IdentityKeyPair::generate();
        let config = ServerConfig::new(
            to_hex(&identity.private_key_bytes()),
            to_hex(&identity.public_key_bytes()),
        );
        config.validate().unwrap();

        assert_eq!(config.stream_timeout(), Duration::from_secs(120));
        let session = config.session_config();
        assert_eq!(session.ping_interval, Duration::from_secs(15));
        assert_eq!(session.ack_timeout, Duration::from_secs(10));
        assert!(!config.allow_plaintext);
        assert!(matches!(
            config.trusted_proxies().unwrap(),
            TrustedProxies::None
        ));
    }

    #[test]
    fn test_bad_key_material_rejected() {
        let config = ServerConfig::new("zz", "zz");
        assert!(config.validate().is_err());

        let identity = IdentityKeyPair::generate();
        let other = IdentityKeyPair::generate();
        let mismatched = ServerConfig::new(
            to_hex(&identity.private_key_bytes()),
            to_hex(&other.public_key_bytes()),
        );
        assert!(mismatched.validate().is_err());
    }

    #[test]
    fn test_client_config_builder() {
        let pins = PinSet::new(vec![protov2d_core::handshake::PinEntry::NoVerify]).unwrap();
        let config = ClientConfig::new(pins)
            .with_url("127.0.0.1:9271")
            .with_timeout(Duration::from_secs(3))
            .with_handshake_v1(HandshakeV1::Forced)
            .with_max_initial_retries(4)
            .with_always_reconnect(true);

        assert_eq!(config.url.as_deref(), Some("127.0.0.1:9271"));
        assert_eq!(config.max_initial_retries, Some(4));
        assert_eq!(config.handshake_v1, HandshakeV1::Forced);
        assert!(config.always_reconnect);

        let session = config.session_config();
        assert_eq!(session.ping_timeout, Duration::from_secs(3));
        assert_eq!(session.ack_timeout, Duration::from_secs(3));
    }
}
