// ============================================
// File: crates/protov2d-common/src/net.rs
// ============================================
//! # Proxy-Chain IP Resolution
//!
//! ## Creation Reason
//! Servers deployed behind reverse proxies see the proxy's address on
//! the transport; the real client address travels in `X-Forwarded-For`
//! entries. This module walks the proxy chain to recover it.
//!
//! ## Main Functionality
//! - `TrustedProxies`: none / all / CIDR-list trust policy
//! - `real_ip`: walk from the transport address inward and return the
//!   first hop outside the trusted set
//!
//! ## Resolution Walk
//! ```text
//! XFF: [client, proxyA, proxyB]     transport remote: proxyC
//!
//! proxyC trusted?  ──no──► realIP = proxyC
//!       │yes
//! proxyB trusted?  ──no──► realIP = proxyB
//!       │yes
//! proxyA trusted?  ──no──► realIP = proxyA
//!       │yes
//! realIP = client (leftmost entry)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - XFF entries are attacker-controlled; only hops behind a trusted
//!   proxy are believable
//! - `All` trusts every hop and should only be used behind a proxy
//!   that strips inbound XFF headers
//!
//! ## Last Modified
//! v0.1.0 - Initial proxy-chain resolution

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::Deserialize;

use crate::error::{CommonError, Result};

// ============================================
// TrustedProxies
// ============================================

/// Trusted-proxy policy for real-IP resolution.
#[derive(Debug, Clone, Default)]
pub enum TrustedProxies {
    /// Trust nothing; the transport remote address is the client.
    #[default]
    None,
    /// Trust every hop; the leftmost XFF entry is the client.
    All,
    /// Trust hops whose address falls inside any of these networks.
    Cidrs(Vec<IpNetwork>),
}

impl TrustedProxies {
    /// Parses a list of CIDR strings (`"10.0.0.0/8"`, `"fd00::/8"`, or
    /// bare addresses) into a `Cidrs` policy.
    ///
    /// # Errors
    /// Returns `InvalidInput` on an unparseable entry.
    pub fn from_cidrs<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let mut networks = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = entry.as_ref().trim();
            let net: IpNetwork = entry
                .parse()
                .map_err(|_| CommonError::invalid_input("trust_proxy", format!("bad CIDR '{entry}'")))?;
            networks.push(net);
        }
        Ok(Self::Cidrs(networks))
    }

    /// Returns `true` if the given address is a trusted hop.
    #[must_use]
    pub fn is_trusted(&self, addr: IpAddr) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Cidrs(networks) => networks.iter().any(|n| n.contains(addr)),
        }
    }
}

/// Serde-facing form of the policy: `false`, `true`, or a CIDR list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TrustedProxiesSpec {
    /// `trust_proxy = true` / `false`
    Flag(bool),
    /// `trust_proxy = ["10.0.0.0/8", "127.0.0.1"]`
    Cidrs(Vec<String>),
}

impl TrustedProxiesSpec {
    /// Resolves the configuration form into a runtime policy.
    ///
    /// # Errors
    /// Returns `InvalidInput` on an unparseable CIDR entry.
    pub fn resolve(&self) -> Result<TrustedProxies> {
        match self {
            Self::Flag(false) => Ok(TrustedProxies::None),
            Self::Flag(true) => Ok(TrustedProxies::All),
            Self::Cidrs(entries) => TrustedProxies::from_cidrs(entries),
        }
    }
}

// ============================================
// Resolution
// ============================================

/// Resolves the real client address from forwarded-for entries and the
/// transport's remote address.
///
/// `forwarded` is ordered leftmost-first (origin client first), as in
/// the `X-Forwarded-For` header. The walk starts at the transport
/// address and advances inward while hops are trusted; the first
/// untrusted hop wins. If every hop is trusted the leftmost entry is
/// returned.
#[must_use]
pub fn real_ip(forwarded: &[IpAddr], remote: IpAddr, trusted: &TrustedProxies) -> IpAddr {
    match trusted {
        TrustedProxies::None => remote,
        TrustedProxies::All => forwarded.first().copied().unwrap_or(remote),
        TrustedProxies::Cidrs(_) => {
            if !trusted.is_trusted(remote) {
                return remote;
            }
            for hop in forwarded.iter().rev() {
                if !trusted.is_trusted(*hop) {
                    return *hop;
                }
            }
            forwarded.first().copied().unwrap_or(remote)
        }
    }
}

/// Parses a comma-separated `X-Forwarded-For` header value.
///
/// Unparseable entries are dropped rather than failing the request;
/// the resolution walk treats missing hops as untrusted anyway.
#[must_use]
pub fn parse_forwarded_for(header: &str) -> Vec<IpAddr> {
    header
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

// ============================================
// Tests
// ============================================
