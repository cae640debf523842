//! Client identification for rate limiting.
//!
//! The client identifier is the host part of the connection's peer address
//! (`ConnectInfo<SocketAddr>`); the port is dropped so clients sharing a NAT
//! share a bucket. Serve the router with
//! `into_make_service_with_connect_info::<SocketAddr>()` to populate it.
//!
//! # Trusted Proxies
//!
//! When the peer lies inside a configured CIDR range, the first address in
//! `X-Forwarded-For` is used instead. Headers from any other peer are
//! ignored, so clients cannot pick their own bucket by spoofing the header.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::{debug, warn};

/// Header set by reverse proxies carrying the original client address.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Parsed CIDR network range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse `"10.0.0.0/8"`, `"::1/128"` or a bare address (full-length prefix).
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();
        let (addr, prefix) = match cidr.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (cidr, None),
        };

        let network: IpAddr = addr.parse().ok()?;
        let max_prefix = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix_len = match prefix {
            Some(p) => p.parse().ok().filter(|len| *len <= max_prefix)?,
            None => max_prefix,
        };

        Some(Self {
            network,
            prefix_len,
        })
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

/// Set of proxies whose forwarding headers are honoured.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    ranges: Vec<CidrRange>,
}

impl TrustedProxies {
    /// Build from CIDR strings; invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();
        Self { ranges }
    }

    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(ip))
    }
}

/// Resolve the rate-limiting key for a request.
///
/// Returns `None` when the request carries no peer address.
pub fn client_id<B>(req: &Request<B>, trusted: &TrustedProxies) -> Option<String> {
    let ConnectInfo(peer) = req.extensions().get::<ConnectInfo<SocketAddr>>()?;
    let peer_ip = peer.ip();

    if trusted.is_trusted(&peer_ip)
        && let Some(forwarded) = forwarded_client(req)
    {
        debug!(peer = %peer_ip, client = %forwarded, "Using X-Forwarded-For from trusted proxy");
        return Some(forwarded.to_string());
    }

    Some(peer_ip.to_string())
}

/// First parseable address in `X-Forwarded-For`.
fn forwarded_client<B>(req: &Request<B>) -> Option<IpAddr> {
    req.headers()
        .get(FORWARDED_FOR_HEADER)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}
