//! Client address handling
//!
//! Addresses are normalized once (`parse_ip`) and networks are parsed once at
//! startup (`IpNetwork`), so per-request checks are plain integer comparisons.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use actix_web::HttpRequest;
use actix_web::http::header::HeaderMap;
use tracing::debug;

/// Private (RFC 1918 / ULA), link-local or loopback address.
pub fn is_private_or_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Parses `ip` or `ip:port`; IPv4-mapped IPv6 addresses are folded to IPv4.
pub fn parse_ip(text: &str) -> Option<IpAddr> {
    let text = text.trim();
    let ip = match text.parse::<SocketAddr>() {
        Ok(socket_addr) => socket_addr.ip(),
        Err(_) => text.parse::<IpAddr>().ok()?,
    };
    Some(ip.to_canonical())
}

/// An address block in CIDR notation. A bare address is a single-host block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidNetwork(String);

impl fmt::Display for InvalidNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid network '{}'", self.0)
    }
}

impl std::error::Error for InvalidNetwork {}

impl IpNetwork {
    pub fn host(addr: IpAddr) -> Self {
        let addr = addr.to_canonical();
        Self {
            addr,
            prefix: max_prefix(&addr),
        }
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                (u32::from(net) & mask) == (u32::from(ip) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                (u128::from(net) & mask) == (u128::from(ip) & mask)
            }
            _ => false,
        }
    }
}

fn max_prefix(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

impl FromStr for IpNetwork {
    type Err = InvalidNetwork;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let invalid = || InvalidNetwork(text.to_string());

        let Some((addr, prefix)) = text.split_once('/') else {
            return parse_ip(text).map(Self::host).ok_or_else(invalid);
        };

        let addr = addr.trim().parse::<IpAddr>().map_err(|_| invalid())?;
        let prefix = prefix.trim().parse::<u8>().map_err(|_| invalid())?;
        if prefix > max_prefix(&addr) {
            return Err(invalid());
        }
        Ok(Self { addr, prefix })
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Parses the trusted proxy list; the first invalid entry is an error.
pub fn parse_networks(entries: &[String]) -> Result<Vec<IpNetwork>, InvalidNetwork> {
    entries.iter().map(|entry| entry.parse::<IpNetwork>()).collect()
}

/// First address of `X-Forwarded-For`, else `X-Real-IP`.
pub fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let first_forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(parse_ip);

    first_forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .and_then(parse_ip)
    })
}

/// Resolves the client address from the peer and forwarding headers.
///
/// Forwarding headers are honoured only when the peer is a trusted proxy, or,
/// when no proxies are configured, when the peer is a private address.
pub fn resolve_client_ip(
    peer: IpAddr,
    headers: &HeaderMap,
    trusted_proxies: &[IpNetwork],
) -> IpAddr {
    let peer_is_proxy = if trusted_proxies.is_empty() {
        is_private_or_local(&peer)
    } else {
        trusted_proxies.iter().any(|net| net.contains(&peer))
    };

    if !peer_is_proxy {
        return peer;
    }

    match forwarded_ip(headers) {
        Some(client) => {
            debug!("Forwarded request via {}: client {}", peer, client);
            client
        }
        None => peer,
    }
}

/// Client address for an actix request; `None` when the peer is unknown.
pub fn extract_client_ip(req: &HttpRequest, trusted_proxies: &[IpNetwork]) -> Option<IpAddr> {
    let peer = req.connection_info().peer_addr().and_then(parse_ip)?;
    Some(resolve_client_ip(peer, req.headers(), trusted_proxies))
}
