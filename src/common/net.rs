//! Network utility functions
//!
//! Address notation follows crywrap's command line: `host/port` is accepted
//! alongside the usual `host:port` and `[v6]:port` forms.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use super::error::{ProxyError, Result};

/// Address bound when a listen address omits the host (`/443`)
pub const ANY_ADDRESS: &str = "0.0.0.0";

/// Parse a socket address
///
/// # Arguments
///
/// * `addr` - The address string to parse
///
/// # Returns
///
/// The parsed `SocketAddr`
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    // Try direct parsing first
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    // Try using ToSocketAddrs trait
    match addr.to_socket_addrs() {
        Ok(mut addrs) => {
            if let Some(addr) = addrs.next() {
                Ok(addr)
            } else {
                Err(ProxyError::Config(format!("Failed to parse address: {}", addr)))
            }
        }
        Err(e) => Err(ProxyError::Config(format!("Failed to parse address {}: {}", addr, e))),
    }
}

/// Parse a listen address
///
/// Accepts `[address]/port`, `/port` (any IPv4 address), or anything
/// [`parse_socket_addr`] understands.
pub fn parse_listen_addr(input: &str) -> Result<SocketAddr> {
    let Some((host, port)) = input.rsplit_once('/') else {
        return parse_socket_addr(input);
    };

    let port = parse_port(port, input)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = if host.is_empty() { ANY_ADDRESS } else { host };

    (host, port)
        .to_socket_addrs()
        .map_err(|e| ProxyError::Config(format!("Failed to parse address {}: {}", input, e)))?
        .next()
        .ok_or_else(|| ProxyError::Config(format!("Failed to parse address: {}", input)))
}

fn parse_port(port: &str, input: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|_| ProxyError::Config(format!("Invalid port in address: {}", input)))
}

/// Backend destination
///
/// The host is kept unresolved; it is looked up each time a backend
/// connection is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Host name or literal address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Destination {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Destination {
    type Err = ProxyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (host, port) = if let Some((host, port)) = s.rsplit_once('/') {
            (host, port)
        } else if let Some(rest) = s.strip_prefix('[') {
            // [v6]:port
            rest.split_once("]:")
                .ok_or_else(|| ProxyError::Config(format!("Invalid destination: {}", s)))?
        } else {
            s.rsplit_once(':')
                .ok_or_else(|| ProxyError::Config(format!(
                    "Invalid destination: {}. Expected host/port or host:port", s
                )))?
        };

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(ProxyError::Config(format!("Missing host in destination: {}", s)));
        }

        Ok(Self::new(host, parse_port(port, s)?))
    }
}

impl Serialize for Destination {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Destination {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Destination::from_str(&s).map_err(serde::de::Error::custom)
    }
}
