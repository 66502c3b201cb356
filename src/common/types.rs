//! Shared types module
//!
//! This module contains shared data types and structures used throughout the application.

use std::fmt;
use std::net::SocketAddr;

/// Connection information
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Connection number, unique within one listener
    pub id: u64,
    /// Client address, unknown for some inetd transports
    pub peer: Option<SocketAddr>,
    /// Backend destination as configured
    pub target: String,
}

impl ConnectionInfo {
    pub fn new(id: u64, peer: Option<SocketAddr>, target: impl Into<String>) -> Self {
        Self {
            id,
            peer,
            target: target.into(),
        }
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peer {
            Some(peer) => write!(f, "#{} ({})", self.id, peer),
            None => write!(f, "#{} (unknown peer)", self.id),
        }
    }
}

/// Certificate information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Certificate subject
    pub subject: String,
    /// SHA-256 fingerprint
    pub fingerprint: String,
}
