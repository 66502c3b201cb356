//! Backend connector
//!
//! Opens the plaintext TCP connection to the configured destination.

use log::{debug, trace};
use std::io;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

use crate::common::{Destination, ProxyError, Result};

/// Connects to one fixed destination
#[derive(Debug, Clone)]
pub struct BackendConnector {
    destination: Destination,
    connect_timeout: Option<Duration>,
}

impl BackendConnector {
    pub fn new(destination: Destination, connect_timeout: Option<Duration>) -> Self {
        Self { destination, connect_timeout }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Resolve the destination and connect
    ///
    /// Every resolved address (IPv4 and IPv6) is tried in order. Resolution
    /// failures, refusals and timeouts all surface as
    /// [`ProxyError::BackendConnect`].
    pub async fn connect(&self) -> Result<TcpStream> {
        let attempt = self.try_connect();
        let result = match self.connect_timeout {
            Some(limit) => match timeout(limit, attempt).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connection timed out after {}s", limit.as_secs()),
                )),
            },
            None => attempt.await,
        };

        result.map_err(|source| ProxyError::BackendConnect {
            destination: self.destination.to_string(),
            source,
        })
    }

    async fn try_connect(&self) -> io::Result<TcpStream> {
        let addrs = lookup_host((self.destination.host.as_str(), self.destination.port)).await?;

        let mut last_error = None;
        for addr in addrs {
            trace!("Connecting to backend address {}", addr);
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!("Connected to backend {} ({})", self.destination, addr);
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("Backend address {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "destination resolved to no addresses")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connector = BackendConnector::new(Destination::new("127.0.0.1", port), Some(Duration::from_secs(5)));
        let stream = connector.connect().await.unwrap();
        let (_accepted, peer) = listener.accept().await.unwrap();
        assert_eq!(stream.local_addr().unwrap(), peer);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let connector = BackendConnector::new(Destination::new("127.0.0.1", port), None);
        match connector.connect().await {
            Err(ProxyError::BackendConnect { destination, .. }) => {
                assert_eq!(destination, format!("127.0.0.1:{}", port));
            }
            other => panic!("expected backend connect error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_connect_unresolvable() {
        let connector = BackendConnector::new(Destination::new("host.invalid", 80), Some(Duration::from_secs(10)));
        assert!(matches!(connector.connect().await, Err(ProxyError::BackendConnect { .. })));
    }
}
