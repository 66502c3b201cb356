//! Data forwarding module
//!
//! The relay loop between the decrypted client side and the plaintext
//! backend. Both reads are polled from one task; whichever side becomes
//! readable first has its chunk written out in full before the loop waits
//! again, so each direction stays ordered.

use log::{debug, trace};
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Byte counters for one relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes read from the client and written to the backend
    pub client_to_backend: u64,
    /// Bytes read from the backend and written to the client
    pub backend_to_client: u64,
}

/// Why a relay stopped
#[derive(Debug)]
pub enum RelayEnd {
    /// The client closed its side
    ClientClosed,
    /// The backend closed its side
    BackendClosed,
    /// Reading from or writing to the client failed
    ClientError(io::Error),
    /// Reading from or writing to the backend failed
    BackendError(io::Error),
}

impl RelayEnd {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::ClientError(_) | Self::BackendError(_))
    }
}

impl fmt::Display for RelayEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientClosed => write!(f, "client closed the connection"),
            Self::BackendClosed => write!(f, "backend closed the connection"),
            Self::ClientError(e) => write!(f, "client error: {}", e),
            Self::BackendError(e) => write!(f, "backend error: {}", e),
        }
    }
}

/// Result of [`proxy_data`]
#[derive(Debug)]
pub struct RelayReport {
    pub end: RelayEnd,
    pub stats: RelayStats,
}

/// Forward data between two streams until either side ends
///
/// # Parameters
///
/// * `client` - Decrypted client stream
/// * `backend` - Plaintext backend stream
/// * `chunk_size` - Maximum bytes moved per read
///
/// Neither stream is closed here; the caller owns teardown. There is no idle
/// timeout.
pub async fn proxy_data<C, B>(client: &mut C, backend: &mut B, chunk_size: usize) -> RelayReport
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let chunk_size = chunk_size.max(1);
    let mut client_buf = vec![0u8; chunk_size];
    let mut backend_buf = vec![0u8; chunk_size];
    let mut stats = RelayStats::default();

    // `read` is cancel safe, so the losing branch drops no data. A TLS read
    // drains already-decrypted records before touching the socket.
    let end = loop {
        tokio::select! {
            read = client.read(&mut client_buf) => match read {
                Ok(0) => break RelayEnd::ClientClosed,
                Ok(n) => {
                    trace!("client -> backend: {} bytes", n);
                    if let Err(e) = write_chunk(backend, &client_buf[..n]).await {
                        break RelayEnd::BackendError(e);
                    }
                    stats.client_to_backend += n as u64;
                }
                Err(e) => break RelayEnd::ClientError(e),
            },
            read = backend.read(&mut backend_buf) => match read {
                Ok(0) => break RelayEnd::BackendClosed,
                Ok(n) => {
                    trace!("backend -> client: {} bytes", n);
                    if let Err(e) = write_chunk(client, &backend_buf[..n]).await {
                        break RelayEnd::ClientError(e);
                    }
                    stats.backend_to_client += n as u64;
                }
                Err(e) => break RelayEnd::BackendError(e),
            },
        }
    };

    debug!(
        "Relay finished ({}): {} bytes to backend, {} bytes to client",
        end, stats.client_to_backend, stats.backend_to_client
    );

    RelayReport { end, stats }
}

/// Write a whole chunk, looping over partial writes
async fn write_chunk<W>(writer: &mut W, chunk: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(chunk).await?;
    writer.flush().await
}
