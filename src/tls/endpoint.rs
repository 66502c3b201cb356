//! TLS endpoint
//!
//! One server-side TLS session over an arbitrary byte transport: a TCP
//! socket in standalone mode, stdin/stdout under inetd.

use log::{debug, trace};
use openssl::ssl::{self, ErrorCode, Ssl, SslAcceptor, SslRef};
use openssl::x509::X509VerifyResult;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::time::timeout;
use tokio_openssl::SslStream;

use crate::common::{CertificateInfo, Result};
use super::cert;

/// Upper bound for a graceful close, so a stalled peer cannot hold a worker
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of checking the client certificate after a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerVerification {
    /// A certificate was presented and its chain verified
    Trusted { subject: String },
    /// A certificate was presented but did not verify
    Untrusted { subject: String, reason: String },
    /// The client sent no certificate
    NoCertificate,
}

impl PeerVerification {
    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::Trusted { .. })
    }
}

impl fmt::Display for PeerVerification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trusted { subject } => write!(f, "trusted certificate ({})", subject),
            Self::Untrusted { subject, reason } => write!(f, "untrusted certificate ({}): {}", subject, reason),
            Self::NoCertificate => write!(f, "no certificate"),
        }
    }
}

/// A failed server-side handshake
#[derive(Debug, Clone)]
pub struct HandshakeFailure {
    /// OpenSSL's diagnostic
    pub message: String,
    /// Client certificate verdict at the time of failure
    pub verify_result: X509VerifyResult,
    /// The client did not answer the certificate request
    pub certificate_missing: bool,
}

impl HandshakeFailure {
    fn new(error: &ssl::Error, ssl: &SslRef) -> Self {
        let certificate_missing = error.ssl_error()
            .map(|stack| stack.errors().iter().any(|e| {
                e.reason().is_some_and(|r| r.contains("did not return a certificate"))
            }))
            .unwrap_or(false);

        Self {
            message: error.to_string(),
            verify_result: ssl.verify_result(),
            certificate_missing,
        }
    }

    /// Whether the failure comes from client certificate policy
    pub fn is_policy_rejection(&self) -> bool {
        self.certificate_missing || self.verify_result != X509VerifyResult::OK
    }
}

impl fmt::Display for HandshakeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.verify_result != X509VerifyResult::OK {
            write!(f, "{} (certificate: {})", self.message, self.verify_result.error_string())
        } else if self.certificate_missing {
            write!(f, "{} (no client certificate)", self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

/// Server side of one TLS session
///
/// Authenticated reads and writes go through the `AsyncRead`/`AsyncWrite`
/// impls once [`handshake`](Self::handshake) has succeeded.
pub struct TlsEndpoint<S> {
    stream: SslStream<S>,
    established: bool,
    closed: bool,
}

impl<S> TlsEndpoint<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a session for `transport`; no bytes are exchanged yet
    pub fn new(acceptor: &SslAcceptor, transport: S) -> Result<Self> {
        let ssl = Ssl::new(acceptor.context())?;
        let stream = SslStream::new(ssl, transport)?;

        Ok(Self {
            stream,
            established: false,
            closed: false,
        })
    }

    /// Run the server-side handshake
    ///
    /// Would-block and interrupted results are retried; anything else is
    /// terminal. OpenSSL has already alerted the peer when this fails.
    pub async fn handshake(&mut self) -> std::result::Result<(), HandshakeFailure> {
        loop {
            match Pin::new(&mut self.stream).accept().await {
                Ok(()) => {
                    self.established = true;
                    debug!("TLS handshake completed: {}", self.session_description());
                    return Ok(());
                }
                Err(e) if is_retryable(&e) => {
                    trace!("TLS handshake interrupted, retrying: {}", e);
                }
                Err(e) => return Err(HandshakeFailure::new(&e, self.stream.ssl())),
            }
        }
    }

    /// Inspect the client certificate of an established session
    pub fn verify_peer(&self) -> PeerVerification {
        let ssl = self.stream.ssl();
        let Some(peer) = ssl.peer_certificate() else {
            return PeerVerification::NoCertificate;
        };

        let subject = cert::describe_name(peer.subject_name());
        let result = ssl.verify_result();
        if result == X509VerifyResult::OK {
            PeerVerification::Trusted { subject }
        } else {
            PeerVerification::Untrusted {
                subject,
                reason: result.error_string().to_string(),
            }
        }
    }

    /// Subject and fingerprint of the client certificate, if any
    pub fn peer_certificate_info(&self) -> Option<CertificateInfo> {
        let peer = self.stream.ssl().peer_certificate()?;
        cert::certificate_info(&peer).ok()
    }

    /// Negotiated protocol and cipher, for logging
    pub fn session_description(&self) -> String {
        let ssl = self.stream.ssl();
        let cipher = ssl.current_cipher().map(|c| c.name()).unwrap_or("none");
        format!("{} {}", ssl.version_str(), cipher)
    }

    /// Close the session
    ///
    /// Sends close_notify when the handshake completed, then shuts the
    /// transport down. Errors from a peer that already left are ignored and
    /// calls after the first do nothing.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let established = self.established;
        let stream = &mut self.stream;
        let closing = async move {
            if established {
                match stream.shutdown().await {
                    Ok(()) => return,
                    Err(e) => debug!("TLS close_notify failed: {}", e),
                }
            }
            if let Err(e) = stream.get_mut().shutdown().await {
                debug!("Transport shutdown failed: {}", e);
            }
        };

        if timeout(CLOSE_TIMEOUT, closing).await.is_err() {
            debug!("Timed out closing TLS session");
        }
    }
}

fn is_retryable(error: &ssl::Error) -> bool {
    match error.code() {
        ErrorCode::WANT_READ | ErrorCode::WANT_WRITE => true,
        _ => error.io_error().is_some_and(|e| {
            matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
        }),
    }
}

/// A TCP close without close_notify
///
/// Most clients never send close_notify; treating that as a record error
/// would turn every ordinary disconnect into a failure.
fn is_unexpected_eof(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        return true;
    }

    let Some(ssl_error) = error.get_ref().and_then(|e| e.downcast_ref::<ssl::Error>()) else {
        return false;
    };

    if ssl_error.code() == ErrorCode::SYSCALL && ssl_error.io_error().is_none() {
        return true;
    }

    ssl_error.ssl_error()
        .map(|stack| stack.errors().iter().any(|e| {
            e.reason().is_some_and(|r| r.contains("unexpected eof"))
        }))
        .unwrap_or(false)
}

impl<S> AsyncRead for TlsEndpoint<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.stream).poll_read(cx, buf) {
            Poll::Ready(Err(e)) if is_unexpected_eof(&e) => {
                trace!("Peer closed the transport without close_notify");
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl<S> AsyncWrite for TlsEndpoint<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_eof_classification() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(is_unexpected_eof(&eof));

        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(!is_unexpected_eof(&reset));
    }

    #[test]
    fn test_peer_verification_display() {
        let v = PeerVerification::Untrusted {
            subject: "CN=x".to_string(),
            reason: "self-signed certificate".to_string(),
        };
        assert_eq!(v.to_string(), "untrusted certificate (CN=x): self-signed certificate");
        assert!(!v.is_trusted());
        assert!(PeerVerification::Trusted { subject: "CN=y".to_string() }.is_trusted());
    }

    #[test]
    fn test_policy_rejection() {
        let failure = HandshakeFailure {
            message: "handshake failure".to_string(),
            verify_result: X509VerifyResult::OK,
            certificate_missing: false,
        };
        assert!(!failure.is_policy_rejection());

        let failure = HandshakeFailure { certificate_missing: true, ..failure };
        assert!(failure.is_policy_rejection());
        assert!(failure.to_string().contains("no client certificate"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut builder = SslAcceptor::mozilla_intermediate_v5(openssl::ssl::SslMethod::tls()).unwrap();
        builder.set_verify(openssl::ssl::SslVerifyMode::NONE);
        let acceptor = builder.build();

        let (server, _client) = tokio::io::duplex(1024);
        let mut endpoint = TlsEndpoint::new(&acceptor, server).unwrap();
        assert!(!endpoint.established);

        endpoint.close().await;
        assert!(endpoint.closed);
        endpoint.close().await;
        assert!(endpoint.closed);
    }
}
