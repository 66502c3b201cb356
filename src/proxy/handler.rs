//! Connection handler module
//!
//! This module handles individual client connections: TLS handshake,
//! client certificate policy, backend connect, relay and teardown. Each
//! connection is owned by exactly one task and nothing in it is shared.

use log::{debug, error, info, trace, warn};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::common::ConnectionInfo;
use crate::config::VerifyLevel;
use crate::tls::{PeerVerification, TlsEndpoint};
use super::context::ProxyContext;
use super::forwarder::{proxy_data, RelayEnd, RelayStats};

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    Handshaking,
    HandshakeFailed,
    Rejected,
    Verified,
    BackendConnecting,
    BackendFailed,
    Relaying,
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::HandshakeFailed | Self::Rejected | Self::BackendFailed | Self::Closed
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Accepted => "accepted",
            Self::Handshaking => "handshaking",
            Self::HandshakeFailed => "handshake failed",
            Self::Rejected => "rejected",
            Self::Verified => "verified",
            Self::BackendConnecting => "connecting to backend",
            Self::BackendFailed => "backend failed",
            Self::Relaying => "relaying",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// How a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Relayed until an ordinary close
    Succeeded,
    /// Refused by client certificate policy
    Rejected,
    /// Handshake, backend or relay I/O failure
    Failed,
}

impl Disposition {
    /// Exit status for a worker that served this connection
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::Failed => 1,
            Self::Rejected => 2,
        }
    }
}

/// Final report for one connection
#[derive(Debug)]
pub struct ConnectionOutcome {
    pub info: ConnectionInfo,
    /// Terminal state reached
    pub state: ConnectionState,
    /// Client certificate verdict, when verification ran
    pub verification: Option<PeerVerification>,
    /// Why the relay stopped, when it ran
    pub relay_end: Option<RelayEnd>,
    pub stats: RelayStats,
}

impl ConnectionOutcome {
    pub fn disposition(&self) -> Disposition {
        match self.state {
            ConnectionState::Rejected => Disposition::Rejected,
            ConnectionState::Closed if !self.relay_end.as_ref().is_some_and(RelayEnd::is_error) => {
                Disposition::Succeeded
            }
            _ => Disposition::Failed,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.disposition().exit_code()
    }
}

/// One client connection and the resources it owns
struct Connection<S> {
    info: ConnectionInfo,
    state: ConnectionState,
    client: Option<TlsEndpoint<S>>,
    backend: Option<TcpStream>,
    verification: Option<PeerVerification>,
    relay_end: Option<RelayEnd>,
    stats: RelayStats,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(info: ConnectionInfo) -> Self {
        Self {
            info,
            state: ConnectionState::Accepted,
            client: None,
            backend: None,
            verification: None,
            relay_end: None,
            stats: RelayStats::default(),
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        trace!("Connection {}: {} -> {}", self.info, self.state, next);
        self.state = next;
    }

    async fn run(&mut self, transport: S, ctx: &ProxyContext) {
        self.transition(ConnectionState::Handshaking);

        let endpoint = match TlsEndpoint::new(ctx.credentials().acceptor(), transport) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                error!("Connection {}: could not create TLS session: {}", self.info, e);
                self.transition(ConnectionState::HandshakeFailed);
                return;
            }
        };

        let client = self.client.insert(endpoint);
        if let Err(failure) = client.handshake().await {
            if ctx.config().verify == VerifyLevel::Required && failure.is_policy_rejection() {
                warn!("Connection {}: client certificate rejected: {}", self.info, failure);
                self.transition(ConnectionState::Rejected);
            } else {
                error!("Connection {}: TLS handshake failed: {}", self.info, failure);
                self.transition(ConnectionState::HandshakeFailed);
            }
            return;
        }
        info!("Connection {}: TLS established ({})", self.info, client.session_description());

        if !self.check_peer(ctx.config().verify) {
            self.transition(ConnectionState::Rejected);
            return;
        }
        self.transition(ConnectionState::Verified);

        self.transition(ConnectionState::BackendConnecting);
        match ctx.connector().connect().await {
            Ok(backend) => self.backend = Some(backend),
            Err(e) => {
                error!("Connection {}: {}", self.info, e);
                self.transition(ConnectionState::BackendFailed);
                return;
            }
        }

        self.transition(ConnectionState::Relaying);
        if let (Some(client), Some(backend)) = (self.client.as_mut(), self.backend.as_mut()) {
            let report = proxy_data(client, backend, ctx.config().buffer_size).await;
            self.relay_end = Some(report.end);
            self.stats = report.stats;
        }
        self.transition(ConnectionState::Closed);
    }

    /// Apply client certificate policy; `false` rejects the connection
    fn check_peer(&mut self, level: VerifyLevel) -> bool {
        if level == VerifyLevel::Off {
            return true;
        }

        let verdict = self.client.as_ref()
            .map(TlsEndpoint::verify_peer)
            .unwrap_or(PeerVerification::NoCertificate);

        let allowed = match (&verdict, level) {
            (PeerVerification::Trusted { subject }, _) => {
                info!("Connection {}: client certificate accepted: {}", self.info, subject);
                true
            }
            (_, VerifyLevel::IfPresent) => {
                info!("Connection {}: client presented {}, allowed at verify level 1", self.info, verdict);
                true
            }
            _ => {
                warn!("Connection {}: client presented {}, rejected", self.info, verdict);
                false
            }
        };

        if let Some(cert) = self.client.as_ref().and_then(TlsEndpoint::peer_certificate_info) {
            debug!("Connection {}: client certificate fingerprint {}", self.info, cert.fingerprint);
        }

        self.verification = Some(verdict);
        allowed
    }

    /// Close the TLS side first, then the backend; repeat calls do nothing
    async fn teardown(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.close().await;
        }
        if let Some(mut backend) = self.backend.take() {
            if let Err(e) = backend.shutdown().await {
                debug!("Connection {}: backend shutdown failed: {}", self.info, e);
            }
        }
    }

    fn into_outcome(self) -> ConnectionOutcome {
        ConnectionOutcome {
            info: self.info,
            state: self.state,
            verification: self.verification,
            relay_end: self.relay_end,
            stats: self.stats,
        }
    }
}

/// Handle a single client connection end to end
///
/// # Parameters
///
/// * `transport` - Raw client transport, TLS not yet started
/// * `info` - Connection identity for logging
/// * `ctx` - Shared configuration and credentials
///
/// Never fails: every problem is logged and reflected in the returned
/// outcome, and both transports are closed before returning.
pub async fn handle_connection<S>(transport: S, info: ConnectionInfo, ctx: &ProxyContext) -> ConnectionOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = Connection::new(info);
    conn.run(transport, ctx).await;
    debug_assert!(conn.state.is_terminal(), "connection ended in state {}", conn.state);
    conn.teardown().await;

    let outcome = conn.into_outcome();
    record_outcome(&outcome);
    outcome
}

fn record_outcome(outcome: &ConnectionOutcome) {
    metrics::counter!("crywrap_bytes_to_backend_total").increment(outcome.stats.client_to_backend);
    metrics::counter!("crywrap_bytes_to_client_total").increment(outcome.stats.backend_to_client);

    match outcome.disposition() {
        Disposition::Succeeded => {
            info!(
                "Connection {} closed: {}; {} bytes to backend, {} bytes to client",
                outcome.info,
                outcome.relay_end.as_ref().map(ToString::to_string).unwrap_or_default(),
                outcome.stats.client_to_backend,
                outcome.stats.backend_to_client
            );
        }
        Disposition::Rejected => {
            metrics::counter!("crywrap_connections_rejected_total").increment(1);
            info!("Connection {} rejected", outcome.info);
        }
        Disposition::Failed => {
            metrics::counter!("crywrap_connections_failed_total").increment(1);
            match &outcome.relay_end {
                Some(end) => warn!("Connection {} failed during relay: {}", outcome.info, end),
                None => info!("Connection {} failed: {}", outcome.info, outcome.state),
            }
        }
    }
}
