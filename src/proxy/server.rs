//! Proxy server module
//!
//! The listener side of the proxy: binding, the accept loop and task
//! supervision in standalone mode, or the single stdin/stdout connection
//! in inetd mode.

use log::{debug, error, info, warn};
use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};

use crate::common::{ConnectionInfo, ProxyError, Result};
use super::context::ProxyContext;
use super::handler::{handle_connection, ConnectionOutcome};
use super::stdio::StdioTransport;

/// Pending connection queue length
const LISTEN_BACKLOG: i32 = 1024;

/// Pause after a failed accept, so descriptor exhaustion does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Proxy server structure
///
/// Terminates TLS for every client and relays plaintext to the configured
/// destination. Each accepted connection runs in its own task; a failure or
/// panic in one never reaches the listener or the others.
pub struct Proxy {
    context: Arc<ProxyContext>,
}

impl Proxy {
    pub fn new(context: ProxyContext) -> Self {
        Self { context: Arc::new(context) }
    }

    pub fn context(&self) -> &ProxyContext {
        &self.context
    }

    /// Bind the listening socket
    ///
    /// `SO_REUSEADDR` is set, and IPv6 listeners also accept IPv4 clients.
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Bind`] if the socket cannot be created, bound
    /// or put into listening state.
    pub fn bind(addr: SocketAddr) -> Result<TcpListener> {
        let bind = || -> io::Result<TcpListener> {
            let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
            socket.set_reuse_address(true)?;
            if addr.is_ipv6() {
                if let Err(e) = socket.set_only_v6(false) {
                    debug!("Could not enable dual-stack on {}: {}", addr, e);
                }
            }
            socket.bind(&addr.into())?;
            socket.listen(LISTEN_BACKLOG)?;
            socket.set_nonblocking(true)?;
            TcpListener::from_std(socket.into())
        };

        bind().map_err(|source| ProxyError::Bind { addr, source })
    }

    /// Accept and serve connections until `shutdown` completes
    ///
    /// Finished connection tasks are reaped as they complete. When
    /// `shutdown` resolves the listener stops accepting and connections still
    /// in flight are detached.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let destination = self.context.connector().destination().to_string();
        info!("Proxy service started, listening on {}, forwarding to {}", listener.local_addr()?, destination);

        tokio::pin!(shutdown);
        let mut tasks = JoinSet::new();
        let mut next_id: u64 = 0;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        next_id += 1;
                        let info = ConnectionInfo::new(next_id, Some(peer), destination.as_str());
                        info!("Accepted connection {}", info);

                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Connection {}: could not set TCP_NODELAY: {}", info, e);
                        }

                        metrics::counter!("crywrap_connections_total").increment(1);
                        metrics::gauge!("crywrap_connections_active").increment(1.0);

                        let context = Arc::clone(&self.context);
                        tasks.spawn(async move { handle_connection(stream, info, &context).await });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => reap(joined),
            }
        }

        while let Some(joined) = tasks.try_join_next() {
            reap(joined);
        }
        if !tasks.is_empty() {
            info!("Detaching {} connection(s) still in progress", tasks.len());
        }
        tasks.detach_all();

        Ok(())
    }

    /// Serve the one connection inetd attached to stdin/stdout
    ///
    /// Returns the connection outcome; the process exit status follows from
    /// it.
    pub async fn run_inetd(&self) -> ConnectionOutcome {
        let peer = StdioTransport::peer_addr();
        let info = ConnectionInfo::new(1, peer, self.context.connector().destination().to_string());
        info!("Serving inetd connection {}", info);

        metrics::counter!("crywrap_connections_total").increment(1);
        handle_connection(StdioTransport::new(), info, &self.context).await
    }
}

fn reap(joined: std::result::Result<ConnectionOutcome, JoinError>) {
    metrics::gauge!("crywrap_connections_active").decrement(1.0);

    match joined {
        Ok(outcome) => {
            debug!("Connection {} finished with status {}", outcome.info, outcome.exit_code());
        }
        Err(e) if e.is_panic() => {
            error!("Connection task panicked: {}", e);
        }
        Err(e) => {
            warn!("Connection task ended abnormally: {}", e);
        }
    }
}
