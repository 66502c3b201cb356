//! Proxy service module
//!
//! This module implements the core functionality of the proxy service:
//! accepting clients, terminating TLS, enforcing client certificate
//! policy and relaying bytes to the backend.

mod backend;
mod context;
mod forwarder;
mod handler;
pub mod server;
mod stdio;

pub use backend::BackendConnector;
pub use context::ProxyContext;
pub use forwarder::{proxy_data, RelayEnd, RelayReport, RelayStats};
pub use handler::{handle_connection, ConnectionOutcome, ConnectionState, Disposition};
pub use server::Proxy;
pub use stdio::StdioTransport;
