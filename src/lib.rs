//! crywrap: a small standalone TLS-terminating proxy
//!
//! crywrap accepts TLS connections from clients, optionally checks their
//! certificates against a CA, and relays the decrypted bytes to a plaintext
//! TCP backend. It runs either as a standalone listener, with one task per
//! connection, or under inetd with a single connection on stdin/stdout.
//!
//! # Main Features
//!
//! - Certificate or anonymous Diffie-Hellman server credentials
//! - Client certificate verification levels: off, if presented, required
//! - Transparent, ordered relay in both directions
//! - Pid file, privilege drop and signal driven shutdown
//!
//! # Example
//!
//! ```no_run
//! use crywrap::config::ProxyConfig;
//! use crywrap::common::Destination;
//!
//! #[tokio::main]
//! async fn main() -> crywrap::Result<()> {
//!     let config = ProxyConfig {
//!         listen: Some("127.0.0.1:4433".parse().unwrap()),
//!         destination: Some(Destination::new("127.0.0.1", 8080)),
//!         anonymous: true,
//!         debug: true,
//!         ..ProxyConfig::default()
//!     };
//!     config.validate()?;
//!
//!     let status = crywrap::lifecycle::run(config).await?;
//!     std::process::exit(status);
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod lifecycle;
pub mod proxy;
pub mod tls;

// Re-export commonly used structures and functions for convenience
pub use common::{parse_listen_addr, parse_socket_addr, Destination, ProxyError, Result};
pub use config::{ProxyConfig, VerifyLevel};
pub use proxy::{Proxy, ProxyContext};
pub use tls::ServerCredentials;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
