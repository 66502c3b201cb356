//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// crywrap error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// OpenSSL error
    #[error("OpenSSL error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Certificate error
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// The backend could not be resolved or connected to
    #[error("Could not connect to backend {destination}: {source}")]
    BackendConnect {
        destination: String,
        #[source]
        source: io::Error,
    },

    /// The listening socket could not be set up
    #[error("Could not listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Another instance owns the pid file
    #[error("Pid file {} already exists, is crywrap already running?", .0.display())]
    AlreadyRunning(PathBuf),

    /// Pid file bookkeeping failed
    #[error("Pid file error: {0}")]
    PidFile(String),

    /// Switching to the unprivileged user failed
    #[error("Privilege drop failed: {0}")]
    Privilege(String),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;
