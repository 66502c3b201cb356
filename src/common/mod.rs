//! Common module
//!
//! This module contains shared types, errors, and utility functions used throughout the application.

pub mod error;
pub mod fs;
pub mod log;
pub mod net;
pub mod types;

// Re-export commonly used types and functions
pub use error::{ProxyError, Result};
pub use fs::check_file_exists;
pub use self::log::init_logger;
pub use net::{parse_listen_addr, parse_socket_addr, Destination};
pub use types::{CertificateInfo, ConnectionInfo};
