//! Default configuration values
//!
//! Single source of truth for defaults, shared by serde, clap and
//! `ProxyConfig::default()`.

use std::path::PathBuf;

use super::VerifyLevel;

/// Default server certificate path
pub const CERT_PATH_STR: &str = "/etc/crywrap/cert.pem";

/// Default server private key path
pub const KEY_PATH_STR: &str = "/etc/crywrap/key.pem";

/// Default pid file path
pub const PIDFILE_STR: &str = "/var/run/crywrap.pid";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default relay chunk size (64 KiB)
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Default backend connect timeout in seconds
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default certificate path
pub fn cert_path() -> PathBuf {
    PathBuf::from(CERT_PATH_STR)
}

/// Default private key path
pub fn key_path() -> PathBuf {
    PathBuf::from(KEY_PATH_STR)
}

/// Default pid file
pub fn pidfile() -> Option<PathBuf> {
    Some(PathBuf::from(PIDFILE_STR))
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default client verification level
pub fn verify_level() -> VerifyLevel {
    VerifyLevel::Off
}

/// Default buffer size
pub fn buffer_size() -> usize {
    BUFFER_SIZE
}

/// Default backend connect timeout
pub fn connect_timeout() -> u64 {
    CONNECT_TIMEOUT_SECS
}
