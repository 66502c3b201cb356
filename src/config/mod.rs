//! Configuration module
//!
//! This module handles application configuration: the immutable
//! `ProxyConfig` shared by every connection, its defaults, loading from a
//! JSON file, and validation. Command line and environment handling lives in
//! the binary, which layers its overrides on top of the file.

pub mod defaults;
mod error;
mod validator;

pub use self::error::ConfigError;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::common::{parse_listen_addr, Destination, ProxyError};

/// Custom deserializer for listen addresses
fn deserialize_listen<'de, D>(deserializer: D) -> std::result::Result<Option<SocketAddr>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    s.map(|s| parse_listen_addr(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Client certificate verification level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerifyLevel {
    /// Don't request client certificates (0)
    Off,
    /// Verify the client certificate if provided, but never reject (1)
    IfPresent,
    /// Require a trusted client certificate (2)
    Required,
}

impl VerifyLevel {
    /// Numeric level as used on the command line
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::IfPresent => 1,
            Self::Required => 2,
        }
    }
}

impl Default for VerifyLevel {
    #[inline]
    fn default() -> Self {
        defaults::verify_level()
    }
}

impl fmt::Display for VerifyLevel {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "0 (off)"),
            Self::IfPresent => write!(f, "1 (verify if present)"),
            Self::Required => write!(f, "2 (required)"),
        }
    }
}

impl FromStr for VerifyLevel {
    type Err = ProxyError;

    #[inline]
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "0" | "none" | "off" => Ok(Self::Off),
            "1" | "optional" => Ok(Self::IfPresent),
            "2" | "required" => Ok(Self::Required),
            _ => Err(ProxyError::Config(format!(
                "Invalid verify level: {}. Valid values are: 0 (none), 1 (optional), 2 (required)",
                s
            ))),
        }
    }
}

impl TryFrom<u64> for VerifyLevel {
    type Error = ProxyError;

    fn try_from(level: u64) -> std::result::Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::Off),
            1 => Ok(Self::IfPresent),
            2 => Ok(Self::Required),
            _ => Err(ProxyError::Config(format!(
                "Invalid verify level: {}. Valid values are 0, 1 and 2",
                level
            ))),
        }
    }
}

impl Serialize for VerifyLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

// Accepts both numbers and strings
impl<'de> Deserialize<'de> for VerifyLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => VerifyLevel::try_from(n).map_err(serde::de::Error::custom),
            Raw::Text(s) => VerifyLevel::from_str(&s).map_err(serde::de::Error::custom),
        }
    }
}

/// Proxy configuration
///
/// Built once at startup and read-only afterwards; connection tasks share it
/// through an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct ProxyConfig {
    // --- Network settings ---

    /// Listen address, required unless running under inetd
    #[serde(deserialize_with = "deserialize_listen")]
    pub listen: Option<SocketAddr>,

    /// Backend to forward plaintext traffic to
    pub destination: Option<Destination>,

    // --- TLS settings ---

    /// Server certificate chain (PEM)
    pub cert: PathBuf,

    /// Server private key (PEM)
    pub key: PathBuf,

    /// CA bundle used to verify client certificates
    pub ca: Option<PathBuf>,

    /// Anonymous Diffie-Hellman mode, no server certificate
    pub anonymous: bool,

    /// Diffie-Hellman parameters (PEM), replacing the built-in group
    pub dh_params: Option<PathBuf>,

    /// OpenSSL cipher list
    ///
    /// Applies to TLS 1.2 and below. TLS 1.3 suites keep OpenSSL's defaults
    /// in certificate mode; anonymous mode never negotiates TLS 1.3.
    pub priority: Option<String>,

    /// Client certificate verification level
    pub verify: VerifyLevel,

    // --- Process settings ---

    /// User name or numeric uid to switch to after startup
    pub user: Option<String>,

    /// Pid file, only written in standalone non-debug mode
    pub pidfile: Option<PathBuf>,

    /// Serve a single connection on stdin/stdout
    pub inetd: bool,

    /// Stay in the foreground with verbose logging, no pid file
    pub debug: bool,

    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,

    /// Maximum number of bytes moved per relay read
    pub buffer_size: usize,

    /// Backend connect timeout in seconds, 0 disables it
    pub connect_timeout: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: None,
            destination: None,
            cert: defaults::cert_path(),
            key: defaults::key_path(),
            ca: None,
            anonymous: false,
            dh_params: None,
            priority: None,
            verify: defaults::verify_level(),
            user: None,
            pidfile: defaults::pidfile(),
            inetd: false,
            debug: false,
            log_level: defaults::log_level(),
            buffer_size: defaults::buffer_size(),
            connect_timeout: defaults::connect_timeout(),
        }
    }
}

impl ProxyConfig {
    /// Load a configuration file (JSON)
    ///
    /// Missing keys keep their defaults; unknown keys are rejected.
    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).format(::config::FileFormat::Json))
            .build()
            .map_err(|e| ConfigError::FileReadError(path.to_path_buf(), e.to_string()))?;

        settings
            .try_deserialize::<ProxyConfig>()
            .map_err(|e| ConfigError::FileReadError(path.to_path_buf(), e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        validator::validate_config(self)
    }

    /// Backend connect timeout, `None` when disabled
    pub fn connect_timeout(&self) -> Option<Duration> {
        match self.connect_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Whether a pid file should be maintained for this run
    pub fn wants_pidfile(&self) -> bool {
        !self.inetd && !self.debug && self.pidfile.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();

        assert_eq!(config.listen, None);
        assert_eq!(config.destination, None);
        assert_eq!(config.verify, VerifyLevel::Off);
        assert_eq!(config.buffer_size, 64 * 1024);
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.log_level, "info");
        assert!(config.wants_pidfile());
    }

    #[test]
    fn test_verify_level_from_str() {
        assert_eq!(VerifyLevel::from_str("0").unwrap(), VerifyLevel::Off);
        assert_eq!(VerifyLevel::from_str("Optional").unwrap(), VerifyLevel::IfPresent);
        assert_eq!(VerifyLevel::from_str("2").unwrap(), VerifyLevel::Required);
        assert_eq!(VerifyLevel::from_str("REQUIRED").unwrap(), VerifyLevel::Required);
        assert!(VerifyLevel::from_str("3").is_err());
        assert!(VerifyLevel::try_from(3u64).is_err());
    }

    #[test]
    fn test_deserialize_json() {
        let json = r#"{
            "listen": "127.0.0.1/4443",
            "destination": "localhost/143",
            "verify": 1,
            "anonymous": false,
            "buffer_size": 4096,
            "connect_timeout": 0
        }"#;

        let config: ProxyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.listen, Some("127.0.0.1:4443".parse().unwrap()));
        assert_eq!(config.destination, Some(Destination::new("localhost", 143)));
        assert_eq!(config.verify, VerifyLevel::IfPresent);
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.connect_timeout(), None);

        let config: ProxyConfig = serde_json::from_str(r#"{"verify": "required"}"#).unwrap();
        assert_eq!(config.verify, VerifyLevel::Required);

        assert!(serde_json::from_str::<ProxyConfig>(r#"{"unknown": true}"#).is_err());
    }

    #[test]
    fn test_wants_pidfile() {
        let mut config = ProxyConfig::default();
        config.debug = true;
        assert!(!config.wants_pidfile());

        config.debug = false;
        config.inetd = true;
        assert!(!config.wants_pidfile());

        config.inetd = false;
        config.pidfile = None;
        assert!(!config.wants_pidfile());
    }
}
