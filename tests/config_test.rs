//! Configuration file tests

mod common;

use std::fs;
use std::path::PathBuf;

use common::TestPki;
use crywrap::common::Destination;
use crywrap::config::{ConfigError, ProxyConfig, VerifyLevel};
use crywrap::tls::CredentialMode;
use crywrap::ServerCredentials;

fn write_config(dir: &tempfile::TempDir, json: &str) -> PathBuf {
    let path = dir.path().join("crywrap.json");
    fs::write(&path, json).unwrap();
    path
}

#[test]
fn test_load_full_file() {
    let pki = TestPki::generate();
    let json = format!(
        r#"{{
            "listen": "127.0.0.1/4433",
            "destination": "backend.local/8080",
            "cert": "{}",
            "key": "{}",
            "ca": "{}",
            "verify": 2,
            "priority": "HIGH:!aNULL",
            "user": "nobody",
            "buffer_size": 4096,
            "connect_timeout": 0
        }}"#,
        pki.server_cert.display(),
        pki.server_key.display(),
        pki.ca_cert.display()
    );
    let path = write_config(&pki.dir, &json);

    let config = ProxyConfig::from_file(&path).unwrap();
    assert_eq!(config.listen, Some("127.0.0.1:4433".parse().unwrap()));
    assert_eq!(config.destination, Some(Destination::new("backend.local", 8080)));
    assert_eq!(config.verify, VerifyLevel::Required);
    assert_eq!(config.user.as_deref(), Some("nobody"));
    assert_eq!(config.buffer_size, 4096);
    assert_eq!(config.connect_timeout(), None);
    assert!(config.validate().is_ok());

    let credentials = ServerCredentials::load(&config).unwrap();
    match credentials.mode() {
        CredentialMode::Certificate(info) => assert!(info.subject.contains("CN=localhost")),
        other => panic!("expected certificate mode, got {:?}", other),
    }
    assert_eq!(credentials.verify_level(), VerifyLevel::Required);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, r#"{ "destination": "127.0.0.1/80", "anonymous": true, "inetd": true }"#);

    let config = ProxyConfig::from_file(&path).unwrap();
    let defaults = ProxyConfig::default();
    assert_eq!(config.buffer_size, defaults.buffer_size);
    assert_eq!(config.verify, VerifyLevel::Off);
    assert_eq!(config.listen, None);
    assert!(!config.wants_pidfile());
    assert!(config.validate().is_ok());
}

#[test]
fn test_verify_level_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, r#"{ "verify": "optional" }"#);

    let config = ProxyConfig::from_file(&path).unwrap();
    assert_eq!(config.verify, VerifyLevel::IfPresent);
}

#[test]
fn test_unknown_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, r#"{ "destination": "127.0.0.1/80", "hybrid_mode": true }"#);

    assert!(matches!(ProxyConfig::from_file(&path), Err(ConfigError::FileReadError(..))));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");

    assert!(matches!(ProxyConfig::from_file(&path), Err(ConfigError::FileNotFound(_))));
}

#[test]
fn test_anonymous_with_verification_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, r#"{ "listen": "/4433", "destination": "127.0.0.1/80", "anonymous": true, "verify": 2 }"#);

    let config = ProxyConfig::from_file(&path).unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::InvalidCombination(_))));
}
