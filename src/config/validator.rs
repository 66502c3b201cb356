//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use std::path::Path;
use log::warn;

use super::error::{ConfigError, Result};
use super::{ProxyConfig, VerifyLevel};

/// Validate the configuration
pub fn validate_config(config: &ProxyConfig) -> Result<()> {
    validate_network_settings(config)?;
    validate_tls_settings(config)?;
    validate_general_settings(config)?;

    Ok(())
}

fn validate_network_settings(config: &ProxyConfig) -> Result<()> {
    if config.destination.is_none() {
        return Err(ConfigError::MissingRequiredValue("destination".to_string()));
    }

    if config.inetd {
        if config.listen.is_some() {
            warn!("Listen address is ignored in inetd mode");
        }
    } else if config.listen.is_none() {
        return Err(ConfigError::MissingRequiredValue(
            "listen (required unless running in inetd mode)".to_string()
        ));
    }

    Ok(())
}

fn validate_tls_settings(config: &ProxyConfig) -> Result<()> {
    if config.anonymous {
        // Anonymous servers cannot request a client certificate
        if config.verify != VerifyLevel::Off {
            return Err(ConfigError::InvalidCombination(
                "client certificate verification is not possible in anonymous mode".to_string()
            ));
        }
    } else {
        validate_file_exists(&config.cert, "cert")?;
        validate_file_exists(&config.key, "key")?;
    }

    if let Some(ca) = &config.ca {
        validate_file_exists(ca, "ca")?;
    } else if config.verify != VerifyLevel::Off {
        warn!("No CA file configured, client certificates are verified against the system store");
    }

    if let Some(dh) = &config.dh_params {
        validate_file_exists(dh, "dh_params")?;
    }

    if let Some(priority) = &config.priority {
        if priority.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "priority".to_string(),
                "cipher list must not be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_general_settings(config: &ProxyConfig) -> Result<()> {
    if config.buffer_size == 0 {
        return Err(ConfigError::InvalidValue(
            "buffer_size".to_string(),
            "must be greater than zero".to_string(),
        ));
    }

    if let Some(user) = &config.user {
        if user.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "user".to_string(),
                "must not be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_file_exists(path: &Path, name: &str) -> Result<()> {
    if !path.is_file() {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("file not found: {}", path.display()),
        ));
    }
    Ok(())
}
