//! Shared, read-only state handed to every connection

use crate::common::{ProxyError, Result};
use crate::config::ProxyConfig;
use crate::tls::ServerCredentials;
use super::backend::BackendConnector;

/// Everything a connection task needs, built once at startup
///
/// Never mutated after construction; tasks hold it through an `Arc`.
pub struct ProxyContext {
    config: ProxyConfig,
    credentials: ServerCredentials,
    connector: BackendConnector,
}

impl ProxyContext {
    /// Bundle the configuration and loaded credentials
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration has no destination.
    pub fn new(config: ProxyConfig, credentials: ServerCredentials) -> Result<Self> {
        let destination = config.destination.clone()
            .ok_or_else(|| ProxyError::Config("No destination configured".to_string()))?;
        let connector = BackendConnector::new(destination, config.connect_timeout());

        Ok(Self { config, credentials, connector })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn credentials(&self) -> &ServerCredentials {
        &self.credentials
    }

    pub fn connector(&self) -> &BackendConnector {
        &self.connector
    }
}
