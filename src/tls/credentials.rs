//! Server credentials
//!
//! The TLS acceptor, built once at startup from the configured certificate
//! (or anonymous Diffie-Hellman) material and shared read-only by every
//! connection.

use log::{debug, info};
use openssl::dh::Dh;
use openssl::ssl::{SslAcceptor, SslAcceptorBuilder, SslFiletype, SslMethod, SslVerifyMode, SslVersion};
use openssl::x509::{X509Name, X509StoreContextRef};

use crate::common::fs::read_file;
use crate::common::{CertificateInfo, ProxyError, Result};
use crate::config::{ProxyConfig, VerifyLevel};
use super::cert;

/// Cipher list used in anonymous mode when no priority is configured
pub const ANON_CIPHER_LIST: &str = "aNULL:!eNULL:@SECLEVEL=0";

/// Session id context, needed for resumption with client certificates
const SESSION_ID_CONTEXT: &[u8] = b"crywrap";

/// How the server authenticates itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialMode {
    /// X.509 certificate and private key
    Certificate(CertificateInfo),
    /// Anonymous Diffie-Hellman, no server authentication
    Anonymous,
}

/// Loaded TLS credentials
pub struct ServerCredentials {
    acceptor: SslAcceptor,
    mode: CredentialMode,
    verify: VerifyLevel,
}

impl ServerCredentials {
    /// Load the credentials described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate, key, CA or DH parameter files
    /// cannot be loaded, or the cipher list is rejected by OpenSSL.
    pub fn load(config: &ProxyConfig) -> Result<Self> {
        let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;

        let mode = if config.anonymous {
            configure_anonymous(&mut builder, config)?;
            CredentialMode::Anonymous
        } else {
            configure_certificate(&mut builder, config)?
        };

        if let Some(path) = &config.dh_params {
            let pem = read_file(path, "DH parameters")?;
            let dh = Dh::params_from_pem(&pem)
                .map_err(|e| ProxyError::Certificate(format!(
                    "Failed to parse DH parameters {}: {}", path.display(), e
                )))?;
            builder.set_tmp_dh(&dh)?;
            info!("Loaded DH parameters from {}", path.display());
        }

        configure_verification(&mut builder, config)?;
        builder.set_session_id_context(SESSION_ID_CONTEXT)?;

        Ok(Self {
            acceptor: builder.build(),
            mode,
            verify: config.verify,
        })
    }

    /// Acceptor used to create per-connection sessions
    pub fn acceptor(&self) -> &SslAcceptor {
        &self.acceptor
    }

    pub fn mode(&self) -> &CredentialMode {
        &self.mode
    }

    pub fn is_anonymous(&self) -> bool {
        self.mode == CredentialMode::Anonymous
    }

    pub fn verify_level(&self) -> VerifyLevel {
        self.verify
    }
}

fn configure_anonymous(builder: &mut SslAcceptorBuilder, config: &ProxyConfig) -> Result<()> {
    // TLS 1.3 has no anonymous key exchange
    builder.set_max_proto_version(Some(SslVersion::TLS1_2))?;

    let ciphers = config.priority.as_deref().unwrap_or(ANON_CIPHER_LIST);
    builder.set_cipher_list(ciphers)
        .map_err(|e| ProxyError::Config(format!("Invalid cipher list '{}': {}", ciphers, e)))?;

    Ok(())
}

fn configure_certificate(builder: &mut SslAcceptorBuilder, config: &ProxyConfig) -> Result<CredentialMode> {
    builder.set_certificate_chain_file(&config.cert)
        .map_err(|e| ProxyError::Certificate(format!(
            "Failed to load certificate {}: {}", config.cert.display(), e
        )))?;
    builder.set_private_key_file(&config.key, SslFiletype::PEM)
        .map_err(|e| ProxyError::Certificate(format!(
            "Failed to load private key {}: {}", config.key.display(), e
        )))?;
    builder.check_private_key()
        .map_err(|e| ProxyError::Certificate(format!(
            "Private key {} does not match certificate {}: {}",
            config.key.display(), config.cert.display(), e
        )))?;

    if let Some(ciphers) = &config.priority {
        builder.set_cipher_list(ciphers)
            .map_err(|e| ProxyError::Config(format!("Invalid cipher list '{}': {}", ciphers, e)))?;
    }

    let loaded = cert::load_cert(&config.cert)?;
    Ok(CredentialMode::Certificate(cert::certificate_info(&loaded)?))
}

fn configure_verification(builder: &mut SslAcceptorBuilder, config: &ProxyConfig) -> Result<()> {
    match config.verify {
        VerifyLevel::Off => {
            info!("Client certificates not requested");
            builder.set_verify(SslVerifyMode::NONE);
            return Ok(());
        }
        VerifyLevel::IfPresent => {
            info!("Client certificates optional (verified and logged if provided)");
            // The verdict is read back after the handshake; never abort here.
            builder.set_verify_callback(SslVerifyMode::PEER, |preverify_ok, ctx| {
                log_chain_error(preverify_ok, ctx);
                true
            });
        }
        VerifyLevel::Required => {
            info!("Client certificates required (will be verified)");
            builder.set_verify_callback(
                SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT,
                |preverify_ok, ctx| {
                    log_chain_error(preverify_ok, ctx);
                    preverify_ok
                },
            );
        }
    }

    match &config.ca {
        Some(ca) => {
            builder.set_ca_file(ca)
                .map_err(|e| ProxyError::Certificate(format!(
                    "Failed to load CA file {}: {}", ca.display(), e
                )))?;
            let names = X509Name::load_client_ca_file(ca)
                .map_err(|e| ProxyError::Certificate(format!(
                    "Failed to read client CA names from {}: {}", ca.display(), e
                )))?;
            builder.set_client_ca_list(names);
            info!("Verifying client certificates against {}", ca.display());
        }
        None => builder.set_default_verify_paths()?,
    }

    Ok(())
}

fn log_chain_error(preverify_ok: bool, ctx: &mut X509StoreContextRef) {
    if !preverify_ok {
        debug!(
            "Client certificate chain error at depth {}: {}",
            ctx.error_depth(),
            ctx.error().error_string()
        );
    }
}
