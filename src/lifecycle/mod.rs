//! Process lifecycle
//!
//! Startup order, privilege drop, pid file and signal driven shutdown
//! around the proxy server.

mod pidfile;
mod privilege;
mod signal;

pub use pidfile::PidFile;
pub use privilege::{drop_privileges, resolve_user};
pub use signal::shutdown_signal;

use log::{info, warn};

use crate::common::{ProxyError, Result};
use crate::config::ProxyConfig;
use crate::proxy::{Proxy, ProxyContext};
use crate::tls::{CredentialMode, ServerCredentials};

/// Run crywrap with a validated configuration
///
/// Credentials are loaded once, before any connection is served. Returns
/// the process exit status: 0 after a signal in standalone mode, or the
/// connection's status in inetd mode.
///
/// # Errors
///
/// Fatal startup problems: credentials, pid file, bind, privilege drop or
/// signal setup.
pub async fn run(config: ProxyConfig) -> Result<i32> {
    let credentials = ServerCredentials::load(&config)?;
    match credentials.mode() {
        CredentialMode::Certificate(cert) => {
            info!("Certificate subject: {}", cert.subject);
            info!("Certificate fingerprint: {}", cert.fingerprint);
        }
        CredentialMode::Anonymous => {
            warn!("Running in anonymous mode, the server is not authenticated to clients");
        }
    }
    let proxy = Proxy::new(ProxyContext::new(config, credentials)?);

    if proxy.context().config().inetd {
        run_inetd(&proxy).await
    } else {
        run_standalone(&proxy).await
    }
}

async fn run_standalone(proxy: &Proxy) -> Result<i32> {
    let config = proxy.context().config();
    let listen = config.listen
        .ok_or_else(|| ProxyError::Config("No listen address configured".to_string()))?;

    // Handlers go in first so a signal during startup still unwinds
    let shutdown = shutdown_signal()?;

    // Removed on every exit path from here on
    let _pidfile = match &config.pidfile {
        Some(path) if config.wants_pidfile() => Some(PidFile::create(path)?),
        _ => None,
    };

    let listener = Proxy::bind(listen)?;
    switch_user(config)?;

    proxy.serve(listener, shutdown).await?;
    info!("{} stopped", crate::APP_NAME);
    Ok(0)
}

async fn run_inetd(proxy: &Proxy) -> Result<i32> {
    switch_user(proxy.context().config())?;
    Ok(proxy.run_inetd().await.exit_code())
}

fn switch_user(config: &ProxyConfig) -> Result<()> {
    match &config.user {
        Some(user) => drop_privileges(user).map(|_| ()),
        None => {
            if nix::unistd::geteuid().is_root() {
                warn!("Running as root; use --user to serve connections unprivileged");
            }
            Ok(())
        }
    }
}
