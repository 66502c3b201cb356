//! crywrap command line tool
//!
//! This binary is the command-line interface for crywrap.

use clap::Parser;
use log::{debug, error, info};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use crywrap::common::log::effective_level;
use crywrap::common::{init_logger, parse_listen_addr, Destination, Result};
use crywrap::config::{defaults, ProxyConfig, VerifyLevel};
use crywrap::{lifecycle, APP_NAME, VERSION};

/// Grace period for blocking stdio work after the proxy has finished
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// crywrap: terminate TLS for a plaintext TCP service
///
/// Every option can also be given as a CRYWRAP_* environment variable.
/// Command line and environment values override the configuration file.
#[derive(Parser, Debug)]
#[command(name = "crywrap", version = VERSION, about, long_about = None)]
struct Args {
    /// Backend to forward to, as host/port
    #[arg(short = 'd', long, env = "CRYWRAP_DESTINATION", value_name = "HOST/PORT")]
    destination: Option<Destination>,

    /// Address to listen on, as [address]/port
    #[arg(short = 'l', long, env = "CRYWRAP_LISTEN", value_name = "[ADDR]/PORT", value_parser = parse_listen)]
    listen: Option<SocketAddr>,

    /// Server certificate chain (PEM)
    #[arg(short = 'c', long, env = "CRYWRAP_CERT", value_name = "FILE")]
    cert: Option<PathBuf>,

    /// Server private key (PEM)
    #[arg(short = 'k', long, env = "CRYWRAP_KEY", value_name = "FILE")]
    key: Option<PathBuf>,

    /// CA bundle for client certificate verification
    #[arg(short = 'z', long, env = "CRYWRAP_CA", value_name = "FILE")]
    ca: Option<PathBuf>,

    /// Anonymous Diffie-Hellman mode, no server certificate
    #[arg(short = 'a', long = "anon", env = "CRYWRAP_ANON")]
    anon: bool,

    /// Client certificate verification: 0 off, 1 if presented, 2 required
    #[arg(short = 'v', long, env = "CRYWRAP_VERIFY", value_name = "LEVEL")]
    verify: Option<VerifyLevel>,

    /// Diffie-Hellman parameters (PEM)
    #[arg(short = 'r', long = "dhparams", env = "CRYWRAP_DHPARAMS", value_name = "FILE")]
    dh_params: Option<PathBuf>,

    /// User name or uid to run as
    #[arg(short = 'u', long, env = "CRYWRAP_USER")]
    user: Option<String>,

    /// Pid file, written in standalone non-debug mode
    #[arg(short = 'P', long, env = "CRYWRAP_PIDFILE", value_name = "FILE")]
    pidfile: Option<PathBuf>,

    /// OpenSSL cipher list for TLS 1.2 and below
    #[arg(short = 'p', long, env = "CRYWRAP_PRIORITY")]
    priority: Option<String>,

    /// Serve one connection on stdin/stdout
    #[arg(short = 'i', long, env = "CRYWRAP_INETD")]
    inetd: bool,

    /// Debug mode: verbose logging, no pid file
    #[arg(short = 'D', long, env = "CRYWRAP_DEBUG")]
    debug: bool,

    /// Load configuration from a JSON file
    #[arg(long, env = "CRYWRAP_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "CRYWRAP_LOG_LEVEL")]
    log_level: Option<String>,

    /// Maximum bytes moved per relay read
    #[arg(long, env = "CRYWRAP_BUFFER_SIZE")]
    buffer_size: Option<usize>,

    /// Backend connect timeout in seconds, 0 disables it
    #[arg(long, env = "CRYWRAP_CONNECT_TIMEOUT", value_name = "SECS")]
    connect_timeout: Option<u64>,
}

fn parse_listen(s: &str) -> Result<SocketAddr> {
    parse_listen_addr(s)
}

impl Args {
    /// Layer command line and environment values over `config`
    fn apply(self, config: &mut ProxyConfig) {
        if let Some(destination) = self.destination {
            config.destination = Some(destination);
        }
        if let Some(listen) = self.listen {
            config.listen = Some(listen);
        }
        if let Some(cert) = self.cert {
            config.cert = cert;
        }
        if let Some(key) = self.key {
            config.key = key;
        }
        if let Some(ca) = self.ca {
            config.ca = Some(ca);
        }
        if let Some(verify) = self.verify {
            config.verify = verify;
        }
        if let Some(dh_params) = self.dh_params {
            config.dh_params = Some(dh_params);
        }
        if let Some(user) = self.user {
            config.user = Some(user);
        }
        if let Some(pidfile) = self.pidfile {
            config.pidfile = Some(pidfile);
        }
        if let Some(priority) = self.priority {
            config.priority = Some(priority);
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.buffer_size = buffer_size;
        }
        if let Some(connect_timeout) = self.connect_timeout {
            config.connect_timeout = connect_timeout;
        }

        // Flags only ever switch a mode on
        config.anonymous |= self.anon;
        config.inetd |= self.inetd;
        config.debug |= self.debug;
    }
}

fn load_config(args: Args) -> Result<ProxyConfig> {
    let mut config = match &args.config {
        Some(path) => ProxyConfig::from_file(path)?,
        None => ProxyConfig::default(),
    };
    args.apply(&mut config);
    Ok(config)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let fallback_level = args.log_level.clone().unwrap_or_else(defaults::log_level);

    let config = match load_config(args) {
        Ok(config) => config,
        Err(e) => {
            init_logger(&fallback_level);
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logger(effective_level(&config.log_level, config.debug));
    info!("Starting {} v{}", APP_NAME, VERSION);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }
    match serde_json::to_string(&config) {
        Ok(json) => debug!("Effective configuration: {}", json),
        Err(e) => debug!("Could not serialize configuration: {}", e),
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(lifecycle::run(config));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    match result {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
