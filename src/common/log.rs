//! Logging helpers
//!
//! crywrap logs through the `log` facade; `env_logger` is the only sink.

/// Initialise the logger
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Parameters
///
/// * `level` - Default log level (error, warn, info, debug, trace)
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialisation (tests, embedding) keeps the first logger.
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Effective default level for the given settings
///
/// Debug mode never lowers an explicitly more verbose level.
pub fn effective_level(level: &str, debug: bool) -> &str {
    if debug && !matches!(level.to_ascii_lowercase().as_str(), "debug" | "trace") {
        "debug"
    } else {
        level
    }
}
