//! Termination signals

use log::info;
use std::future::Future;
use tokio::signal::unix::{signal, SignalKind};

use crate::common::Result;

/// Install SIGTERM, SIGINT and SIGQUIT handlers
///
/// The handlers are registered before this returns; the future completes on
/// the first of those signals.
pub fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;

    Ok(async move {
        let name = tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
            _ = quit.recv() => "SIGQUIT",
        };
        info!("Received {}, shutting down", name);
    })
}
