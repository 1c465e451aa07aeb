//! OS signal handling.
//!
//! SIGINT and SIGTERM both request a graceful shutdown through a
//! [`ShutdownTrigger`]. Signals after the first are only logged.

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::ShutdownTrigger;
use crate::error::{Error, Result};

/// Install SIGINT/SIGTERM handlers that fire `trigger`.
///
/// Handlers are registered before this returns, so a signal delivered
/// right after cannot be missed.
///
/// # Errors
///
/// Returns [`Error::Signal`] if a handler cannot be installed.
pub fn install(trigger: ShutdownTrigger) -> Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())
        .map_err(|e| Error::Signal(format!("SIGINT handler: {e}")))?;
    let mut terminate = signal(SignalKind::terminate())
        .map_err(|e| Error::Signal(format!("SIGTERM handler: {e}")))?;

    Ok(tokio::spawn(async move {
        let mut received = 0u32;
        loop {
            let name = tokio::select! {
                Some(()) = interrupt.recv() => "SIGINT",
                Some(()) = terminate.recv() => "SIGTERM",
                else => break,
            };
            received += 1;
            if received == 1 {
                info!(signal = name, "Shutdown requested");
                trigger.trigger();
            } else {
                warn!(signal = name, "Shutdown already in progress");
            }
        }
    }))
}
