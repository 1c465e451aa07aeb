//! Cooperative shutdown signal.
//!
//! A thin wrapper over `watch::channel(false)`. The trigger side is fed by
//! OS signals in the CLI and by tests directly.

use tokio::sync::watch;

/// Sending half. Dropping it without triggering never requests shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger(watch::Sender<bool>);

impl ShutdownTrigger {
    /// Request shutdown. Later calls are no-ops.
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

/// Receiving half, cloned into every task that must stop on request.
#[derive(Debug, Clone)]
pub struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    /// A connected trigger and listener pair.
    #[must_use]
    pub fn channel() -> (ShutdownTrigger, Self) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger(tx), Self(rx))
    }

    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self(rx)
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once shutdown is requested. Pends forever if the trigger is
    /// dropped first.
    pub async fn requested(&mut self) {
        if self.0.wait_for(|requested| *requested).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
