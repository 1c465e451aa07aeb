//! Steady-state supervision loop.

use tracing::{info, warn};

use super::event::SupervisorEvent;
use super::shutdown::ShutdownReport;
use super::Orchestrator;
use crate::application::health::ProbeResult;
use crate::domain::{ServiceName, ServiceState};
use crate::error::{Error, Result};
use crate::port::outbound::process::ProcessExit;

/// Why supervision ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// SIGINT/SIGTERM or a programmatic trigger.
    ShutdownRequested,
    /// A managed process exited on its own and `stop_on_exit` is set.
    ServiceExited {
        service: String,
        exit: ProcessExit,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisionReport {
    pub reason: ExitReason,
    pub shutdown: ShutdownReport,
}

impl Orchestrator {
    /// Apply health observations and exit notifications until shutdown is
    /// requested (or a service exits, with `stop_on_exit`), then stop
    /// everything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless a completed `start` preceded it.
    pub async fn supervise(&mut self) -> Result<SupervisionReport> {
        if !self.started || self.shutting_down {
            return Err(Error::InvalidState("nothing to supervise".into()));
        }

        let mut shutdown = self.shutdown.clone();
        let reason = loop {
            let event = tokio::select! {
                biased;
                () = shutdown.requested() => {
                    info!("Shutdown signal received");
                    break ExitReason::ShutdownRequested;
                }
                event = self.events_rx.recv() => event,
            };

            // The orchestrator holds a sender, so the channel never closes.
            let Some(event) = event else { continue };
            match event {
                SupervisorEvent::Health { service, result } => self.apply_health(&service, &result),
                SupervisorEvent::Exited { service, exit } => {
                    if self.apply_exit(&service, exit) && self.settings.stop_on_exit {
                        break ExitReason::ServiceExited {
                            service: service.to_string(),
                            exit,
                        };
                    }
                }
            }
        };

        let shutdown = self.stop().await;
        Ok(SupervisionReport { reason, shutdown })
    }

    /// Flip Healthy/Unhealthy on the latest probe. Other states ignore it.
    pub(crate) fn apply_health(&mut self, service: &ServiceName, result: &ProbeResult) {
        let Some(handle) = self.handle_mut(service.as_str()) else {
            return;
        };
        let next = match (handle.state(), result.healthy) {
            (ServiceState::Healthy, false) => Some(ServiceState::Unhealthy),
            (ServiceState::Unhealthy, true) => Some(ServiceState::Healthy),
            (ServiceState::Healthy | ServiceState::Unhealthy, _) => None,
            _ => return,
        };
        handle.record_probe(result);
        if let Some(next) = next {
            if handle.transition(next).is_ok() {
                if result.healthy {
                    info!(service = %service, "Recovered");
                } else {
                    warn!(service = %service, detail = ?result.detail, "Became unhealthy");
                }
            }
        }
        self.publish();
    }

    /// Mark a live service `Failed` when its process exits. Returns whether
    /// the exit was unexpected.
    pub(crate) fn apply_exit(&mut self, service: &ServiceName, exit: ProcessExit) -> bool {
        let Some(handle) = self.handle_mut(service.as_str()) else {
            return false;
        };
        handle.record_exit(exit);
        let unexpected = handle.state().is_live();
        if unexpected && handle.transition(ServiceState::Failed).is_ok() {
            warn!(service = %service, %exit, "Service exited unexpectedly");
        }
        self.publish();
        unexpected
    }
}
