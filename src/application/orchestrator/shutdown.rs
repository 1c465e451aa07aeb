//! Reverse-order teardown.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::{Orchestrator, ProcessHandle};
use crate::application::clock;
use crate::domain::ServiceState;
use crate::port::outbound::process::wait_for_exit;

/// How long to wait for the reaper after `SIGKILL`.
const KILL_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Exited within the grace period after `SIGTERM`.
    Graceful,
    /// Still running after the grace period and killed.
    Forced,
    /// Had already exited before the stop began.
    AlreadyExited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoppedService {
    pub name: String,
    pub outcome: StopOutcome,
}

/// Services touched by one `stop`, in the order they were stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub stopped: Vec<StoppedService>,
}

impl ShutdownReport {
    /// Services that needed `SIGKILL`.
    pub fn forced(&self) -> impl Iterator<Item = &str> {
        self.stopped
            .iter()
            .filter(|s| s.outcome == StopOutcome::Forced)
            .map(|s| s.name.as_str())
    }
}

impl Orchestrator {
    /// Stop every running service in reverse launch order.
    ///
    /// Live services go `Stopping` then `Stopped`. Services already marked
    /// `Failed` whose process is still alive (a missed health gate) are
    /// terminated too but stay `Failed`. Each process gets `SIGTERM`, then
    /// `SIGKILL` if it outlives the grace period. Calling `stop` again is a
    /// no-op.
    pub async fn stop(&mut self) -> ShutdownReport {
        if !self.shutting_down {
            info!("Stopping services");
        }
        self.shutting_down = true;
        self.tasks.abort_all();
        self.publish();

        let grace = clock::bounded(self.settings.grace_period);
        let mut report = ShutdownReport::default();

        for index in (0..self.handles.len()).rev() {
            let state = self.handles[index].state();
            let live = state.is_live();
            if !live && !(state == ServiceState::Failed && self.handles[index].is_running()) {
                continue;
            }

            if live {
                if let Err(e) = self.handles[index].transition(ServiceState::Stopping) {
                    warn!(error = %e, "Skipping stop");
                    continue;
                }
                self.publish();
            }

            let outcome = terminate(&mut self.handles[index], grace).await;
            let handle = &mut self.handles[index];
            if live {
                if let Err(e) = handle.transition(ServiceState::Stopped) {
                    warn!(error = %e, "Unexpected state after stop");
                }
            }
            info!(service = %handle.name(), ?outcome, "Stopped");
            report.stopped.push(StoppedService {
                name: handle.name().to_string(),
                outcome,
            });
            self.publish();
        }

        report
    }
}

async fn terminate(handle: &mut ProcessHandle, grace: Duration) -> StopOutcome {
    let Some(process) = handle.process() else {
        return StopOutcome::AlreadyExited;
    };
    if let Some(exit) = process.try_exit() {
        handle.record_exit(exit);
        return StopOutcome::AlreadyExited;
    }

    if let Err(e) = process.terminate() {
        warn!(service = %handle.name(), error = %e, "Failed to send SIGTERM");
    }

    let (outcome, exit) = match tokio::time::timeout(grace, wait_for_exit(process.exit_watch())).await {
        Ok(Some(exit)) => (StopOutcome::Graceful, Some(exit)),
        _ => {
            warn!(
                service = %handle.name(),
                grace = ?grace,
                "Did not exit within grace period, killing"
            );
            if let Err(e) = process.kill() {
                warn!(service = %handle.name(), error = %e, "Failed to send SIGKILL");
            }
            let exit = tokio::time::timeout(KILL_WAIT, wait_for_exit(process.exit_watch()))
                .await
                .ok()
                .flatten();
            (StopOutcome::Forced, exit)
        }
    };

    if let Some(exit) = exit {
        handle.record_exit(exit);
    }
    outcome
}
