//! Runtime wrapper around one launched process.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::snapshot::{ProbeSummary, ServiceStatus};
use crate::application::health::ProbeResult;
use crate::domain::{DomainError, ServiceDescriptor, ServiceState};
use crate::port::outbound::process::{ManagedProcess, ProcessExit};

/// One service's process and lifecycle state. Owned by the orchestrator,
/// which is the only code allowed to move it through the state machine.
pub struct ProcessHandle {
    descriptor: ServiceDescriptor,
    process: Option<Box<dyn ManagedProcess>>,
    started_at: Option<DateTime<Utc>>,
    state: ServiceState,
    last_probe: Option<ProbeSummary>,
    boot_time: Option<Duration>,
    exit: Option<ProcessExit>,
}

impl ProcessHandle {
    /// A handle for `descriptor` (already template-resolved), in `Starting`.
    pub fn new(descriptor: ServiceDescriptor) -> Self {
        Self {
            descriptor,
            process: None,
            started_at: None,
            state: ServiceState::Starting,
            last_probe: None,
            boot_time: None,
            exit: None,
        }
    }

    /// The resolved descriptor this handle was launched from.
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Service name.
    pub fn name(&self) -> &str {
        self.descriptor.name().as_str()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Process id, once spawned.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(|p| p.pid())
    }

    /// The live process, once spawned.
    pub fn process(&self) -> Option<&dyn ManagedProcess> {
        self.process.as_deref()
    }

    /// Spawn-to-healthy time, once healthy.
    pub fn boot_time(&self) -> Option<Duration> {
        self.boot_time
    }

    /// How the process ended, once it has.
    pub fn exit(&self) -> Option<ProcessExit> {
        self.exit
    }

    pub(crate) fn attach(&mut self, process: Box<dyn ManagedProcess>) {
        self.started_at = Some(Utc::now());
        self.process = Some(process);
    }

    /// Whether the process exists and has not been reaped.
    pub fn is_running(&self) -> bool {
        self.process
            .as_ref()
            .is_some_and(|p| p.try_exit().is_none())
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidTransition`] for edges the state
    /// machine does not have; the state is left unchanged.
    pub fn transition(&mut self, next: ServiceState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                service: self.name().to_string(),
                from: self.state,
                to: next,
            });
        }
        debug!(service = %self.name(), from = %self.state, to = %next, "State transition");
        self.state = next;
        Ok(())
    }

    pub(crate) fn record_probe(&mut self, result: &ProbeResult) {
        self.last_probe = Some(ProbeSummary::from(result));
    }

    pub(crate) fn record_boot(&mut self, boot_time: Duration) {
        self.boot_time = Some(boot_time);
    }

    pub(crate) fn record_exit(&mut self, exit: ProcessExit) {
        self.exit.get_or_insert(exit);
    }

    /// Serializable view for status readers.
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            name: self.name().to_string(),
            state: self.state,
            pid: self.pid(),
            started_at: self.started_at,
            health_urls: self.descriptor.health_urls().to_vec(),
            exports: self.descriptor.exports().clone(),
            last_probe: self.last_probe.clone(),
            boot_ms: self
                .boot_time
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            exit_code: self.exit.and_then(|e| e.code),
        }
    }
}
