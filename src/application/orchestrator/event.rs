//! Messages from background tasks to the supervising orchestrator.

use crate::application::health::ProbeResult;
use crate::domain::ServiceName;
use crate::port::outbound::process::ProcessExit;

#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// A steady-state probe finished.
    Health {
        service: ServiceName,
        result: ProbeResult,
    },
    /// A managed process was reaped.
    Exited {
        service: ServiceName,
        exit: ProcessExit,
    },
}
