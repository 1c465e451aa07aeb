//! Per-service lifecycle state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one managed process.
///
/// ```text
/// Starting ──► Healthy ◄──► Unhealthy
///    │            │             │
///    ├────────────┴──► Failed ◄─┤
///    └────────────┬─────────────┘
///                 ▼
///             Stopping ──► Stopped
/// ```
///
/// `Failed` and `Stopped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Spawned, not yet confirmed healthy.
    Starting,
    /// Latest health observation succeeded (or no health URL is configured).
    Healthy,
    /// Latest steady-state probe failed.
    Unhealthy,
    /// Termination has been requested.
    Stopping,
    /// The process is gone after an orderly stop.
    Stopped,
    /// Spawn failed, the launch gate timed out, or the process exited on its own.
    Failed,
}

impl ServiceState {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Stopped)
    }

    /// Whether the service is running and not being torn down.
    ///
    /// Live services are the ones eligible for broadcast and the ones
    /// `stop` has to terminate.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Healthy | Self::Unhealthy)
    }

    /// Whether `self -> next` is an edge of the state machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ServiceState::{Failed, Healthy, Starting, Stopped, Stopping, Unhealthy};

        matches!(
            (self, next),
            (Starting, Healthy | Unhealthy | Failed | Stopping)
                | (Healthy, Unhealthy | Failed | Stopping)
                | (Unhealthy, Healthy | Failed | Stopping)
                | (Stopping, Stopped)
        )
    }

    /// Lowercase label used in logs and CLI output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
