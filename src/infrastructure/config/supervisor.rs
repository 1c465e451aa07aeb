//! `[supervisor]`, `[monitor]` and `[broadcast]` sections.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::SupervisorSettings;

/// Launch gating and teardown timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// How long a service may take to become healthy.
    pub launch_timeout_secs: u64,
    /// Delay between launch-time health probes.
    pub poll_interval_ms: u64,
    /// Timeout of a single health probe.
    pub probe_timeout_ms: u64,
    /// Time between SIGTERM and SIGKILL on shutdown.
    pub grace_period_secs: u64,
    /// Stop everything when one service exits on its own.
    pub stop_on_exit: bool,
    /// Where the running supervisor publishes its state.
    /// Defaults to `~/.runall/status.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_file: Option<PathBuf>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            launch_timeout_secs: 90,
            poll_interval_ms: 1500,
            probe_timeout_ms: 3000,
            grace_period_secs: 8,
            stop_on_exit: true,
            status_file: None,
        }
    }
}

/// Steady-state health monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
        }
    }
}

/// Broadcast defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BroadcastConfig {
    /// Overall deadline for one broadcast.
    pub timeout_secs: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl BroadcastConfig {
    /// Default broadcast deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Combine the timing sections into orchestrator settings.
pub fn supervisor_settings(supervisor: &SupervisorConfig, monitor: &MonitorConfig) -> SupervisorSettings {
    SupervisorSettings {
        launch_timeout: Duration::from_secs(supervisor.launch_timeout_secs),
        poll_interval: Duration::from_millis(supervisor.poll_interval_ms),
        probe_timeout: Duration::from_millis(supervisor.probe_timeout_ms),
        grace_period: Duration::from_secs(supervisor.grace_period_secs),
        monitor_interval: monitor
            .enabled
            .then(|| Duration::from_secs(monitor.interval_secs)),
        stop_on_exit: supervisor.stop_on_exit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_orchestrator_defaults() {
        let settings = supervisor_settings(&SupervisorConfig::default(), &MonitorConfig::default());
        assert_eq!(settings, SupervisorSettings::default());
    }

    #[test]
    fn disabled_monitor_has_no_interval() {
        let monitor = MonitorConfig {
            enabled: false,
            interval_secs: 5,
        };
        let settings = supervisor_settings(&SupervisorConfig::default(), &monitor);
        assert_eq!(settings.monitor_interval, None);
    }
}
