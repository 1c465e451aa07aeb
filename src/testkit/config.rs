//! Canonical test configurations.
//!
//! Single source of truth for descriptors and settings used across tests.

use std::sync::Arc;
use std::time::Duration;

use crate::application::{Orchestrator, Shutdown, SupervisorSettings};
use crate::domain::{LaunchPlan, ServiceDescriptor, ServiceName};
use crate::testkit::http::ScriptedHttpClient;
use crate::testkit::process::FakeLauncher;

/// Port a test service listens on, derived from its position.
pub fn port(index: usize) -> u16 {
    8000 + u16::try_from(index).unwrap_or(0)
}

/// Base URL of the service at `index`.
pub fn base_url(index: usize) -> String {
    format!("http://127.0.0.1:{}", port(index))
}

/// Health URL of the service at `index`.
pub fn health_url(index: usize) -> String {
    format!("{}/health", base_url(index))
}

pub fn name(name: &str) -> ServiceName {
    ServiceName::try_new(name).expect("valid service name")
}

/// A service with a health URL and a `base_url` export.
pub fn service(service: &str, index: usize) -> ServiceDescriptor {
    ServiceDescriptor::new(
        name(service),
        ".",
        format!("/usr/bin/{service}"),
        vec!["--port".to_string(), port(index).to_string()],
    )
    .with_health_url(health_url(index))
    .with_export("base_url", base_url(index))
}

/// A service with no health URL and no exports.
pub fn bare_service(service: &str) -> ServiceDescriptor {
    ServiceDescriptor::new(name(service), ".", format!("/usr/bin/{service}"), Vec::new())
}

/// A plan launching `descriptors` in the order given.
pub fn plan(descriptors: Vec<ServiceDescriptor>) -> LaunchPlan {
    let order: Vec<_> = descriptors.iter().map(|d| d.name().clone()).collect();
    LaunchPlan::new(descriptors, &order).expect("valid plan")
}

/// Short timings so paused-clock tests stay readable.
///
/// Launch timeout 10 s, poll 1 s, probe timeout 500 ms, grace 2 s, no
/// steady-state monitor.
pub fn settings() -> SupervisorSettings {
    SupervisorSettings {
        launch_timeout: Duration::from_secs(10),
        poll_interval: Duration::from_secs(1),
        probe_timeout: Duration::from_millis(500),
        grace_period: Duration::from_secs(2),
        monitor_interval: None,
        stop_on_exit: true,
    }
}

/// [`settings`] with a steady-state monitor every `every`.
pub fn monitored(every: Duration) -> SupervisorSettings {
    SupervisorSettings {
        monitor_interval: Some(every),
        ..settings()
    }
}

/// An orchestrator wired to fakes.
pub fn orchestrator(
    plan: LaunchPlan,
    settings: SupervisorSettings,
    launcher: &Arc<FakeLauncher>,
    http: &Arc<ScriptedHttpClient>,
    shutdown: Shutdown,
) -> Orchestrator {
    Orchestrator::new(plan, settings, launcher.clone(), http.clone(), shutdown)
}
