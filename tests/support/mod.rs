#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use runall::application::{Orchestrator, Shutdown, ShutdownTrigger, SupervisorSettings};
use runall::domain::ServiceDescriptor;
use runall::testkit::config;
use runall::testkit::http::{Route, ScriptedHttpClient};
use runall::testkit::process::FakeLauncher;

/// An orchestrator wired to fakes, plus the handles tests drive it with.
pub struct Harness {
    pub launcher: Arc<FakeLauncher>,
    pub http: Arc<ScriptedHttpClient>,
    pub trigger: ShutdownTrigger,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(services: Vec<ServiceDescriptor>, settings: SupervisorSettings) -> Self {
        let launcher = Arc::new(FakeLauncher::new());
        let http = Arc::new(ScriptedHttpClient::new());
        let (trigger, shutdown) = Shutdown::channel();
        let orchestrator =
            config::orchestrator(config::plan(services), settings, &launcher, &http, shutdown);
        Self {
            launcher,
            http,
            trigger,
            orchestrator,
        }
    }

    /// Every service from [`config::service`] answers its health check.
    pub fn all_healthy(names: &[&str], settings: SupervisorSettings) -> Self {
        let harness = Self::new(
            names
                .iter()
                .enumerate()
                .map(|(i, name)| config::service(name, i))
                .collect(),
            settings,
        );
        for i in 0..names.len() {
            harness.http.route(config::health_url(i), Route::ok());
        }
        harness
    }

    pub fn state(&self, service: &str) -> Option<runall::domain::ServiceState> {
        self.orchestrator.status().state(service)
    }
}

/// Write `contents` to `name` inside `dir`.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write temp file");
    path
}

/// A two-service config that passes validation without running anything.
pub const MINIMAL_TOML: &str = r#"
launch_order = ["api", "ui"]

[services.api]
working_directory = "api"
executable = "true"
health_url = "http://127.0.0.1:8000/health"
exports = { base_url = "http://127.0.0.1:8000" }

[services.ui]
executable = "true"
env = { API = "${api.base_url}" }
"#;
