//! Composition root: wires configuration to concrete adapters.

use std::sync::Arc;

use tracing::info;

use super::config::settings::Config;
use super::network;
use crate::adapter::outbound::http::ReqwestHttpClient;
use crate::adapter::outbound::process::UnixProcessLauncher;
use crate::application::{BroadcastDispatcher, Orchestrator, Shutdown};
use crate::error::Result;
use crate::port::outbound::http::HttpClient;
use crate::port::outbound::process::ProcessLauncher;

/// Build the HTTP client shared by probes and broadcasts.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client() -> Result<Arc<dyn HttpClient>> {
    Ok(Arc::new(ReqwestHttpClient::new()?))
}

/// Build an orchestrator for `config` backed by real processes and HTTP.
///
/// # Errors
///
/// Returns an error if the launch plan is invalid or the HTTP client
/// cannot be built.
pub fn build_orchestrator(config: &Config, shutdown: Shutdown) -> Result<Orchestrator> {
    let plan = config.launch_plan()?;
    let settings = config.supervisor_settings();
    let launcher: Arc<dyn ProcessLauncher> = Arc::new(UnixProcessLauncher::new());
    let builtins = network::builtins();

    info!(
        services = plan.len(),
        lan_ip = builtins.get("lan_ip").map(String::as_str).unwrap_or("-"),
        launch_timeout = ?settings.launch_timeout,
        grace_period = ?settings.grace_period,
        "Orchestrator configured"
    );

    Ok(
        Orchestrator::new(plan, settings, launcher, build_http_client()?, shutdown)
            .with_builtins(builtins),
    )
}

/// Build a dispatcher for out-of-process broadcasts.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn build_dispatcher() -> Result<BroadcastDispatcher> {
    Ok(BroadcastDispatcher::new(build_http_client()?))
}
