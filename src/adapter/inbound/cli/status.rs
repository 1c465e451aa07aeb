//! Handler for the `status` command.

use std::path::Path;

use chrono::Utc;
use serde_json::json;
use tabled::{Table, Tabled};

use crate::adapter::inbound::cli::output;
use crate::adapter::outbound::process::pid_alive;
use crate::application::orchestrator::ServiceStatus;
use crate::domain::ServiceState;
use crate::error::Result;
use crate::infrastructure::status_file::StatusFile;

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "PID")]
    pid: String,
    #[tabled(rename = "Uptime")]
    uptime: String,
    #[tabled(rename = "Last probe")]
    probe: String,
    #[tabled(rename = "URL")]
    url: String,
}

/// Where a status file says the supervisor is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    NotRunning,
    /// The file exists but its pid is gone.
    Stale,
    Running,
}

/// Read the status file and check its pid.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be parsed.
pub fn locate(path: &Path) -> Result<(Liveness, Option<StatusFile>)> {
    let Some(status) = StatusFile::read(path)? else {
        return Ok((Liveness::NotRunning, None));
    };
    let liveness = if pid_alive(status.pid) {
        Liveness::Running
    } else {
        Liveness::Stale
    };
    Ok((liveness, Some(status)))
}

/// Execute the status command.
pub fn execute(status_path: &Path) -> Result<()> {
    let (liveness, status) = locate(status_path)?;

    if output::is_json() {
        let state = match liveness {
            Liveness::NotRunning => "not_running",
            Liveness::Stale => "stale",
            Liveness::Running => "running",
        };
        output::json_output(&json!({
            "command": "status",
            "status_file": status_path.display().to_string(),
            "supervisor": state,
            "status": status,
        }));
        return Ok(());
    }

    output::header(env!("CARGO_PKG_VERSION"));
    let Some(status) = status else {
        output::warning("No supervisor running");
        output::hint("start one with `runall run`");
        return Ok(());
    };

    if liveness == Liveness::Stale {
        output::warning(&format!(
            "Supervisor pid {} is gone; status file is stale",
            status.pid
        ));
        output::field("Status file", status_path.display());
        return Ok(());
    }

    output::field("Supervisor", format!("pid {}", status.pid));
    output::field(
        "Running for",
        humanize(Utc::now().signed_duration_since(status.started_at)),
    );
    if let Some(config) = &status.config_path {
        output::field("Config", config.display());
    }
    if status.snapshot.shutting_down {
        output::warning("Shutdown in progress");
    }

    let healthy = status
        .snapshot
        .services
        .iter()
        .filter(|s| s.state == ServiceState::Healthy)
        .count();
    output::field(
        "Healthy",
        format!("{healthy}/{}", status.snapshot.services.len()),
    );

    let rows: Vec<ServiceRow> = status.snapshot.services.iter().map(row).collect();
    output::section("Services");
    output::block(&Table::new(rows).to_string());
    Ok(())
}

fn row(service: &ServiceStatus) -> ServiceRow {
    let state = match service.state {
        ServiceState::Healthy => output::positive(service.state),
        ServiceState::Unhealthy | ServiceState::Stopping => output::caution(service.state),
        ServiceState::Failed => output::negative(service.state),
        ServiceState::Starting | ServiceState::Stopped => output::muted(service.state),
    };
    let probe = service.last_probe.as_ref().map_or_else(
        || "-".to_string(),
        |p| match (p.healthy, p.status) {
            (true, Some(code)) => format!("{code} in {}ms", p.latency_ms),
            (true, None) => format!("ok in {}ms", p.latency_ms),
            (false, _) => p.detail.clone().unwrap_or_else(|| "failed".to_string()),
        },
    );
    ServiceRow {
        name: service.name.clone(),
        state,
        pid: service
            .pid
            .map_or_else(|| "-".to_string(), |pid| pid.to_string()),
        uptime: service.started_at.map_or_else(
            || "-".to_string(),
            |at| humanize(Utc::now().signed_duration_since(at)),
        ),
        probe,
        url: service.base_url().unwrap_or("-").to_string(),
    }
}

fn humanize(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}
