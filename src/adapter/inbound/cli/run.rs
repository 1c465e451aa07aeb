//! Handler for the `run` command.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tabled::{Table, Tabled};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::adapter::inbound::cli::command::RunArgs;
use crate::adapter::inbound::cli::{output, paths};
use crate::adapter::outbound::process::pid_alive;
use crate::application::orchestrator::{
    ExitReason, LaunchOutcome, LaunchReport, StatusReader, StopOutcome, SupervisionReport,
};
use crate::application::Shutdown;
use crate::domain::{ServiceName, ServiceState};
use crate::error::{Error, Result};
use crate::infrastructure::config::settings::Config;
use crate::infrastructure::status_file::{StatusFile, StatusWriter};
use crate::infrastructure::{bootstrap, signal};

#[derive(Tabled)]
struct AccessRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "PID")]
    pid: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Ready in")]
    ready_in: String,
}

/// Execute the run command.
pub async fn execute(config_path: &Path, args: &RunArgs) -> Result<()> {
    let mut config = Config::load(config_path)?;
    apply_overrides(&mut config, args);
    config.init_logging();

    let subset = args
        .services
        .iter()
        .map(|name| ServiceName::try_new(name.as_str()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let status_path = paths::status_file(args.status_file.as_deref(), Some(&config));
    ensure_not_running(&status_path)?;

    let (trigger, shutdown) = Shutdown::channel();
    let signals = signal::install(trigger)?;
    let mut orchestrator = bootstrap::build_orchestrator(&config, shutdown)?;

    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Config", config_path.display());
    output::field("Services", orchestrator.plan().len());
    if output::verbosity() > 0 {
        output::field("Status file", status_path.display());
    }

    let writer = Arc::new(StatusWriter::new(
        status_path,
        Some(config_path.to_path_buf()),
    ));
    writer.write()?;

    let progress = output::spinner("Starting services");
    let status_task = spawn_status_task(
        Arc::clone(&writer),
        orchestrator.status_reader(),
        progress.clone(),
    );

    let launch = orchestrator.start(&subset).await;
    let outcome = match launch {
        Ok(report) if report.outcome == LaunchOutcome::Completed => {
            output::spinner_success(
                &progress,
                &format!("Started {} services", report.services.len()),
            );
            print_access_table(&report);
            supervise(&mut orchestrator).await
        }
        Ok(_) => {
            output::spinner_fail(&progress, "Launch cancelled");
            Ok(())
        }
        Err(e) => {
            let message = match &e {
                Error::Launch(launch) => format!("Launch failed at {}", launch.service()),
                _ => "Launch failed".to_string(),
            };
            output::spinner_fail(&progress, &message);
            print_final_states(&orchestrator.status());
            Err(e)
        }
    };

    status_task.abort();
    let _ = status_task.await;
    if let Err(e) = writer.remove() {
        warn!(error = %e, path = %writer.path().display(), "Failed to remove status file");
    }
    signals.abort();

    outcome
}

fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs || output::is_json() {
        config.logging.format = "json".to_string();
    }
    if args.no_monitor {
        config.monitor.enabled = false;
    }
    if args.keep_going {
        config.supervisor.stop_on_exit = false;
    }
}

/// Refuse to start while another live supervisor owns the status file.
fn ensure_not_running(status_path: &Path) -> Result<()> {
    if let Some(existing) = StatusFile::read(status_path)? {
        if existing.pid != std::process::id() && pid_alive(existing.pid) {
            return Err(Error::InvalidState(format!(
                "another supervisor (pid {}) is running; see `runall status`",
                existing.pid
            )));
        }
    }
    Ok(())
}

/// Mirror every snapshot to the status file and the launch spinner.
fn spawn_status_task(
    writer: Arc<StatusWriter>,
    mut reader: StatusReader,
    progress: indicatif::ProgressBar,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(snapshot) = reader.changed().await {
            if let Some(starting) = snapshot
                .services
                .iter()
                .rev()
                .find(|s| s.state == ServiceState::Starting)
            {
                progress.set_message(format!("Starting {}", starting.name));
            }
            if let Err(e) = writer.update(snapshot) {
                warn!(error = %e, path = %writer.path().display(), "Failed to write status file");
            }
        }
    })
}

async fn supervise(orchestrator: &mut crate::application::Orchestrator) -> Result<()> {
    output::hint("press Ctrl-C to stop");
    let report = orchestrator.supervise().await?;
    print_shutdown(&report);

    match report.reason {
        ExitReason::ShutdownRequested => Ok(()),
        ExitReason::ServiceExited { service, exit } => Err(Error::ServiceExited { service, exit }),
    }
}

fn print_access_table(report: &LaunchReport) {
    let services: Vec<_> = report
        .services
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "pid": s.pid,
                "boot_ms": u64::try_from(s.boot_time.as_millis()).unwrap_or(u64::MAX),
                "exports": s.exports,
            })
        })
        .collect();
    output::event("ready", json!({ "services": services }));

    let rows: Vec<AccessRow> = report
        .services
        .iter()
        .map(|s| AccessRow {
            service: s.name.clone(),
            pid: s.pid.map_or_else(|| "-".to_string(), |pid| pid.to_string()),
            url: s
                .exports
                .get(crate::domain::BASE_URL_EXPORT)
                .cloned()
                .unwrap_or_else(|| "-".to_string()),
            ready_in: format_duration(s.boot_time),
        })
        .collect();

    output::section("Access");
    output::block(&Table::new(rows).to_string());
}

fn print_shutdown(report: &SupervisionReport) {
    let reason = match &report.reason {
        ExitReason::ShutdownRequested => json!({ "kind": "shutdown_requested" }),
        ExitReason::ServiceExited { service, exit } => json!({
            "kind": "service_exited",
            "service": service,
            "exit": exit.to_string(),
        }),
    };
    output::event(
        "stopped",
        json!({ "reason": reason, "services": report.shutdown.stopped }),
    );

    output::section("Shutdown");
    match &report.reason {
        ExitReason::ShutdownRequested => output::note("shutdown requested"),
        ExitReason::ServiceExited { service, exit } => {
            output::warning(&format!("{service} exited unexpectedly ({exit})"));
        }
    }
    for stopped in &report.shutdown.stopped {
        let outcome = match stopped.outcome {
            StopOutcome::Graceful => output::positive("stopped"),
            StopOutcome::Forced => output::caution("killed after grace period"),
            StopOutcome::AlreadyExited => output::muted("already exited"),
        };
        output::field(&stopped.name, outcome);
    }
}

fn print_final_states(snapshot: &crate::application::StatusSnapshot) {
    for service in &snapshot.services {
        let state = match service.state {
            ServiceState::Failed => output::negative(service.state),
            state => output::muted(state),
        };
        output::field(&service.name, state);
    }
}

fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_secs(1) {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}
