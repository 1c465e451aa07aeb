//! Handler for the `stop` command.
//!
//! Sends `SIGTERM` to the supervisor, which stops its services in reverse
//! launch order and removes the status file on the way out.

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use crate::adapter::inbound::cli::output;
use crate::adapter::inbound::cli::status::{locate, Liveness};
use crate::adapter::outbound::process::{pid_alive, request_termination};
use crate::application::clock;
use crate::error::{Error, Result};

const POLL: Duration = Duration::from_millis(200);

/// Execute the stop command.
pub async fn execute(status_path: &Path, wait: Duration) -> Result<()> {
    let (liveness, status) = locate(status_path)?;
    let pid = match (liveness, status) {
        (Liveness::Running, Some(status)) => status.pid,
        (Liveness::Stale, _) => {
            std::fs::remove_file(status_path)?;
            report("stale", None);
            output::warning("Supervisor was not running; removed stale status file");
            return Ok(());
        }
        _ => {
            report("not_running", None);
            output::warning("No supervisor running");
            return Ok(());
        }
    };

    request_termination(pid)?;
    let spinner = output::spinner(&format!("Stopping supervisor (pid {pid})"));
    if wait.is_zero() {
        output::spinner_success(&spinner, "Stop requested");
        report("requested", Some(pid));
        return Ok(());
    }

    let deadline = clock::deadline_after(Instant::now(), wait);
    while pid_alive(pid) && Instant::now() < deadline {
        tokio::time::sleep(POLL).await;
    }

    if pid_alive(pid) {
        output::spinner_fail(&spinner, &format!("Supervisor still running after {wait:?}"));
        report("timeout", Some(pid));
        return Err(Error::InvalidState(format!(
            "supervisor (pid {pid}) still running after {wait:?}"
        )));
    }
    output::spinner_success(&spinner, "Supervisor stopped");
    report("stopped", Some(pid));
    Ok(())
}

fn report(result: &str, pid: Option<u32>) {
    if output::is_json() {
        output::json_output(&json!({
            "command": "stop",
            "result": result,
            "pid": pid,
        }));
    }
}
