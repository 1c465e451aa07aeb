//! Handler for the `broadcast` command.

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};

use crate::adapter::inbound::cli::command::BroadcastArgs;
use crate::adapter::inbound::cli::output;
use crate::adapter::inbound::cli::status::{locate, Liveness};
use crate::application::broadcast::{BroadcastStatus, TargetResult};
use crate::application::{BroadcastReport, BroadcastRequest};
use crate::error::{Error, Result};
use crate::infrastructure::bootstrap;
use crate::infrastructure::config::supervisor::BroadcastConfig;

/// Longest response body shown per target with `-v`.
const BODY_PREVIEW: usize = 400;

/// Execute the broadcast command.
///
/// Targets come from the running supervisor's status file.
pub async fn execute(status_path: &Path, defaults: &BroadcastConfig, args: &BroadcastArgs) -> Result<()> {
    let payload = args
        .body
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()?;

    let snapshot = match locate(status_path)? {
        (Liveness::Running, Some(status)) => status.snapshot,
        _ => {
            return Err(Error::InvalidState(
                "no running supervisor; start one with `runall run`".into(),
            ))
        }
    };
    let targets = snapshot.broadcast_targets(args.healthy_only);
    let deadline = args
        .timeout
        .map_or_else(|| defaults.timeout(), Duration::from_secs);

    let request = BroadcastRequest {
        method: args.method,
        path: args.path.clone(),
        payload,
    };
    let dispatcher = bootstrap::build_dispatcher()?;

    let spinner = output::spinner(&format!(
        "{} {} to {} services",
        request.method,
        request.path,
        targets.len()
    ));
    let report = dispatcher.broadcast(&request, &targets, deadline).await;
    spinner.finish_and_clear();

    if output::is_json() {
        output::json_output(&json!({
            "command": "broadcast",
            "method": request.method,
            "path": request.path,
            "report": report,
        }));
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &BroadcastReport) {
    output::header(env!("CARGO_PKG_VERSION"));
    if report.status == BroadcastStatus::NoTargets {
        output::warning("No services to broadcast to");
        output::hint("only live services exporting `base_url` are targeted");
        return;
    }

    output::section("Results");
    for (service, result) in &report.results {
        match result {
            TargetResult::Success {
                status,
                body,
                latency_ms,
            } => {
                output::field(
                    service,
                    format!("{} {}", output::positive(status), output::muted(format!("{latency_ms}ms"))),
                );
                if output::verbosity() > 0 {
                    output::note(&preview(body));
                }
            }
            TargetResult::Failure {
                kind,
                message,
                status,
            } => {
                let label = status.map_or_else(|| kind.as_str().to_string(), |code| code.to_string());
                output::field(
                    service,
                    format!("{} {}", output::negative(label), output::muted(message)),
                );
            }
        }
    }

    let summary = format!("{}/{} succeeded", report.successes(), report.results.len());
    match report.status {
        BroadcastStatus::Complete => output::success(&summary),
        _ => output::warning(&summary),
    }
}

fn preview(body: &Value) -> String {
    let text = body.to_string();
    if text.chars().count() <= BODY_PREVIEW {
        return text;
    }
    let cut: String = text.chars().take(BODY_PREVIEW).collect();
    format!("{cut}…")
}
