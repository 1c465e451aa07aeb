//! Fan-out of one request to every live service.
//!
//! Per-target failures are data, never errors: the report always comes
//! back, classified per service, once every request has finished or the
//! caller's deadline has passed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::application::clock;
use crate::port::outbound::http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, TransportError,
};

/// Token in a path template replaced by the target's base URL.
pub const BASE_TOKEN: &str = "{base}";

/// Longest body excerpt kept in a failure message.
const EXCERPT_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastTarget {
    pub service: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastRequest {
    pub method: HttpMethod,
    /// Relative path (joined to the base URL) or a template containing
    /// [`BASE_TOKEN`].
    pub path: String,
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ConnectionRefused,
    Timeout,
    /// Non-2xx response.
    Status,
    /// 2xx response whose body is not JSON.
    Malformed,
    /// Any other client-side failure, including an unusable URL.
    Transport,
}

impl FailureKind {
    /// Stable label used in JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionRefused => "connection_refused",
            Self::Timeout => "timeout",
            Self::Status => "status",
            Self::Malformed => "malformed",
            Self::Transport => "transport",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TargetResult {
    Success {
        status: u16,
        body: Value,
        latency_ms: u64,
    },
    Failure {
        kind: FailureKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
}

impl TargetResult {
    /// Whether the target answered 2xx.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Why the target failed, if it did.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
            status: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStatus {
    /// Every target succeeded.
    Complete,
    /// Some targets succeeded.
    Partial,
    /// No target succeeded.
    Failed,
    /// There was nothing to send to.
    NoTargets,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub status: BroadcastStatus,
    pub results: BTreeMap<String, TargetResult>,
}

impl BroadcastReport {
    /// Targets that answered 2xx.
    pub fn successes(&self) -> usize {
        self.results.values().filter(|r| r.is_success()).count()
    }

    /// Targets that did not.
    pub fn failures(&self) -> usize {
        self.results.len() - self.successes()
    }

    fn from_results(results: BTreeMap<String, TargetResult>) -> Self {
        let ok = results.values().filter(|r| r.is_success()).count();
        let status = match (results.len(), ok) {
            (0, _) => BroadcastStatus::NoTargets,
            (n, ok) if ok == n => BroadcastStatus::Complete,
            (_, 0) => BroadcastStatus::Failed,
            _ => BroadcastStatus::Partial,
        };
        Self { status, results }
    }
}

/// Build the URL for one target.
///
/// # Errors
///
/// Returns a message when the result is not a valid absolute URL.
pub fn render_target_url(base_url: &str, path: &str) -> Result<String, String> {
    let url = if path.contains(BASE_TOKEN) {
        path.replace(BASE_TOKEN, base_url.trim_end_matches('/'))
    } else if path.is_empty() {
        base_url.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };
    Url::parse(&url).map_err(|e| format!("invalid URL '{url}': {e}"))?;
    Ok(url)
}

fn excerpt(response: &HttpResponse) -> String {
    response.text().trim().chars().take(EXCERPT_LIMIT).collect()
}

fn classify(outcome: Result<HttpResponse, TransportError>, latency: Duration) -> TargetResult {
    match outcome {
        Ok(response) if response.is_success() => {
            let body = if response.body.iter().all(u8::is_ascii_whitespace) {
                Ok(Value::Null)
            } else {
                serde_json::from_slice(&response.body)
            };
            match body {
                Ok(body) => TargetResult::Success {
                    status: response.status,
                    body,
                    latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                },
                Err(e) => TargetResult::Failure {
                    kind: FailureKind::Malformed,
                    message: format!("response is not JSON: {e}"),
                    status: Some(response.status),
                },
            }
        }
        Ok(response) => TargetResult::Failure {
            kind: FailureKind::Status,
            message: excerpt(&response),
            status: Some(response.status),
        },
        Err(TransportError::ConnectionRefused(message)) => {
            TargetResult::failure(FailureKind::ConnectionRefused, message)
        }
        Err(TransportError::Timeout) => {
            TargetResult::failure(FailureKind::Timeout, "request timed out")
        }
        Err(TransportError::Other(message)) => {
            TargetResult::failure(FailureKind::Transport, message)
        }
    }
}

/// Sends one logical request to many services concurrently.
pub struct BroadcastDispatcher {
    client: Arc<dyn HttpClient>,
}

impl BroadcastDispatcher {
    /// A dispatcher sending through `client`.
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }

    /// Send `request` to every target and collect the results.
    ///
    /// Returns once all targets have answered or `deadline` has elapsed;
    /// targets still pending at the deadline are recorded as timeouts.
    pub async fn broadcast(
        &self,
        request: &BroadcastRequest,
        targets: &[BroadcastTarget],
        deadline: Duration,
    ) -> BroadcastReport {
        let deadline = clock::bounded(deadline);
        let deadline_at = clock::deadline_after(Instant::now(), deadline);
        let mut results = BTreeMap::new();
        let mut in_flight = JoinSet::new();

        for target in targets {
            let url = match render_target_url(&target.base_url, &request.path) {
                Ok(url) => url,
                Err(message) => {
                    results.insert(
                        target.service.clone(),
                        TargetResult::failure(FailureKind::Transport, message),
                    );
                    continue;
                }
            };
            let http = HttpRequest {
                method: request.method,
                url,
                body: request.payload.clone(),
                timeout: deadline,
            };
            let client = self.client.clone();
            let service = target.service.clone();
            debug!(service = %service, url = %http.url, method = %http.method, "Broadcasting");
            in_flight.spawn(async move {
                let started = Instant::now();
                let outcome = client.send(http).await;
                (service, classify(outcome, started.elapsed()))
            });
        }

        loop {
            match tokio::time::timeout_at(deadline_at, in_flight.join_next()).await {
                Ok(Some(Ok((service, result)))) => {
                    results.insert(service, result);
                }
                Ok(Some(Err(e))) => warn!(error = %e, "Broadcast task failed"),
                Ok(None) => break,
                Err(_) => {
                    in_flight.abort_all();
                    break;
                }
            }
        }

        for target in targets {
            results.entry(target.service.clone()).or_insert_with(|| {
                TargetResult::failure(
                    FailureKind::Timeout,
                    format!("no response within {deadline:?}"),
                )
            });
        }

        let report = BroadcastReport::from_results(results);
        info!(
            targets = targets.len(),
            ok = report.successes(),
            failed = report.failures(),
            status = ?report.status,
            "Broadcast finished"
        );
        report
    }
}
