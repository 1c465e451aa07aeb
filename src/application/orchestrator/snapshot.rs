//! Read-only views of orchestrator state.
//!
//! The orchestrator is the single writer of a `watch` channel holding the
//! latest [`StatusSnapshot`]. Readers never block it and never see a
//! half-applied update.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::application::broadcast::BroadcastTarget;
use crate::application::health::ProbeResult;
use crate::domain::ServiceState;

/// Latest probe, in serializable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSummary {
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl From<&ProbeResult> for ProbeSummary {
    fn from(result: &ProbeResult) -> Self {
        Self {
            healthy: result.healthy,
            latency_ms: u64::try_from(result.latency.as_millis()).unwrap_or(u64::MAX),
            status: result.status,
            detail: result.detail.clone(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub state: ServiceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub health_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exports: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe: Option<ProbeSummary>,
    /// Spawn-to-healthy time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ServiceStatus {
    /// The exported broadcast address.
    pub fn base_url(&self) -> Option<&str> {
        self.exports
            .get(crate::domain::BASE_URL_EXPORT)
            .map(String::as_str)
    }
}

/// Every handle, in launch order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub services: Vec<ServiceStatus>,
    pub shutting_down: bool,
}

impl StatusSnapshot {
    /// Status of `name`, if it was launched.
    pub fn get(&self, name: &str) -> Option<&ServiceStatus> {
        self.services.iter().find(|s| s.name == name)
    }

    /// State of `name`, if it was launched.
    pub fn state(&self, name: &str) -> Option<ServiceState> {
        self.get(name).map(|s| s.state)
    }

    /// Name to state, for compact assertions and output.
    pub fn states(&self) -> BTreeMap<String, ServiceState> {
        self.services
            .iter()
            .map(|s| (s.name.clone(), s.state))
            .collect()
    }

    /// Whether every service is healthy.
    pub fn all_healthy(&self) -> bool {
        !self.services.is_empty()
            && self
                .services
                .iter()
                .all(|s| s.state == ServiceState::Healthy)
    }

    /// Live services exporting a base URL, optionally only healthy ones.
    pub fn broadcast_targets(&self, healthy_only: bool) -> Vec<BroadcastTarget> {
        self.services
            .iter()
            .filter(|s| {
                if healthy_only {
                    s.state == ServiceState::Healthy
                } else {
                    s.state.is_live()
                }
            })
            .filter_map(|s| {
                s.base_url().map(|base| BroadcastTarget {
                    service: s.name.clone(),
                    base_url: base.to_string(),
                })
            })
            .collect()
    }
}

/// Cloneable read handle onto the orchestrator's status.
#[derive(Debug, Clone)]
pub struct StatusReader(watch::Receiver<StatusSnapshot>);

impl StatusReader {
    pub(crate) fn new(rx: watch::Receiver<StatusSnapshot>) -> Self {
        Self(rx)
    }

    /// The latest snapshot.
    pub fn current(&self) -> StatusSnapshot {
        self.0.borrow().clone()
    }

    /// Wait for the next published snapshot. Returns `None` once the
    /// orchestrator is gone.
    pub async fn changed(&mut self) -> Option<StatusSnapshot> {
        self.0.changed().await.ok()?;
        let snapshot = self.0.borrow_and_update().clone();
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(name: &str, state: ServiceState, base: Option<&str>) -> ServiceStatus {
        ServiceStatus {
            name: name.into(),
            state,
            pid: Some(42),
            started_at: None,
            health_urls: Vec::new(),
            exports: base
                .map(|b| BTreeMap::from([("base_url".to_string(), b.to_string())]))
                .unwrap_or_default(),
            last_probe: None,
            boot_ms: None,
            exit_code: None,
        }
    }

    #[test]
    fn broadcast_targets_are_live_services_with_base_url() {
        let snapshot = StatusSnapshot {
            services: vec![
                status("api", ServiceState::Healthy, Some("http://a")),
                status("ui", ServiceState::Unhealthy, Some("http://u")),
                status("worker", ServiceState::Healthy, None),
                status("old", ServiceState::Failed, Some("http://o")),
            ],
            shutting_down: false,
        };

        let all: Vec<_> = snapshot
            .broadcast_targets(false)
            .into_iter()
            .map(|t| t.service)
            .collect();
        assert_eq!(all, vec!["api", "ui"]);

        let healthy: Vec<_> = snapshot
            .broadcast_targets(true)
            .into_iter()
            .map(|t| t.service)
            .collect();
        assert_eq!(healthy, vec!["api"]);
    }

    #[test]
    fn json_omits_empty_fields() {
        let json = serde_json::to_value(status("worker", ServiceState::Starting, None)).unwrap();
        assert_eq!(json["state"], "starting");
        assert!(json.get("exports").is_none());
        assert!(json.get("last_probe").is_none());
    }
}
