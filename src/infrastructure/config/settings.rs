//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all settings. The
//! file is TOML, or JSON when its extension is `.json`.
//!
//! # Example
//!
//! ```no_run
//! use runall::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("runall.toml")?;
//!     config.init_logging();
//!     let plan = config.launch_plan()?;
//!     println!("{} services", plan.len());
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use super::logging::LoggingConfig;
use super::service::ServiceConfig;
use super::supervisor::{self, BroadcastConfig, MonitorConfig, SupervisorConfig};
use crate::application::{clock, SupervisorSettings};
use crate::domain::{LaunchPlan, ServiceName};
use crate::error::{ConfigError, Result};

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Order services start in. Shutdown runs in reverse.
    #[serde(default)]
    pub launch_order: Vec<String>,

    /// Service declarations keyed by name.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Directory relative working directories are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.base_dir = PathBuf::from(".");
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from JSON content.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or validation fails.
    pub fn parse_json(content: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(content).map_err(ConfigError::ParseJson)?;
        config.base_dir = PathBuf::from(".");
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The content is malformed
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let mut config = if is_json {
            Self::parse_json(&content)?
        } else {
            Self::parse_toml(&content)?
        };
        config.base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(config)
    }

    /// Initialize tracing from the `[logging]` section.
    pub fn init_logging(&self) {
        self.logging.init();
    }

    /// Validate configuration values.
    ///
    /// Checks timings, health URLs and everything [`LaunchPlan`] enforces:
    /// the launch order is a permutation of the declared services and
    /// template references only point backwards.
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(ConfigError::MissingField { field: "services" }.into());
        }
        if self.launch_order.is_empty() {
            return Err(ConfigError::MissingField {
                field: "launch_order",
            }
            .into());
        }

        let positive = [
            ("launch_timeout_secs", self.supervisor.launch_timeout_secs),
            ("poll_interval_ms", self.supervisor.poll_interval_ms),
            ("probe_timeout_ms", self.supervisor.probe_timeout_ms),
            ("timeout_secs", self.broadcast.timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than 0".to_string(),
                }
                .into());
            }
        }

        let max_secs = clock::MAX_WAIT.as_secs();
        let max_ms = max_secs.saturating_mul(1000);
        let service_timeouts = self
            .services
            .values()
            .filter_map(|s| s.launch_timeout_secs)
            .map(|secs| ("launch_timeout_secs", secs, max_secs));
        let bounded = [
            ("launch_timeout_secs", self.supervisor.launch_timeout_secs, max_secs),
            ("poll_interval_ms", self.supervisor.poll_interval_ms, max_ms),
            ("probe_timeout_ms", self.supervisor.probe_timeout_ms, max_ms),
            ("grace_period_secs", self.supervisor.grace_period_secs, max_secs),
            ("interval_secs", self.monitor.interval_secs, max_secs),
            ("timeout_secs", self.broadcast.timeout_secs, max_secs),
        ];
        for (field, value, max) in bounded.into_iter().chain(service_timeouts) {
            if value > max {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("{value} exceeds the maximum of {max}"),
                }
                .into());
            }
        }
        if self.monitor.enabled && self.monitor.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "interval_secs",
                reason: "must be greater than 0 when monitoring is enabled".to_string(),
            }
            .into());
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::InvalidValue {
                field: "format",
                reason: format!("expected 'pretty' or 'json', got '{}'", self.logging.format),
            }
            .into());
        }

        for (name, service) in &self.services {
            for url in service.all_health_urls().filter(|url| !url.contains('$')) {
                Url::parse(url).map_err(|e| ConfigError::InvalidValue {
                    field: "health_url",
                    reason: format!("service '{name}': {e}"),
                })?;
            }
        }

        self.launch_plan().map(|_| ())
    }

    /// Build the validated launch plan.
    ///
    /// # Errors
    ///
    /// Returns the first invalid service or launch-order problem.
    pub fn launch_plan(&self) -> Result<LaunchPlan> {
        let descriptors = self
            .services
            .iter()
            .map(|(name, service)| service.to_descriptor(name, &self.base_dir))
            .collect::<Result<Vec<_>>>()?;
        let order = self
            .launch_order
            .iter()
            .map(|name| ServiceName::try_new(name.as_str()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(LaunchPlan::new(descriptors, &order)?)
    }

    /// Orchestrator timing and policy from the `[supervisor]` and `[monitor]` sections.
    pub fn supervisor_settings(&self) -> SupervisorSettings {
        supervisor::supervisor_settings(&self.supervisor, &self.monitor)
    }

    /// Configured status file, if any.
    pub fn status_file(&self) -> Option<&Path> {
        self.supervisor.status_file.as_deref()
    }

    /// Render as TOML, for `config show`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Other(e.to_string()).into())
    }
}
