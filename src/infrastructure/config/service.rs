//! `[services.<name>]` tables.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{ServiceDescriptor, ServiceName};
use crate::error::{ConfigError, Result};

/// How to launch and health-check one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Directory the process runs in. Relative paths are taken from the
    /// config file's directory.
    #[serde(default = "default_working_directory")]
    pub working_directory: String,

    /// Program to run. Bare names are looked up on `PATH`.
    pub executable: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// `GET` endpoint that answers 2xx once the service is ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_url: Option<String>,

    /// Fallback endpoints, tried in order after `health_url`. Any one
    /// answering 2xx counts as healthy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub health_urls: Vec<String>,

    /// Values later services can reference as `${<name>.<key>}`.
    /// `base_url` is also the address broadcasts are sent to.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exports: BTreeMap<String, String>,

    /// Extra environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Overrides `[supervisor].launch_timeout_secs` for this service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_timeout_secs: Option<u64>,
}

fn default_working_directory() -> String {
    ".".to_string()
}

impl ServiceConfig {
    /// `health_url` followed by `health_urls`, in probe order.
    pub fn all_health_urls(&self) -> impl Iterator<Item = &String> {
        self.health_url.iter().chain(&self.health_urls)
    }

    /// Convert into a domain descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid name, an empty executable or a zero
    /// launch timeout.
    pub fn to_descriptor(&self, name: &str, base_dir: &Path) -> Result<ServiceDescriptor> {
        let name = ServiceName::try_new(name)?;
        if self.executable.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "executable",
            }
            .into());
        }

        let mut descriptor = ServiceDescriptor::new(
            name,
            resolve_directory(&self.working_directory, base_dir),
            self.executable.clone(),
            self.args.clone(),
        );
        for url in self.all_health_urls() {
            descriptor = descriptor.with_health_url(url.clone());
        }
        for (key, value) in &self.exports {
            descriptor = descriptor.with_export(key.clone(), value.clone());
        }
        for (key, value) in &self.env {
            descriptor = descriptor.with_env(key.clone(), value.clone());
        }
        if let Some(secs) = self.launch_timeout_secs {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "launch_timeout_secs",
                    reason: "must be greater than 0".to_string(),
                }
                .into());
            }
            descriptor = descriptor.with_launch_timeout(Duration::from_secs(secs));
        }
        Ok(descriptor)
    }
}

/// Anchor a relative directory at `base_dir`. Templated paths are left for
/// launch-time resolution.
fn resolve_directory(dir: &str, base_dir: &Path) -> String {
    let path = Path::new(dir);
    if path.is_absolute() || dir.starts_with('$') {
        dir.to_string()
    } else {
        base_dir.join(path).to_string_lossy().into_owned()
    }
}
