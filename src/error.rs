use std::time::Duration;

use thiserror::Error;

use crate::domain::error::DomainError;
use crate::port::outbound::process::ProcessExit;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("failed to parse config: {0}")]
    ParseJson(#[source] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Launch-sequence failures. Each one aborts the sequence and rolls back.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("failed to spawn '{service}': {source}")]
    Spawn {
        service: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{service}' not healthy after {waited:?}{}", last_error.as_deref().map(|e| format!(" (last error: {e})")).unwrap_or_default())]
    HealthTimeout {
        service: String,
        waited: Duration,
        last_error: Option<String>,
    },

    #[error("'{service}' exited before becoming healthy ({exit})")]
    ExitedBeforeHealthy { service: String, exit: ProcessExit },
}

impl LaunchError {
    /// Name of the service the launch stopped at.
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::Spawn { service, .. }
            | Self::HealthTimeout { service, .. }
            | Self::ExitedBeforeHealthy { service, .. } => service,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("'{service}' exited unexpectedly ({exit})")]
    ServiceExited { service: String, exit: ProcessExit },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("signal error: {0}")]
    Signal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
