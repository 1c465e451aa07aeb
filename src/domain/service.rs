//! Service descriptors: how to launch and health-check one process.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::error::DomainError;
use super::id::ServiceName;
use super::template::{self, Bindings, Reference};

/// Export key holding the address broadcasts are sent to.
pub const BASE_URL_EXPORT: &str = "base_url";

/// Immutable declaration of one manageable process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    name: ServiceName,
    working_directory: PathBuf,
    executable: String,
    arguments: Vec<String>,
    health_urls: Vec<String>,
    exports: BTreeMap<String, String>,
    env: BTreeMap<String, String>,
    launch_timeout: Option<Duration>,
}

impl ServiceDescriptor {
    /// Create a descriptor with no health URLs, exports or extra environment.
    pub fn new(
        name: ServiceName,
        working_directory: impl Into<PathBuf>,
        executable: impl Into<String>,
        arguments: Vec<String>,
    ) -> Self {
        Self {
            name,
            working_directory: working_directory.into(),
            executable: executable.into(),
            arguments,
            health_urls: Vec::new(),
            exports: BTreeMap::new(),
            env: BTreeMap::new(),
            launch_timeout: None,
        }
    }

    /// Add a health endpoint. Endpoints are tried in the order added and the
    /// first healthy answer counts.
    #[must_use]
    pub fn with_health_url(mut self, url: impl Into<String>) -> Self {
        self.health_urls.push(url.into());
        self
    }

    /// Add a value later services can reference as `${<name>.<key>}`.
    #[must_use]
    pub fn with_export(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.exports.insert(key.into(), value.into());
        self
    }

    /// Add an environment variable for the child.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Override the supervisor's launch timeout for this service.
    #[must_use]
    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = Some(timeout);
        self
    }

    /// Unique service name.
    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    /// Directory the process runs in.
    pub fn working_directory(&self) -> &PathBuf {
        &self.working_directory
    }

    /// Program to run.
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Arguments passed to the program.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Health endpoints in probe order. Empty means healthy on spawn.
    pub fn health_urls(&self) -> &[String] {
        &self.health_urls
    }

    /// Values published to later services once this one is healthy.
    pub fn exports(&self) -> &BTreeMap<String, String> {
        &self.exports
    }

    /// Extra environment variables.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Per-service override of the supervisor's launch timeout.
    pub fn launch_timeout(&self) -> Option<Duration> {
        self.launch_timeout
    }

    /// The exported broadcast address, if any.
    pub fn base_url(&self) -> Option<&str> {
        self.exports.get(BASE_URL_EXPORT).map(String::as_str)
    }

    /// Executable and arguments joined for display.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.as_str())
            .chain(self.arguments.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn templated_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            (
                "working_directory",
                self.working_directory.to_string_lossy().into_owned(),
            ),
            ("executable", self.executable.clone()),
        ];
        fields.extend(self.arguments.iter().map(|a| ("arguments", a.clone())));
        fields.extend(self.env.values().map(|v| ("env", v.clone())));
        fields.extend(self.health_urls.iter().map(|u| ("health_urls", u.clone())));
        fields.extend(self.exports.values().map(|v| ("exports", v.clone())));
        fields
    }

    /// Every `${...}` reference in this descriptor.
    ///
    /// # Errors
    /// Returns [`DomainError::MalformedTemplate`] naming the offending field.
    pub fn references(&self) -> Result<Vec<Reference>, DomainError> {
        let mut out = Vec::new();
        for (field, value) in self.templated_fields() {
            let refs = template::references(&value).map_err(|reason| {
                DomainError::MalformedTemplate {
                    service: self.name.to_string(),
                    field,
                    reason,
                }
            })?;
            out.extend(refs);
        }
        Ok(out)
    }

    /// Produce a copy with every reference substituted.
    ///
    /// # Errors
    /// Returns [`DomainError::Unresolved`] for the first reference with no
    /// binding.
    pub fn resolve(&self, bindings: &Bindings) -> Result<Self, DomainError> {
        let render = |value: &str| {
            bindings
                .render(value)
                .map_err(|reference| DomainError::Unresolved {
                    service: self.name.to_string(),
                    reference,
                })
        };

        Ok(Self {
            name: self.name.clone(),
            working_directory: PathBuf::from(render(
                &self.working_directory.to_string_lossy(),
            )?),
            executable: render(&self.executable)?,
            arguments: self
                .arguments
                .iter()
                .map(|a| render(a))
                .collect::<Result<_, _>>()?,
            health_urls: self
                .health_urls
                .iter()
                .map(|u| render(u))
                .collect::<Result<_, _>>()?,
            exports: self
                .exports
                .iter()
                .map(|(k, v)| Ok((k.clone(), render(v)?)))
                .collect::<Result<_, DomainError>>()?,
            env: self
                .env
                .iter()
                .map(|(k, v)| Ok((k.clone(), render(v)?)))
                .collect::<Result<_, DomainError>>()?,
            launch_timeout: self.launch_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> ServiceDescriptor {
        ServiceDescriptor::new(
            ServiceName::try_new("api").unwrap(),
            "fastapi",
            ".venv/bin/python",
            vec!["-m".into(), "uvicorn".into(), "app.main:app".into()],
        )
        .with_health_url("http://127.0.0.1:8000/health")
        .with_export(BASE_URL_EXPORT, "http://127.0.0.1:8000")
    }

    #[test]
    fn command_line_joins_executable_and_arguments() {
        assert_eq!(api().command_line(), ".venv/bin/python -m uvicorn app.main:app");
    }

    #[test]
    fn base_url_comes_from_exports() {
        assert_eq!(api().base_url(), Some("http://127.0.0.1:8000"));
        let bare = ServiceDescriptor::new(ServiceName::try_new("w").unwrap(), ".", "true", vec![]);
        assert_eq!(bare.base_url(), None);
    }

    #[test]
    fn resolve_substitutes_every_field() {
        let ui = ServiceDescriptor::new(
            ServiceName::try_new("ui").unwrap(),
            "streamlit",
            "python",
            vec!["--browser.serverAddress".into(), "${lan_ip}".into()],
        )
        .with_env("API_URL", "${api.base_url}")
        .with_export(BASE_URL_EXPORT, "http://${lan_ip}:8501");

        let mut bindings = Bindings::new(BTreeMap::from([(
            "lan_ip".to_string(),
            "10.0.0.5".to_string(),
        )]));
        bindings.publish(api().name().clone(), api().exports().clone());

        let resolved = ui.resolve(&bindings).unwrap();
        assert_eq!(resolved.arguments()[1], "10.0.0.5");
        assert_eq!(resolved.env()["API_URL"], "http://127.0.0.1:8000");
        assert_eq!(resolved.base_url(), Some("http://10.0.0.5:8501"));
    }

    #[test]
    fn resolve_fails_on_missing_binding() {
        let ui = ServiceDescriptor::new(
            ServiceName::try_new("ui").unwrap(),
            ".",
            "python",
            vec!["${api.base_url}".into()],
        );
        let err = ui.resolve(&Bindings::default()).unwrap_err();
        assert!(matches!(err, DomainError::Unresolved { .. }));
    }

    #[test]
    fn references_name_the_malformed_field() {
        let broken = api().with_env("X", "${oops");
        match broken.references() {
            Err(DomainError::MalformedTemplate { field, .. }) => assert_eq!(field, "env"),
            other => panic!("expected malformed template, got {other:?}"),
        }
    }

    #[test]
    fn health_urls_keep_declaration_order() {
        let api = api()
            .with_health_url("http://localhost:8000/health")
            .with_health_url("http://127.0.0.1:8000/docs");
        assert_eq!(
            api.health_urls(),
            [
                "http://127.0.0.1:8000/health",
                "http://localhost:8000/health",
                "http://127.0.0.1:8000/docs",
            ]
        );
    }
}
