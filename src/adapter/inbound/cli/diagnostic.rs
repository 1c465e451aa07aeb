//! Miette-based diagnostics for configuration errors.
//!
//! A TOML syntax error is rendered with the offending file excerpt and a
//! label under the location the parser reported.

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::error::{ConfigError, Error};

/// Configuration error with source location context.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(runall::config))]
pub struct ConfigDiagnostic {
    pub message: String,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub help: Option<String>,
}

impl ConfigDiagnostic {
    /// A diagnostic over the whole of `src`, without a label.
    #[must_use]
    pub fn new(message: impl Into<String>, name: &str, src: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            src: NamedSource::new(name, src.into()),
            span: None,
            help: None,
        }
    }

    /// Label the `len` bytes at `offset`.
    #[must_use]
    pub fn with_span(mut self, offset: usize, len: usize) -> Self {
        self.span = Some((offset, len).into());
        self
    }

    /// Attach a help line.
    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Build a diagnostic for `error` raised while loading `src`.
    ///
    /// Returns `None` for errors that are not about the file's content.
    pub fn from_error(error: &Error, name: &str, src: &str) -> Option<Self> {
        match error {
            Error::Config(ConfigError::Parse(e)) => {
                let mut diagnostic =
                    Self::new(e.message().trim().to_string(), name, src).with_help(
                        "see `runall config init` for a documented template",
                    );
                if let Some(span) = e.span() {
                    diagnostic = diagnostic.with_span(span.start, span.end - span.start);
                }
                Some(diagnostic)
            }
            Error::Config(ConfigError::ParseJson(e)) => {
                let offset = line_offset(src, e.line(), e.column());
                Some(Self::new(e.to_string(), name, src).with_span(offset, 1))
            }
            Error::Config(ConfigError::MissingField { field })
            | Error::Config(ConfigError::InvalidValue { field, .. }) => {
                let mut diagnostic = Self::new(error.to_string(), name, src);
                if let Some(offset) = src.find(field) {
                    diagnostic = diagnostic.with_span(offset, field.len());
                }
                Some(diagnostic)
            }
            Error::Domain(e) => Some(
                Self::new(e.to_string(), name, src)
                    .with_help("`launch_order` must list every service once, dependencies first"),
            ),
            _ => None,
        }
    }
}

/// Byte offset of a 1-based line/column position.
fn line_offset(src: &str, line: usize, column: usize) -> usize {
    let start: usize = src
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (start + column.saturating_sub(1)).min(src.len().saturating_sub(1))
}
