//! `${...}` substitution in service descriptors.
//!
//! Two reference forms are recognised:
//!
//! - `${service.key}` - an export published by a service launched earlier
//! - `${name}` - a built-in supplied by the supervisor (see [`BUILTINS`])
//!
//! `$$` produces a literal `$`. A `$` not followed by `{` or `$` is kept as-is.

use std::collections::BTreeMap;

use super::id::ServiceName;

/// Built-in variable names available to every service.
pub const BUILTINS: &[&str] = &["lan_ip"];

/// A parsed `${...}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// `${name}`
    Builtin(String),
    /// `${service.key}`
    Export {
        /// Exporting service.
        service: String,
        /// Export key.
        key: String,
    },
}

impl Reference {
    /// Render the reference back to its source form.
    #[must_use]
    pub fn source(&self) -> String {
        match self {
            Self::Builtin(name) => format!("${{{name}}}"),
            Self::Export { service, key } => format!("${{{service}.{key}}}"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Reference(Reference),
}

fn parse(input: &str) -> Result<Vec<Segment<'_>>, String> {
    let mut segments = Vec::new();
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        if pos > 0 {
            segments.push(Segment::Literal(&rest[..pos]));
        }
        let after = &rest[pos + 1..];

        if let Some(stripped) = after.strip_prefix('$') {
            segments.push(Segment::Literal("$"));
            rest = stripped;
        } else if let Some(body) = after.strip_prefix('{') {
            let end = body
                .find('}')
                .ok_or_else(|| format!("unterminated '${{' in '{input}'"))?;
            segments.push(Segment::Reference(parse_reference(body[..end].trim())?));
            rest = &body[end + 1..];
        } else {
            segments.push(Segment::Literal("$"));
            rest = after;
        }
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}

fn parse_reference(body: &str) -> Result<Reference, String> {
    if body.is_empty() {
        return Err("empty reference '${}'".to_string());
    }
    match body.split_once('.') {
        Some((service, key)) if !service.is_empty() && !key.is_empty() && !key.contains('.') => {
            Ok(Reference::Export {
                service: service.to_string(),
                key: key.to_string(),
            })
        }
        Some(_) => Err(format!("expected '${{service.key}}', got '${{{body}}}'")),
        None => Ok(Reference::Builtin(body.to_string())),
    }
}

/// List every reference in `input`.
///
/// # Errors
/// Returns the parser complaint when `input` contains a malformed `${`.
pub fn references(input: &str) -> Result<Vec<Reference>, String> {
    Ok(parse(input)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Reference(reference) => Some(reference),
            Segment::Literal(_) => None,
        })
        .collect())
}

/// Values available for substitution at launch time.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    builtins: BTreeMap<String, String>,
    exports: BTreeMap<ServiceName, BTreeMap<String, String>>,
}

impl Bindings {
    /// Create bindings seeded with built-in values.
    #[must_use]
    pub fn new(builtins: BTreeMap<String, String>) -> Self {
        Self {
            builtins,
            exports: BTreeMap::new(),
        }
    }

    /// Make a launched service's exports visible to later services.
    pub fn publish(&mut self, service: ServiceName, exports: BTreeMap<String, String>) {
        self.exports.insert(service, exports);
    }

    fn lookup(&self, reference: &Reference) -> Option<&str> {
        match reference {
            Reference::Builtin(name) => self.builtins.get(name).map(String::as_str),
            Reference::Export { service, key } => self
                .exports
                .iter()
                .find(|(name, _)| name.as_str() == service)
                .and_then(|(_, exports)| exports.get(key))
                .map(String::as_str),
        }
    }

    /// Substitute every reference in `input`.
    ///
    /// # Errors
    /// Returns the source text of the first reference with no binding, or
    /// the parser complaint for malformed input.
    pub fn render(&self, input: &str) -> Result<String, String> {
        let mut out = String::with_capacity(input.len());
        for segment in parse(input)? {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Reference(reference) => match self.lookup(&reference) {
                    Some(value) => out.push_str(value),
                    None => return Err(reference.source()),
                },
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> Bindings {
        let mut b = Bindings::new(BTreeMap::from([(
            "lan_ip".to_string(),
            "192.168.1.20".to_string(),
        )]));
        b.publish(
            ServiceName::try_new("api").unwrap(),
            BTreeMap::from([("base_url".to_string(), "http://127.0.0.1:8000".to_string())]),
        );
        b
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(bindings().render("--port 8501").unwrap(), "--port 8501");
        assert!(references("no refs here").unwrap().is_empty());
    }

    #[test]
    fn substitutes_exports_and_builtins() {
        let rendered = bindings()
            .render("API=${api.base_url} LAN=${lan_ip}")
            .unwrap();
        assert_eq!(rendered, "API=http://127.0.0.1:8000 LAN=192.168.1.20");
    }

    #[test]
    fn lists_references_in_order() {
        let refs = references("${lan_ip}:${api.port}").unwrap();
        assert_eq!(
            refs,
            vec![
                Reference::Builtin("lan_ip".into()),
                Reference::Export {
                    service: "api".into(),
                    key: "port".into()
                },
            ]
        );
    }

    #[test]
    fn dollar_escapes() {
        assert_eq!(bindings().render("cost $$5 and $x").unwrap(), "cost $5 and $x");
    }

    #[test]
    fn unresolved_reference_reports_source() {
        assert_eq!(
            bindings().render("${ui.base_url}").unwrap_err(),
            "${ui.base_url}"
        );
    }

    #[test]
    fn malformed_references_are_rejected() {
        assert!(references("${api.base_url").is_err());
        assert!(references("${}").is_err());
        assert!(references("${a.b.c}").is_err());
        assert!(references("${.key}").is_err());
    }
}
