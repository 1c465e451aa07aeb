//! Domain validation errors.
//!
//! Returned by `try_new` constructors and by [`LaunchPlan`](super::LaunchPlan)
//! when a service declaration or launch order violates an invariant.

use thiserror::Error;

use super::state::ServiceState;

/// Errors that occur when domain invariants are violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A service name does not follow the naming rules.
    #[error("invalid service name '{name}': {reason}")]
    InvalidServiceName {
        /// The rejected name.
        name: String,
        /// Which rule it broke.
        reason: &'static str,
    },

    /// Two descriptors declare the same name.
    #[error("service '{0}' is declared more than once")]
    DuplicateService(String),

    /// The launch order is empty.
    #[error("launch order cannot be empty")]
    EmptyLaunchOrder,

    /// A name appears twice in the launch order.
    #[error("service '{0}' appears more than once in the launch order")]
    DuplicateInLaunchOrder(String),

    /// A name in the launch order (or a requested subset) has no descriptor.
    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// A declared service is never launched.
    #[error("service '{0}' is declared but missing from the launch order")]
    MissingFromLaunchOrder(String),

    /// A `${...}` expression could not be parsed.
    #[error("malformed template in {field} of service '{service}': {reason}")]
    MalformedTemplate {
        /// Service whose field holds the template.
        service: String,
        /// Field name (e.g. `arguments`, `health_urls`).
        field: &'static str,
        /// Parser complaint.
        reason: String,
    },

    /// A template names a built-in that does not exist.
    #[error("service '{service}' references unknown variable '{variable}'")]
    UnknownVariable {
        /// Referencing service.
        service: String,
        /// The unknown built-in.
        variable: String,
    },

    /// A template references a service that is not launched earlier.
    #[error("service '{service}' references '{target}' which is not launched before it")]
    ForwardReference {
        /// Referencing service.
        service: String,
        /// Referenced service.
        target: String,
    },

    /// A template references an export key the target does not declare.
    #[error("service '{service}' references '{target}.{key}' but '{target}' exports no '{key}'")]
    UnknownExport {
        /// Referencing service.
        service: String,
        /// Referenced service.
        target: String,
        /// Missing key.
        key: String,
    },

    /// A value could not be resolved at launch time.
    #[error("cannot resolve '{reference}' for service '{service}'")]
    Unresolved {
        /// Service being launched.
        service: String,
        /// The raw reference text.
        reference: String,
    },

    /// A lifecycle transition outside the state machine was attempted.
    #[error("service '{service}' cannot move from {from} to {to}")]
    InvalidTransition {
        /// Affected service.
        service: String,
        /// Current state.
        from: ServiceState,
        /// Requested state.
        to: ServiceState,
    },
}
