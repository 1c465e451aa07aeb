//! Supervisor-agnostic domain types: service declarations, launch plans
//! and the per-service lifecycle state machine.

pub mod error;
pub mod id;
pub mod launch;
pub mod service;
pub mod state;
pub mod template;

pub use error::DomainError;
pub use id::ServiceName;
pub use launch::LaunchPlan;
pub use service::{ServiceDescriptor, BASE_URL_EXPORT};
pub use state::ServiceState;
pub use template::Bindings;
