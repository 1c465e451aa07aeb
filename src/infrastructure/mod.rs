//! Infrastructure layer.
//!
//! Technical concerns that support the application without containing
//! supervision logic.
//!
//! # Submodules
//!
//! - [`bootstrap`] - Composition root for runtime wiring
//! - [`config`] - Configuration loading and validation
//! - [`network`] - Host address discovery for templates
//! - [`signal`] - SIGINT/SIGTERM to shutdown trigger
//! - [`status_file`] - Status file shared with other CLI invocations

pub mod bootstrap;
pub mod config;
pub mod network;
pub mod signal;
pub mod status_file;
