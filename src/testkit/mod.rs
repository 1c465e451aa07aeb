//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`http`] - `ScriptedHttpClient`, an [`HttpClient`](crate::port::outbound::http::HttpClient)
//!   answering from per-URL routes.
//! - [`process`] - `FakeLauncher`, a [`ProcessLauncher`](crate::port::outbound::process::ProcessLauncher)
//!   with scriptable spawn failures, stubborn processes and early exits.
//! - [`config`] - Service descriptors and fast supervisor settings.

pub mod config;
pub mod http;
pub mod process;
