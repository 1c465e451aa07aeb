//! runall - launch, health-gate, supervise and tear down local services.
//!
//! A supervisor for a small, ordered set of HTTP services (an API and the
//! UI in front of it, say). Each service is started only after the one
//! before it answers its health check; once everything is up the
//! supervisor keeps probing, fans broadcast requests out to every live
//! service, and stops them in reverse order on SIGINT/SIGTERM or failure.
//!
//! # Architecture
//!
//! - **`domain`** - Service descriptors, launch plans, templates and the
//!   per-service state machine
//! - **`port`** - Process-launcher and HTTP-client traits
//! - **`application`** - The orchestrator, health prober and broadcast
//!   dispatcher, written against the ports
//! - **`adapter`** - Unix processes, reqwest, and the CLI
//! - **`infrastructure`** - Configuration, wiring, signals and the status
//!   file
//!
//! # Features
//!
//! - `testkit` - Scripted fakes for the ports, for integration tests
//!
//! # Example
//!
//! ```no_run
//! use runall::application::Shutdown;
//! use runall::infrastructure::bootstrap;
//! use runall::infrastructure::config::settings::Config;
//!
//! # async fn run() -> runall::error::Result<()> {
//! let config = Config::load("runall.toml")?;
//! let (_trigger, shutdown) = Shutdown::channel();
//! let mut orchestrator = bootstrap::build_orchestrator(&config, shutdown)?;
//! orchestrator.start(&[]).await?;
//! let report = orchestrator.supervise().await?;
//! println!("{:?}", report.reason);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
