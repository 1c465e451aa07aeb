//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! The orchestrator never touches the operating system or the network
//! directly. It launches processes through [`outbound::process`] and talks
//! HTTP through [`outbound::http`]; adapters implement both for real, and
//! the testkit implements both with scripted fakes.

pub mod outbound;
