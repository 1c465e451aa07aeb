//! Application services (use cases).
//!
//! These services orchestrate domain logic and coordinate adapters
//! through ports: launching and supervising services, probing health and
//! broadcasting requests.

pub mod broadcast;
pub mod clock;
pub mod health;
pub mod orchestrator;
pub mod shutdown;

pub use broadcast::{BroadcastDispatcher, BroadcastReport, BroadcastRequest, BroadcastTarget};
pub use orchestrator::{Orchestrator, StatusSnapshot, SupervisorSettings};
pub use shutdown::{Shutdown, ShutdownTrigger};
