//! Health probing and steady-state monitoring.

pub mod monitor;
pub mod prober;

pub use prober::{HealthProber, ProbeResult, WaitOutcome};
