//! The service orchestrator.
//!
//! Launches services in order behind a health gate, supervises them in
//! steady state and tears them down in reverse order. The orchestrator is
//! an explicit context object: it owns every [`ProcessHandle`] and is the
//! only writer of their state.
//!
//! ```text
//! start ──► launch (sequential, health-gated) ──► supervise ──► stop
//!              │ failure                              ▲
//!              └──────────── rollback (stop) ─────────┘
//! ```

pub mod event;
mod handle;
mod launch;
mod shutdown;
pub mod snapshot;
mod supervise;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

pub use handle::ProcessHandle;
pub use launch::{LaunchOutcome, LaunchReport, LaunchedService};
pub use shutdown::{ShutdownReport, StopOutcome, StoppedService};
pub use snapshot::{ProbeSummary, ServiceStatus, StatusReader, StatusSnapshot};
pub use supervise::{ExitReason, SupervisionReport};

use self::event::SupervisorEvent;
use crate::application::broadcast::BroadcastTarget;
use crate::application::health::HealthProber;
use crate::application::shutdown::Shutdown;
use crate::domain::LaunchPlan;
use crate::port::outbound::http::HttpClient;
use crate::port::outbound::process::ProcessLauncher;

const EVENT_CAPACITY: usize = 256;

/// Timing and policy knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Longest wait for a service to become healthy after spawning.
    pub launch_timeout: Duration,
    /// Launch-time probe cadence.
    pub poll_interval: Duration,
    /// Per-probe request timeout.
    pub probe_timeout: Duration,
    /// Time between `SIGTERM` and `SIGKILL` during shutdown.
    pub grace_period: Duration,
    /// Steady-state probe cadence; `None` disables monitoring.
    pub monitor_interval: Option<Duration>,
    /// Tear everything down when a managed process exits on its own.
    pub stop_on_exit: bool,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            launch_timeout: Duration::from_secs(90),
            poll_interval: Duration::from_millis(1500),
            probe_timeout: Duration::from_secs(3),
            grace_period: Duration::from_secs(8),
            monitor_interval: Some(Duration::from_secs(5)),
            stop_on_exit: true,
        }
    }
}

/// Owns every launched process. Drive it with [`start`](Self::start), then
/// [`supervise`](Self::supervise) until shutdown.
pub struct Orchestrator {
    plan: LaunchPlan,
    settings: SupervisorSettings,
    launcher: Arc<dyn ProcessLauncher>,
    prober: Arc<HealthProber>,
    builtins: BTreeMap<String, String>,
    handles: Vec<ProcessHandle>,
    started: bool,
    shutting_down: bool,
    status_tx: watch::Sender<StatusSnapshot>,
    events_tx: mpsc::Sender<SupervisorEvent>,
    events_rx: mpsc::Receiver<SupervisorEvent>,
    tasks: JoinSet<()>,
    shutdown: Shutdown,
}

impl Orchestrator {
    /// An orchestrator for `plan` that has launched nothing yet.
    pub fn new(
        plan: LaunchPlan,
        settings: SupervisorSettings,
        launcher: Arc<dyn ProcessLauncher>,
        http: Arc<dyn HttpClient>,
        shutdown: Shutdown,
    ) -> Self {
        let prober = Arc::new(HealthProber::new(http, settings.probe_timeout));
        let (status_tx, _) = watch::channel(StatusSnapshot::default());
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        Self {
            plan,
            settings,
            launcher,
            prober,
            builtins: BTreeMap::new(),
            handles: Vec::new(),
            started: false,
            shutting_down: false,
            status_tx,
            events_tx,
            events_rx,
            tasks: JoinSet::new(),
            shutdown,
        }
    }

    /// Values for built-in template variables such as `lan_ip`.
    #[must_use]
    pub fn with_builtins(mut self, builtins: BTreeMap<String, String>) -> Self {
        self.builtins = builtins;
        self
    }

    /// The validated launch plan.
    pub fn plan(&self) -> &LaunchPlan {
        &self.plan
    }

    /// Timing and policy in effect.
    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Every launched service, in launch order.
    pub fn handles(&self) -> &[ProcessHandle] {
        &self.handles
    }

    /// Current state of every launched service.
    ///
    /// Launch and shutdown transitions show up immediately. Health flips
    /// and unexpected exits after launch are applied by
    /// [`supervise`](Self::supervise), so they only appear while it runs.
    pub fn status(&self) -> StatusSnapshot {
        self.status_tx.borrow().clone()
    }

    /// A reader that observes every published snapshot.
    pub fn status_reader(&self) -> StatusReader {
        StatusReader::new(self.status_tx.subscribe())
    }

    /// Broadcast targets drawn from the current state.
    pub fn broadcast_targets(&self, healthy_only: bool) -> Vec<BroadcastTarget> {
        self.status().broadcast_targets(healthy_only)
    }

    fn publish(&self) {
        let snapshot = StatusSnapshot {
            services: self.handles.iter().map(ProcessHandle::status).collect(),
            shutting_down: self.shutting_down,
        };
        self.status_tx.send_replace(snapshot);
    }

    fn handle_mut(&mut self, name: &str) -> Option<&mut ProcessHandle> {
        self.handles.iter_mut().find(|h| h.name() == name)
    }
}
