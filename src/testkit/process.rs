//! In-memory [`ProcessLauncher`] that records what the orchestrator does.
//!
//! Fake processes run until signalled. Per-service behaviour can make a
//! spawn fail, make a process ignore `SIGTERM`, or make it exit on its own
//! after a delay. Every spawn and signal is logged with the tokio clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::port::outbound::process::{LaunchSpec, ManagedProcess, ProcessExit, ProcessLauncher};

const SIGTERM: i32 = 15;
const SIGKILL: i32 = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Spawned { service: String, pid: u32 },
    Terminated { service: String },
    Killed { service: String },
}

impl ProcessEvent {
    pub fn service(&self) -> &str {
        match self {
            Self::Spawned { service, .. }
            | Self::Terminated { service }
            | Self::Killed { service } => service,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Behaviour {
    fail_spawn: bool,
    ignore_terminate: bool,
    terminate_delay: Duration,
    exit_after: Option<(Duration, ProcessExit)>,
}

type EventLog = Arc<Mutex<Vec<(Instant, ProcessEvent)>>>;

#[derive(Default)]
pub struct FakeLauncher {
    behaviours: Mutex<HashMap<String, Behaviour>>,
    specs: Mutex<Vec<LaunchSpec>>,
    events: EventLog,
    next_pid: AtomicU32,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(1000),
            ..Self::default()
        }
    }

    fn behaviour(&self, service: &str, f: impl FnOnce(&mut Behaviour)) {
        f(self.behaviours.lock().entry(service.to_string()).or_default());
    }

    /// Spawning `service` fails with `NotFound`.
    pub fn fail_spawn(&self, service: &str) {
        self.behaviour(service, |b| b.fail_spawn = true);
    }

    /// `service` only stops on `SIGKILL`.
    pub fn ignore_terminate(&self, service: &str) {
        self.behaviour(service, |b| b.ignore_terminate = true);
    }

    /// `service` takes `delay` to exit after `SIGTERM`.
    pub fn slow_terminate(&self, service: &str, delay: Duration) {
        self.behaviour(service, |b| b.terminate_delay = delay);
    }

    /// `service` exits with `exit` `delay` after spawning.
    pub fn exit_after(&self, service: &str, delay: Duration, exit: ProcessExit) {
        self.behaviour(service, |b| b.exit_after = Some((delay, exit)));
    }

    pub fn events(&self) -> Vec<(Instant, ProcessEvent)> {
        self.events.lock().clone()
    }

    /// The resolved launch specs, in spawn order.
    pub fn specs(&self) -> Vec<LaunchSpec> {
        self.specs.lock().clone()
    }

    /// Services in the order they were spawned.
    pub fn spawn_order(&self) -> Vec<String> {
        self.filtered(|e| matches!(e, ProcessEvent::Spawned { .. }))
    }

    /// Services in the order they received `SIGTERM`.
    pub fn terminate_order(&self) -> Vec<String> {
        self.filtered(|e| matches!(e, ProcessEvent::Terminated { .. }))
    }

    pub fn killed(&self) -> Vec<String> {
        self.filtered(|e| matches!(e, ProcessEvent::Killed { .. }))
    }

    pub fn was_spawned(&self, service: &str) -> bool {
        self.spawn_order().iter().any(|s| s == service)
    }

    fn filtered(&self, keep: impl Fn(&ProcessEvent) -> bool) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(_, e)| keep(e))
            .map(|(_, e)| e.service().to_string())
            .collect()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn spawn(&self, spec: &LaunchSpec) -> std::io::Result<Box<dyn ManagedProcess>> {
        let behaviour = self
            .behaviours
            .lock()
            .get(&spec.service)
            .cloned()
            .unwrap_or_default();
        if behaviour.fail_spawn {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: no such file or directory", spec.program),
            ));
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.specs.lock().push(spec.clone());
        self.events.lock().push((
            Instant::now(),
            ProcessEvent::Spawned {
                service: spec.service.clone(),
                pid,
            },
        ));

        let (exit_tx, _) = watch::channel(None);
        let exit_tx = Arc::new(exit_tx);
        if let Some((delay, exit)) = behaviour.exit_after {
            let tx = exit_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                publish(&tx, exit);
            });
        }

        Ok(Box::new(FakeProcess {
            service: spec.service.clone(),
            pid,
            behaviour,
            exit_tx,
            events: self.events.clone(),
        }))
    }
}

fn publish(tx: &watch::Sender<Option<ProcessExit>>, exit: ProcessExit) {
    tx.send_if_modified(|current| {
        if current.is_some() {
            return false;
        }
        *current = Some(exit);
        true
    });
}

struct FakeProcess {
    service: String,
    pid: u32,
    behaviour: Behaviour,
    exit_tx: Arc<watch::Sender<Option<ProcessExit>>>,
    events: EventLog,
}

impl FakeProcess {
    fn record(&self, event: ProcessEvent) {
        self.events.lock().push((Instant::now(), event));
    }
}

impl ManagedProcess for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn terminate(&self) -> std::io::Result<()> {
        self.record(ProcessEvent::Terminated {
            service: self.service.clone(),
        });
        if self.behaviour.ignore_terminate {
            return Ok(());
        }
        let delay = self.behaviour.terminate_delay;
        if delay.is_zero() {
            publish(&self.exit_tx, ProcessExit::signal(SIGTERM));
        } else {
            let tx = self.exit_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                publish(&tx, ProcessExit::signal(SIGTERM));
            });
        }
        Ok(())
    }

    fn kill(&self) -> std::io::Result<()> {
        self.record(ProcessEvent::Killed {
            service: self.service.clone(),
        });
        publish(&self.exit_tx, ProcessExit::signal(SIGKILL));
        Ok(())
    }

    fn exit_watch(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.exit_tx.subscribe()
    }
}
