//! Sequential, health-gated launch.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use super::{Orchestrator, ProcessHandle};
use crate::application::clock;
use crate::application::health::{monitor, WaitOutcome};
use crate::application::orchestrator::event::SupervisorEvent;
use crate::domain::{Bindings, ServiceDescriptor, ServiceName, ServiceState};
use crate::error::{Error, LaunchError, Result};
use crate::port::outbound::process::{wait_for_exit, LaunchSpec, ProcessExit};

/// Whether the launch sequence ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Completed,
    /// A shutdown request interrupted the sequence; everything launched so
    /// far has been stopped.
    Cancelled,
}

/// One service that came up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedService {
    pub name: String,
    pub pid: Option<u32>,
    /// Spawn to healthy.
    pub boot_time: Duration,
    pub exports: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub outcome: LaunchOutcome,
    /// Services that reached `Healthy`, in launch order.
    pub services: Vec<LaunchedService>,
}

/// What ended the readiness gate for one service.
enum Gate {
    Probe(WaitOutcome),
    Exited(ProcessExit),
}

impl Orchestrator {
    /// Launch `subset` (every service when empty) in launch order.
    ///
    /// Each service is spawned only after the previous one is healthy. If a
    /// service fails to spawn, exits early, or misses its launch timeout,
    /// the sequence stops there and everything already started is stopped
    /// in reverse order before the error is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] when called twice or after shutdown began
    /// - [`Error::Domain`] for unknown names or an incomplete subset
    /// - [`Error::Launch`] for the service that failed, after rollback
    pub async fn start(&mut self, subset: &[ServiceName]) -> Result<LaunchReport> {
        if self.shutting_down {
            return Err(Error::InvalidState("shutdown already in progress".into()));
        }
        if self.started {
            return Err(Error::InvalidState("services already started".into()));
        }
        let selected = self.plan.select(subset)?;
        self.started = true;

        info!(
            services = ?selected.iter().map(|d| d.name().as_str()).collect::<Vec<_>>(),
            "Launching services"
        );

        let mut bindings = Bindings::new(self.builtins.clone());
        for descriptor in &selected {
            if self.shutdown.is_requested() {
                return Ok(self.cancel_launch().await);
            }
            match self.launch_one(descriptor, &mut bindings).await {
                Ok(true) => {}
                Ok(false) => return Ok(self.cancel_launch().await),
                Err(e) => {
                    error!(service = %descriptor.name(), error = %e, "Launch failed, stopping started services");
                    self.stop().await;
                    return Err(e);
                }
            }
        }

        self.spawn_watchers();
        info!(count = self.handles.len(), "All services launched");
        Ok(self.report(LaunchOutcome::Completed))
    }

    async fn cancel_launch(&mut self) -> LaunchReport {
        info!("Shutdown requested during launch");
        self.stop().await;
        self.report(LaunchOutcome::Cancelled)
    }

    fn report(&self, outcome: LaunchOutcome) -> LaunchReport {
        let services = self
            .handles
            .iter()
            .filter_map(|h| {
                h.boot_time().map(|boot_time| LaunchedService {
                    name: h.name().to_string(),
                    pid: h.pid(),
                    boot_time,
                    exports: h.descriptor().exports().clone(),
                })
            })
            .collect();
        LaunchReport { outcome, services }
    }

    /// Resolve, spawn and gate one service. `Ok(false)` means cancelled.
    async fn launch_one(
        &mut self,
        descriptor: &ServiceDescriptor,
        bindings: &mut Bindings,
    ) -> Result<bool> {
        let resolved = descriptor.resolve(bindings)?;
        let name = resolved.name().clone();
        let spec = LaunchSpec::from(&resolved);

        info!(service = %name, command = %resolved.command_line(), "Starting");
        self.handles.push(ProcessHandle::new(resolved.clone()));
        let index = self.handles.len() - 1;
        self.publish();

        let spawned_at = Instant::now();
        let process = match self.launcher.spawn(&spec) {
            Ok(process) => process,
            Err(source) => {
                self.handles[index].transition(ServiceState::Failed)?;
                self.publish();
                return Err(LaunchError::Spawn {
                    service: name.to_string(),
                    source,
                }
                .into());
            }
        };
        let exit_rx = process.exit_watch();
        self.handles[index].attach(process);
        self.publish();

        let urls = resolved.health_urls();
        if urls.is_empty() {
            let handle = &mut self.handles[index];
            handle.transition(ServiceState::Healthy)?;
            handle.record_boot(spawned_at.elapsed());
            self.publish();
            bindings.publish(name.clone(), resolved.exports().clone());
            info!(service = %name, "Started (no health check)");
            return Ok(true);
        }

        let max_wait = clock::bounded(
            resolved
                .launch_timeout()
                .unwrap_or(self.settings.launch_timeout),
        );
        let prober = self.prober.clone();
        let mut shutdown = self.shutdown.clone();
        info!(service = %name, urls = ?urls, timeout = ?max_wait, "Waiting for health");

        let gate = tokio::select! {
            outcome = prober.wait_until_healthy(urls, self.settings.poll_interval, max_wait, &mut shutdown) => Gate::Probe(outcome),
            Some(exit) = wait_for_exit(exit_rx) => Gate::Exited(exit),
        };

        let handle = &mut self.handles[index];
        let result = match gate {
            Gate::Probe(WaitOutcome::Healthy { attempts, last, .. }) => {
                let boot_time = spawned_at.elapsed();
                handle.transition(ServiceState::Healthy)?;
                handle.record_probe(&last);
                handle.record_boot(boot_time);
                bindings.publish(name.clone(), resolved.exports().clone());
                info!(service = %name, attempts, boot = ?boot_time, "Healthy");
                Ok(true)
            }
            Gate::Probe(WaitOutcome::TimedOut { attempts, last, .. }) => {
                handle.transition(ServiceState::Failed)?;
                if let Some(last) = &last {
                    handle.record_probe(last);
                }
                warn!(service = %name, attempts, "Health timeout");
                Err(LaunchError::HealthTimeout {
                    service: name.to_string(),
                    waited: max_wait,
                    last_error: last.and_then(|r| r.detail),
                }
                .into())
            }
            Gate::Probe(WaitOutcome::Cancelled { .. }) => Ok(false),
            Gate::Exited(exit) => {
                handle.record_exit(exit);
                handle.transition(ServiceState::Failed)?;
                warn!(service = %name, %exit, "Exited before becoming healthy");
                Err(LaunchError::ExitedBeforeHealthy {
                    service: name.to_string(),
                    exit,
                }
                .into())
            }
        };
        self.publish();
        result
    }

    /// Start exit watchers and, when enabled, health monitors for every
    /// launched service.
    fn spawn_watchers(&mut self) {
        for handle in &self.handles {
            let Some(process) = handle.process() else {
                continue;
            };
            let service = handle.descriptor().name().clone();
            let exit_rx = process.exit_watch();
            let events = self.events_tx.clone();
            let watched = service.clone();
            self.tasks.spawn(async move {
                if let Some(exit) = wait_for_exit(exit_rx).await {
                    let _ = events
                        .send(SupervisorEvent::Exited {
                            service: watched,
                            exit,
                        })
                        .await;
                }
            });

            let urls = handle.descriptor().health_urls();
            if let Some(every) = self.settings.monitor_interval.filter(|_| !urls.is_empty()) {
                monitor::spawn(
                    &mut self.tasks,
                    self.prober.clone(),
                    service,
                    urls.to_vec(),
                    every,
                    self.events_tx.clone(),
                    self.shutdown.clone(),
                );
            }
        }
    }
}
