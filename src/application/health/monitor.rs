//! Steady-state health monitoring: one task per service.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use super::prober::HealthProber;
use crate::application::clock;
use crate::application::orchestrator::event::SupervisorEvent;
use crate::application::shutdown::Shutdown;
use crate::domain::ServiceName;

/// Probe `urls` every `every`, starting one interval from now, and report
/// each result on `events`. The task ends on shutdown or once the
/// receiver is dropped.
///
/// Observations are offered without waiting: when the channel is full the
/// result is dropped, since the next probe supersedes it anyway.
pub fn spawn(
    tasks: &mut JoinSet<()>,
    prober: Arc<HealthProber>,
    service: ServiceName,
    urls: Vec<String>,
    every: Duration,
    events: mpsc::Sender<SupervisorEvent>,
    mut shutdown: Shutdown,
) {
    tasks.spawn(async move {
        let every = clock::bounded(every);
        let mut ticker = interval_at(clock::deadline_after(Instant::now(), every), every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(service = %service, urls = ?urls, ?every, "Health monitor started");

        loop {
            tokio::select! {
                biased;
                () = shutdown.requested() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                () = shutdown.requested() => break,
                result = prober.probe_any(&urls, prober.probe_timeout()) => result,
            };
            let Some(result) = result else { break };

            let event = SupervisorEvent::Health {
                service: service.clone(),
                result,
            };
            match events.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!(service = %service, "Event queue full, dropping health result");
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }

        debug!(service = %service, "Health monitor stopped");
    });
}
