//! Health probing: single probes and the launch-time readiness wait.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::debug;

use crate::application::clock;
use crate::application::shutdown::Shutdown;
use crate::port::outbound::http::{HttpClient, HttpRequest, TransportError};

/// Longest body excerpt kept as probe detail.
const DETAIL_LIMIT: usize = 200;

/// Outcome of one health request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub healthy: bool,
    pub latency: Duration,
    /// HTTP status, absent when no response arrived.
    pub status: Option<u16>,
    pub detail: Option<String>,
}

/// How a readiness wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Healthy {
        attempts: u32,
        elapsed: Duration,
        last: ProbeResult,
    },
    TimedOut {
        attempts: u32,
        elapsed: Duration,
        last: Option<ProbeResult>,
    },
    Cancelled {
        attempts: u32,
    },
}

/// Pull a short human-readable detail out of a health response body.
///
/// JSON bodies contribute their `status` or `message` field; anything else
/// is truncated to a short excerpt.
fn describe(body: &[u8]) -> Option<String> {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(body) {
        for key in ["status", "message"] {
            if let Some(serde_json::Value::String(value)) = map.get(key) {
                return Some(value.clone());
            }
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(DETAIL_LIMIT).collect())
}

/// Issues health requests through an [`HttpClient`].
pub struct HealthProber {
    client: Arc<dyn HttpClient>,
    probe_timeout: Duration,
}

impl HealthProber {
    /// A prober whose single probes time out after `probe_timeout`.
    pub fn new(client: Arc<dyn HttpClient>, probe_timeout: Duration) -> Self {
        Self {
            client,
            probe_timeout,
        }
    }

    /// Default per-probe timeout.
    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Issue one `GET`. Network failure is reported as unhealthy, never as an error.
    pub async fn probe(&self, url: &str, timeout: Duration) -> ProbeResult {
        let started = Instant::now();
        let request = HttpRequest::get(url, timeout);
        let outcome = tokio::time::timeout(timeout, self.client.send(request)).await;
        let latency = started.elapsed();

        match outcome {
            Ok(Ok(response)) => ProbeResult {
                healthy: response.is_success(),
                latency,
                status: Some(response.status),
                detail: describe(&response.body),
            },
            Ok(Err(e)) => ProbeResult {
                healthy: false,
                latency,
                status: None,
                detail: Some(e.to_string()),
            },
            Err(_) => ProbeResult {
                healthy: false,
                latency,
                status: None,
                detail: Some(TransportError::Timeout.to_string()),
            },
        }
    }

    /// Probe each of `urls` in order, stopping at the first healthy answer.
    ///
    /// Returns that answer, or the last unhealthy one. An empty list yields
    /// `None`.
    pub async fn probe_any(&self, urls: &[String], timeout: Duration) -> Option<ProbeResult> {
        let mut last = None;
        for url in urls {
            let result = self.probe(url, timeout).await;
            if result.healthy {
                return Some(result);
            }
            last = Some(result);
        }
        last
    }

    /// Probe `urls` every `poll_interval` until one of them reports
    /// healthy, `max_wait` elapses, or `shutdown` fires.
    ///
    /// Each attempt tries the URLs in order and stops at the first healthy
    /// one. Polls are scheduled on a fixed grid. An attempt that overruns
    /// the interval is followed immediately by the next one and the grid is
    /// re-anchored, so delays never accumulate. Each probe's timeout is
    /// clamped to the time left.
    pub async fn wait_until_healthy(
        &self,
        urls: &[String],
        poll_interval: Duration,
        max_wait: Duration,
        shutdown: &mut Shutdown,
    ) -> WaitOutcome {
        let started = Instant::now();
        let deadline = clock::deadline_after(started, max_wait);
        let mut ticker = interval(clock::bounded(poll_interval));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut attempts = 0;
        let mut last = None;

        loop {
            tokio::select! {
                biased;
                () = shutdown.requested() => return WaitOutcome::Cancelled { attempts },
                () = sleep_until(deadline) => {
                    return WaitOutcome::TimedOut { attempts, elapsed: started.elapsed(), last };
                }
                _ = ticker.tick() => {}
            }

            if deadline.saturating_duration_since(Instant::now()).is_zero() {
                return WaitOutcome::TimedOut {
                    attempts,
                    elapsed: started.elapsed(),
                    last,
                };
            }

            attempts += 1;
            for url in urls {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                let result = tokio::select! {
                    biased;
                    () = shutdown.requested() => return WaitOutcome::Cancelled { attempts },
                    result = self.probe(url, self.probe_timeout.min(remaining)) => result,
                };

                if result.healthy {
                    return WaitOutcome::Healthy {
                        attempts,
                        elapsed: started.elapsed(),
                        last: result,
                    };
                }
                debug!(url = %url, attempt = attempts, detail = ?result.detail, "Not healthy yet");
                last = Some(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::http::{Route, ScriptedHttpClient};

    const URL: &str = "http://127.0.0.1:8000/health";

    fn urls() -> Vec<String> {
        vec![URL.to_string()]
    }

    fn prober(client: &Arc<ScriptedHttpClient>) -> HealthProber {
        HealthProber::new(client.clone(), Duration::from_secs(3))
    }

    #[test]
    fn describe_prefers_json_status() {
        assert_eq!(describe(br#"{"status":"ok","x":1}"#).as_deref(), Some("ok"));
        assert_eq!(describe(br#"{"message":"warming up"}"#).as_deref(), Some("warming up"));
        assert_eq!(describe(b"  plain text \n").as_deref(), Some("plain text"));
        assert_eq!(describe(b""), None);
        assert_eq!(describe(&[b'x'; 500]).map(|d| d.len()), Some(DETAIL_LIMIT));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_classifies_status() {
        let client = Arc::new(ScriptedHttpClient::new());
        client.route(URL, Route::json(200, r#"{"status":"ok"}"#));
        let result = prober(&client).probe(URL, Duration::from_secs(3)).await;
        assert!(result.healthy);
        assert_eq!(result.status, Some(200));
        assert_eq!(result.detail.as_deref(), Some("ok"));

        client.route(URL, Route::json(503, r#"{"status":"starting"}"#));
        let result = prober(&client).probe(URL, Duration::from_secs(3)).await;
        assert!(!result.healthy);
        assert_eq!(result.status, Some(503));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_treats_network_failure_as_unhealthy() {
        let client = Arc::new(ScriptedHttpClient::new());
        client.route(URL, Route::Refuse);
        let result = prober(&client).probe(URL, Duration::from_secs(3)).await;
        assert!(!result.healthy);
        assert_eq!(result.status, None);

        client.route(URL, Route::Hang);
        let result = prober(&client).probe(URL, Duration::from_secs(3)).await;
        assert!(!result.healthy);
        assert_eq!(result.latency, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_polls_until_healthy() {
        let client = Arc::new(ScriptedHttpClient::new());
        client.route(URL, Route::HealthyAfter { failures: 3 });
        let outcome = prober(&client)
            .wait_until_healthy(
                &urls(),
                Duration::from_millis(1500),
                Duration::from_secs(90),
                &mut Shutdown::never(),
            )
            .await;

        match outcome {
            WaitOutcome::Healthy {
                attempts, elapsed, ..
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(elapsed, Duration::from_millis(4500));
            }
            other => panic!("expected healthy, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_with_last_result() {
        let client = Arc::new(ScriptedHttpClient::new());
        client.route(URL, Route::Refuse);
        let outcome = prober(&client)
            .wait_until_healthy(
                &urls(),
                Duration::from_millis(1500),
                Duration::from_secs(10),
                &mut Shutdown::never(),
            )
            .await;

        match outcome {
            WaitOutcome::TimedOut {
                attempts,
                elapsed,
                last,
            } => {
                assert_eq!(attempts, 7);
                assert_eq!(elapsed, Duration::from_secs(10));
                assert!(last.is_some_and(|r| !r.healthy));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probes_do_not_compound_delay() {
        let client = Arc::new(ScriptedHttpClient::new());
        client.route(URL, Route::json(503, "{}").delayed(Duration::from_secs(2)));
        let outcome = prober(&client)
            .wait_until_healthy(
                &urls(),
                Duration::from_secs(1),
                Duration::from_secs(9),
                &mut Shutdown::never(),
            )
            .await;

        // Probes start at 0, 2, 4, 6 and 8 seconds: back-to-back, no gaps.
        assert!(matches!(outcome, WaitOutcome::TimedOut { attempts: 5, .. }), "{outcome:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_wait() {
        let client = Arc::new(ScriptedHttpClient::new());
        client.route(URL, Route::Refuse);
        let (trigger, mut shutdown) = Shutdown::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.trigger();
        });

        let outcome = prober(&client)
            .wait_until_healthy(
                &urls(),
                Duration::from_millis(1500),
                Duration::from_secs(90),
                &mut shutdown,
            )
            .await;
        assert_eq!(outcome, WaitOutcome::Cancelled { attempts: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn any_listed_url_can_open_the_gate() {
        let fallback = "http://localhost:8000/health";
        let client = Arc::new(ScriptedHttpClient::new());
        client.route(URL, Route::Refuse);
        client.route(fallback, Route::ok());

        let outcome = prober(&client)
            .wait_until_healthy(
                &[URL.to_string(), fallback.to_string()],
                Duration::from_millis(1500),
                Duration::from_secs(10),
                &mut Shutdown::never(),
            )
            .await;

        assert!(matches!(outcome, WaitOutcome::Healthy { attempts: 1, .. }), "{outcome:?}");
        assert_eq!(client.call_count(URL), 1);
        assert_eq!(client.call_count(fallback), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_any_stops_at_first_healthy() {
        let docs = "http://127.0.0.1:8000/docs";
        let client = Arc::new(ScriptedHttpClient::new());
        client.route(URL, Route::json(503, "{}"));
        client.route(docs, Route::ok());
        let urls = [URL.to_string(), docs.to_string(), "http://never".to_string()];

        let result = prober(&client)
            .probe_any(&urls, Duration::from_secs(3))
            .await
            .unwrap();
        assert!(result.healthy);
        assert_eq!(client.call_count("http://never"), 0);

        client.route(docs, Route::Refuse);
        let result = prober(&client)
            .probe_any(&urls[..2], Duration::from_secs(3))
            .await
            .unwrap();
        assert!(!result.healthy);
        assert_eq!(result.status, None);

        assert!(prober(&client).probe_any(&[], Duration::from_secs(3)).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn huge_waits_do_not_overflow() {
        let client = Arc::new(ScriptedHttpClient::new());
        client.route(URL, Route::HealthyAfter { failures: 1 });
        let outcome = prober(&client)
            .wait_until_healthy(
                &urls(),
                Duration::from_secs(1),
                Duration::from_secs(u64::MAX),
                &mut Shutdown::never(),
            )
            .await;
        assert!(matches!(outcome, WaitOutcome::Healthy { attempts: 2, .. }), "{outcome:?}");

        let refusing = Arc::new(ScriptedHttpClient::new());
        refusing.route(URL, Route::Refuse);
        let (trigger, mut shutdown) = Shutdown::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.trigger();
        });
        let outcome = prober(&refusing)
            .wait_until_healthy(&urls(), Duration::MAX, Duration::MAX, &mut shutdown)
            .await;
        assert_eq!(outcome, WaitOutcome::Cancelled { attempts: 1 });
    }
}
