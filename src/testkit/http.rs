//! Scripted [`HttpClient`] for probe and broadcast tests.
//!
//! Responses are routed by exact URL. Unrouted URLs are refused, which is
//! what a real client sees before a service binds its port. Delays run on
//! the tokio clock, so `start_paused` tests stay instantaneous.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::port::outbound::http::{HttpClient, HttpRequest, HttpResponse, TransportError};

/// How the fake answers one URL.
#[derive(Debug, Clone)]
pub enum Route {
    Respond {
        status: u16,
        body: String,
        delay: Duration,
    },
    /// Connection refused, immediately.
    Refuse,
    /// Never answers; the request times out.
    Hang,
    /// Refuse the first `failures` calls, then answer `200 {"status":"ok"}`.
    HealthyAfter { failures: u32 },
}

impl Route {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self::Respond {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn ok() -> Self {
        Self::json(200, r#"{"status":"ok"}"#)
    }

    /// Answer after `delay`. Only meaningful for [`Route::Respond`].
    #[must_use]
    pub fn delayed(self, delay: Duration) -> Self {
        match self {
            Self::Respond { status, body, .. } => Self::Respond {
                status,
                body,
                delay,
            },
            other => other,
        }
    }
}

/// A request the fake received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub at: Instant,
    pub request: HttpRequest,
}

#[derive(Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the route for `url`.
    pub fn route(&self, url: impl Into<String>, route: Route) {
        self.routes.lock().insert(url.into(), route);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of requests made to `url`.
    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.request.url == url)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let previous = self.call_count(&request.url);
        let timeout = request.timeout;
        let route = self.routes.lock().get(&request.url).cloned();
        self.calls.lock().push(RecordedCall {
            at: Instant::now(),
            request: request.clone(),
        });

        match route {
            None | Some(Route::Refuse) => {
                Err(TransportError::ConnectionRefused(request.url.clone()))
            }
            Some(Route::Hang) => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::Timeout)
            }
            Some(Route::HealthyAfter { failures }) => {
                if previous < failures as usize {
                    Err(TransportError::ConnectionRefused(request.url.clone()))
                } else {
                    Ok(HttpResponse {
                        status: 200,
                        body: br#"{"status":"ok"}"#.to_vec(),
                    })
                }
            }
            Some(Route::Respond {
                status,
                body,
                delay,
            }) => {
                if delay > timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(TransportError::Timeout);
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(HttpResponse {
                    status,
                    body: body.into_bytes(),
                })
            }
        }
    }
}
