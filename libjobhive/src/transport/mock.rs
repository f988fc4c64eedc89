//! Scriptable transport for testing
//!
//! Responses are registered per method and path. A route can hold a
//! sequence of responses: each request consumes the front of the queue and
//! the last response repeats. Unrouted requests get a 404. Every request
//! is recorded so tests can assert on call counts, headers and query
//! strings without a network.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;

use super::{ApiRequest, ApiResponse, Method, Transport};
use crate::error::ApiError;

/// One scripted outcome
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond { status: u16, body: String },
    /// Simulates a connection failure
    Fail(String),
}

#[derive(Debug, Clone)]
struct Scripted {
    reply: MockReply,
    delay: Duration,
}

#[derive(Default)]
struct MockState {
    routes: HashMap<(Method, String), VecDeque<Scripted>>,
    calls: Vec<ApiRequest>,
}

/// Mock transport; clones share routes and the call log
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, method: Method, path: &str, scripted: Scripted) {
        self.state()
            .routes
            .entry((method, path.to_string()))
            .or_default()
            .push_back(scripted);
    }

    /// Queue a response for `method path`
    pub fn respond(&self, method: Method, path: &str, status: u16, body: impl Into<String>) -> &Self {
        self.respond_after(method, path, status, body, Duration::ZERO)
    }

    /// Queue a JSON response
    pub fn respond_json(
        &self,
        method: Method,
        path: &str,
        status: u16,
        body: serde_json::Value,
    ) -> &Self {
        self.respond(method, path, status, body.to_string())
    }

    /// Queue a response that is delivered after `delay`
    pub fn respond_after(
        &self,
        method: Method,
        path: &str,
        status: u16,
        body: impl Into<String>,
        delay: Duration,
    ) -> &Self {
        self.push(
            method,
            path,
            Scripted {
                reply: MockReply::Respond {
                    status,
                    body: body.into(),
                },
                delay,
            },
        );
        self
    }

    /// Queue a transport failure
    pub fn fail(&self, method: Method, path: &str, message: &str) -> &Self {
        self.push(
            method,
            path,
            Scripted {
                reply: MockReply::Fail(message.to_string()),
                delay: Duration::ZERO,
            },
        );
        self
    }

    /// All recorded requests, oldest first
    pub fn calls(&self) -> Vec<ApiRequest> {
        self.state().calls.clone()
    }

    /// Total number of requests received
    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Number of requests received for `method path`
    pub fn calls_to(&self, method: Method, path: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .count()
    }

    fn next_reply(&self, request: &ApiRequest) -> Option<Scripted> {
        let mut state = self.state();
        state.calls.push(request.clone());
        let queue = state
            .routes
            .get_mut(&(request.method, request.path.clone()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let Some(scripted) = self.next_reply(&request) else {
            return Ok(ApiResponse::new(404, "no mock route"));
        };

        if !scripted.delay.is_zero() {
            sleep(scripted.delay).await;
        }

        match scripted.reply {
            MockReply::Respond { status, body } => Ok(ApiResponse { status, body }),
            MockReply::Fail(message) => Err(ApiError::Transport(message)),
        }
    }
}
