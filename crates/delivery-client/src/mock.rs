//! Scripted in-process transport for tests.
//!
//! Replies are routed by URL substring. A route holding several replies hands
//! them out in order and then keeps repeating the last one.

use crate::{reason_phrase, DeliveryError, DeliveryResult, HttpResponse, HttpTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use url::Url;

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: Url,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
enum Outcome {
    Respond { status: u16, body: String },
    Fail(String),
}

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct MockReply {
    outcome: Outcome,
    delay: Duration,
}

impl MockReply {
    pub fn status(status: u16) -> Self {
        Self::with_body(status, "")
    }

    pub fn ok() -> Self {
        Self::status(200)
    }

    pub fn json(value: Value) -> Self {
        Self::with_body(200, value.to_string())
    }

    pub fn with_body(status: u16, body: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Respond {
                status,
                body: body.into(),
            },
            delay: Duration::ZERO,
        }
    }

    /// Fail at the transport level without a response.
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Fail(message.into()),
            delay: Duration::ZERO,
        }
    }

    /// Delay the reply.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

struct Route {
    pattern: String,
    replies: VecDeque<MockReply>,
}

/// In-process [`HttpTransport`] with scripted replies and request capture.
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    fallback: Mutex<MockReply>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Every unrouted request answers `200` with an empty body.
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            fallback: Mutex::new(MockReply::ok()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer requests whose URL contains `pattern` with `reply`.
    pub fn route(&self, pattern: impl Into<String>, reply: MockReply) -> &Self {
        self.route_sequence(pattern, vec![reply])
    }

    /// Answer matching requests with `replies` in order, repeating the last.
    pub fn route_sequence(&self, pattern: impl Into<String>, replies: Vec<MockReply>) -> &Self {
        self.routes.lock().push(Route {
            pattern: pattern.into(),
            replies: replies.into(),
        });
        self
    }

    pub fn set_fallback(&self, reply: MockReply) {
        *self.fallback.lock() = reply;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_reply(&self, url: &Url) -> MockReply {
        let mut routes = self.routes.lock();
        let route = routes
            .iter_mut()
            .find(|route| url.as_str().contains(&route.pattern));
        match route {
            Some(route) if route.replies.len() > 1 => {
                route.replies.pop_front().unwrap_or_else(MockReply::ok)
            }
            Some(route) => route.replies.front().cloned().unwrap_or_else(MockReply::ok),
            None => self.fallback.lock().clone(),
        }
    }

    async fn exchange(
        &self,
        method: &'static str,
        url: &Url,
        body: Option<Value>,
    ) -> DeliveryResult<HttpResponse> {
        self.requests.lock().push(RecordedRequest {
            method,
            url: url.clone(),
            body,
        });
        let reply = self.next_reply(url);
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        match reply.outcome {
            Outcome::Respond { status, body } => Ok(HttpResponse {
                status,
                status_text: reason_phrase(status),
                body,
            }),
            Outcome::Fail(message) => Err(DeliveryError::Transport(message)),
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn post_json(&self, url: &Url, body: &Value) -> DeliveryResult<HttpResponse> {
        self.exchange("POST", url, Some(body.clone())).await
    }

    async fn get(&self, url: &Url) -> DeliveryResult<HttpResponse> {
        self.exchange("GET", url, None).await
    }
}
