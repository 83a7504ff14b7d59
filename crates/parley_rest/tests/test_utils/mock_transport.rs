//! Scripted transport for exercising the executor without a network.

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_rest::{Transport, TransportError, TransportRequest, TransportResponse};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// One canned reply.
#[derive(Debug, Clone)]
pub struct MockReply {
    result: Result<TransportResponse, TransportError>,
    delay: Duration,
}

impl MockReply {
    /// Response with a JSON body.
    pub fn json(status: u16, body: JsonValue) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            result: Ok(TransportResponse {
                status,
                headers,
                body: body.to_string().into_bytes(),
            }),
            delay: Duration::ZERO,
        }
    }

    /// Response with no body.
    pub fn empty(status: u16) -> Self {
        Self {
            result: Ok(TransportResponse {
                status,
                headers: HeaderMap::new(),
                body: Vec::new(),
            }),
            delay: Duration::ZERO,
        }
    }

    /// Response with a non-JSON body.
    pub fn text(status: u16, content_type: &'static str, body: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            result: Ok(TransportResponse {
                status,
                headers,
                body: body.as_bytes().to_vec(),
            }),
            delay: Duration::ZERO,
        }
    }

    /// Connection failure.
    pub fn transport_error() -> Self {
        Self {
            result: Err(TransportError::connection("connection reset by peer")),
            delay: Duration::ZERO,
        }
    }

    /// Add a response header.
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(response) = &mut self.result {
            response.headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_str(value).expect("valid header value"),
            );
        }
        self
    }

    /// Add the bucket headers the platform sends on every routed response.
    pub fn with_bucket(self, hash: &str, limit: u32, remaining: u32, reset_after: f64) -> Self {
        self.with_header("x-ratelimit-bucket", hash)
            .with_header("x-ratelimit-limit", &limit.to_string())
            .with_header("x-ratelimit-remaining", &remaining.to_string())
            .with_header("x-ratelimit-reset-after", &reset_after.to_string())
    }

    /// Wait before replying.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Handler = Box<dyn Fn(&TransportRequest) -> MockReply + Send + Sync>;

/// A request the mock received, with the time it arrived.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub request: TransportRequest,
    pub at: Instant,
}

impl Recorded {
    /// Header value as a string.
    pub fn header(&self, name: &str) -> Option<String> {
        self.request
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}

/// Transport double: records every request and answers from a script.
pub struct MockTransport {
    handler: Handler,
    requests: Mutex<Vec<Recorded>>,
}

impl MockTransport {
    /// Answer every request with `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&TransportRequest) -> MockReply + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer with `replies` in order, repeating the last one.
    pub fn sequence(replies: Vec<MockReply>) -> Self {
        let replies = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| {
            let mut replies = replies.lock();
            if replies.len() > 1 {
                replies.pop_front().expect("non-empty script")
            } else {
                replies.front().cloned().expect("non-empty script")
            }
        })
    }

    /// Answer every request the same way.
    pub fn always(reply: MockReply) -> Self {
        Self::sequence(vec![reply])
    }

    /// Number of requests received.
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }

    /// Requests whose URL contains `fragment`.
    pub fn requests_to(&self, fragment: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .iter()
            .filter(|recorded| recorded.request.url.contains(fragment))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let reply = (self.handler)(&request);
        self.requests.lock().push(Recorded {
            request,
            at: Instant::now(),
        });
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}
