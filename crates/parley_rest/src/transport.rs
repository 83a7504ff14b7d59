//! HTTP transport abstraction.

use async_trait::async_trait;
use parley_core::HttpMethod;
use parley_error::{RestError, RestErrorKind};
use reqwest::header::HeaderMap;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, instrument};

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/json`
    Json(JsonValue),
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
}

/// One fully prepared HTTP call.
///
/// The `Authorization` header, when present, is marked sensitive so it is
/// redacted from `Debug` output.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute URL including query string
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Optional body
    pub body: Option<RequestBody>,
}

/// Raw HTTP response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Vec<u8>,
}

/// Connection-level failure: no HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("{}", message)]
pub struct TransportError {
    /// Description of the failure
    pub message: String,
    /// The attempt timed out
    pub is_timeout: bool,
}

impl TransportError {
    /// Connection failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_timeout: false,
        }
    }

    /// Per-attempt timeout.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_timeout: true,
        }
    }
}

/// Performs HTTP calls for the executor.
///
/// Implementations must return `Ok` for every HTTP response regardless of
/// status, and `Err` only when no response was received.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a per-attempt timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, RestError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                RestError::new(RestErrorKind::InvalidRequest(format!(
                    "Failed to build HTTP client: {}",
                    e
                )))
            })?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method))]
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url)
            .headers(request.headers);

        builder = match request.body {
            Some(RequestBody::Json(json)) => builder.json(&json),
            Some(RequestBody::Form(fields)) => builder.form(&fields),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::timeout(format!("Request timed out: {}", e.without_url()))
            } else {
                TransportError::connection(format!("Request failed: {}", e.without_url()))
            }
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::timeout(format!("Reading body timed out: {}", e.without_url()))
            } else {
                TransportError::connection(format!("Failed to read body: {}", e.without_url()))
            }
        })?;

        debug!(status, bytes = body.len(), "Received response");
        Ok(TransportResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
