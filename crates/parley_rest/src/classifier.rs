//! Classification of HTTP outcomes.

use crate::TransportError;
use parley_core::CompiledRoute;
use parley_error::{RestError, RestErrorKind, body_snippet};
use parley_rate_limit::{RateLimitHeaders, parse_retry_after};
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use serde::Deserialize;
use serde_json::Value as JsonValue;

const GLOBAL_HEADER: &str = "x-ratelimit-global";

/// What a 429 applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RateLimitScope {
    /// Every authenticated request; engage the global throttle.
    Global,
    /// The route's bucket, whose state now shows the window exhausted.
    Bucket,
    /// A limit the bucket headers do not describe; wait `retry_after`.
    Route,
}

/// Result of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// 2xx. `None` for empty bodies.
    Success(Option<JsonValue>),
    /// 429.
    RateLimited {
        /// Seconds to wait
        retry_after: f64,
        /// What the limit applies to
        scope: RateLimitScope,
    },
    /// 401; the credential was rejected.
    Unauthorized {
        /// HTTP status code
        status: u16,
    },
    /// 5xx.
    ServerError {
        /// HTTP status code
        status: u16,
        /// Worth retrying with backoff
        retryable: bool,
        /// Truncated body
        body: String,
    },
    /// Any other non-success status.
    ClientError {
        /// HTTP status code
        status: u16,
        /// Platform error code, 0 when absent
        code: i64,
        /// Platform error message
        message: String,
        /// Truncated body
        body: String,
    },
    /// 2xx with a body that is not JSON.
    UnexpectedContent {
        /// HTTP status code
        status: u16,
        /// Content-Type header value
        content_type: String,
    },
    /// No response was received.
    TransportFailure {
        /// Transport message
        message: String,
        /// The attempt timed out
        is_timeout: bool,
    },
}

impl From<TransportError> for RequestOutcome {
    fn from(error: TransportError) -> Self {
        RequestOutcome::TransportFailure {
            message: error.message,
            is_timeout: error.is_timeout,
        }
    }
}

impl RequestOutcome {
    /// The error surfaced when this outcome is final.
    ///
    /// `Success` has no error form and maps to `InvalidRequest`; callers only
    /// convert failures.
    #[track_caller]
    pub fn into_error(self, route: &CompiledRoute) -> RestError {
        let route = route.to_string();
        let kind = match self {
            RequestOutcome::Success(_) => {
                RestErrorKind::InvalidRequest("successful outcome is not an error".to_string())
            }
            RequestOutcome::RateLimited { retry_after, .. } => RestErrorKind::RateLimitTooLong {
                route,
                retry_after,
                max_rate_limit: 0.0,
            },
            RequestOutcome::Unauthorized { status } => RestErrorKind::Unauthorized { route, status },
            RequestOutcome::ServerError { status, body, .. } => {
                RestErrorKind::ServerResponse { route, status, body }
            }
            RequestOutcome::ClientError {
                status,
                code,
                message,
                body,
            } => RestErrorKind::ClientResponse {
                route,
                status,
                code,
                message,
                body,
            },
            RequestOutcome::UnexpectedContent {
                status,
                content_type,
            } => RestErrorKind::UnexpectedContent {
                route,
                status,
                content_type,
            },
            RequestOutcome::TransportFailure { message, .. } => {
                RestErrorKind::Transport { route, message }
            }
        };
        RestError::new(kind)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
    #[serde(default)]
    global: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

fn is_json(headers: &HeaderMap) -> bool {
    content_type(headers).starts_with("application/json")
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Decide the outcome of one HTTP response.
///
/// Pure: no side effects, no I/O.
///
/// # Example
///
/// ```
/// use parley_rest::{classify, RateLimitScope, RequestOutcome};
/// use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
///
/// let mut headers = HeaderMap::new();
/// headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
///
/// let outcome = classify(429, &headers, br#"{"global": true, "retry_after": 2.0}"#);
/// assert_eq!(
///     outcome,
///     RequestOutcome::RateLimited { retry_after: 2.0, scope: RateLimitScope::Global }
/// );
/// ```
pub fn classify(status: u16, headers: &HeaderMap, body: &[u8]) -> RequestOutcome {
    match status {
        204 => RequestOutcome::Success(None),
        200..=299 => classify_success(status, headers, body),
        401 => RequestOutcome::Unauthorized { status },
        429 => classify_rate_limit(headers, body),
        500..=599 => RequestOutcome::ServerError {
            status,
            retryable: matches!(status, 500 | 502 | 503 | 504),
            body: body_snippet(body),
        },
        _ => {
            let error: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
            RequestOutcome::ClientError {
                status,
                code: error.code,
                message: error.message,
                body: body_snippet(body),
            }
        }
    }
}

fn classify_success(status: u16, headers: &HeaderMap, body: &[u8]) -> RequestOutcome {
    if body.is_empty() {
        return RequestOutcome::Success(None);
    }
    if !is_json(headers) {
        return RequestOutcome::UnexpectedContent {
            status,
            content_type: content_type(headers),
        };
    }
    match serde_json::from_slice(body) {
        Ok(value) => RequestOutcome::Success(Some(value)),
        Err(_) => RequestOutcome::UnexpectedContent {
            status,
            content_type: content_type(headers),
        },
    }
}

fn classify_rate_limit(headers: &HeaderMap, body: &[u8]) -> RequestOutcome {
    let limits = RateLimitHeaders::from_headers(headers);

    let parsed: Option<RateLimitBody> = if is_json(headers) {
        serde_json::from_slice(body).ok()
    } else {
        None
    };

    let retry_after = parsed
        .as_ref()
        .and_then(|body| body.retry_after)
        .filter(|value| value.is_finite() && *value >= 0.0)
        .or_else(|| parse_retry_after(headers));

    let Some(retry_after) = retry_after else {
        return RequestOutcome::ClientError {
            status: 429,
            code: 0,
            message: "rate limited without retry_after".to_string(),
            body: body_snippet(body),
        };
    };

    let global = parsed.as_ref().is_some_and(|body| body.global)
        || headers
            .get(GLOBAL_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));

    let scope = if global {
        RateLimitScope::Global
    } else if limits
        .as_ref()
        .is_some_and(|limits| limits.remaining == 0 && limits.reset_after > 0.0)
    {
        RateLimitScope::Bucket
    } else {
        RateLimitScope::Route
    };

    RequestOutcome::RateLimited { retry_after, scope }
}
