//! REST pipeline error types.
//!
//! Every error the request executor surfaces to application code is one of
//! the variants of [`RestErrorKind`]. Transient conditions (rate limits,
//! recoverable server and transport failures, the first rejected
//! credential) are recovered inside the executor and never appear here.

/// Maximum number of bytes of a response body kept in an error.
pub const BODY_SNIPPET_LIMIT: usize = 512;

/// Truncate a response body to [`BODY_SNIPPET_LIMIT`] bytes for diagnostics.
///
/// Invalid UTF-8 is replaced and truncation never splits a character.
///
/// # Examples
///
/// ```
/// use parley_error::{body_snippet, BODY_SNIPPET_LIMIT};
///
/// let long = vec![b'a'; BODY_SNIPPET_LIMIT * 2];
/// let snippet = body_snippet(&long);
/// assert!(snippet.len() <= BODY_SNIPPET_LIMIT + 3);
/// assert!(snippet.ends_with("..."));
/// ```
pub fn body_snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= BODY_SNIPPET_LIMIT {
        return text.into_owned();
    }
    let mut end = BODY_SNIPPET_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Specific REST error conditions.
///
/// `route` fields hold the route identity (`METHOD /template [major params]`),
/// never the compiled path, so webhook tokens and credentials stay out of
/// error messages.
#[derive(Debug, Clone, PartialEq, derive_more::Display)]
pub enum RestErrorKind {
    /// Waiting out the rate limit would exceed the caller's budget.
    #[display(
        "Rate limited on {} for {:.3}s, exceeding max_rate_limit of {:.3}s",
        route,
        retry_after,
        max_rate_limit
    )]
    RateLimitTooLong {
        /// Route identity
        route: String,
        /// Seconds the request would have to wait
        retry_after: f64,
        /// Configured budget in seconds
        max_rate_limit: f64,
    },

    /// Credential rejected after the refresh budget was spent.
    #[display("Unauthorized ({}) on {}", status, route)]
    Unauthorized {
        /// Route identity
        route: String,
        /// HTTP status code
        status: u16,
    },

    /// Non-retryable 4xx response.
    #[display("HTTP {} on {}: {} (code {}): {}", status, route, message, code, body)]
    ClientResponse {
        /// Route identity
        route: String,
        /// HTTP status code
        status: u16,
        /// Platform error code from the JSON body, 0 when absent
        code: i64,
        /// Platform error message from the JSON body
        message: String,
        /// Truncated response body
        body: String,
    },

    /// 5xx response after retries were exhausted.
    #[display("HTTP {} on {}: {}", status, route, body)]
    ServerResponse {
        /// Route identity
        route: String,
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },

    /// Connection-level failure after retries were exhausted.
    #[display("Transport failure on {}: {}", route, message)]
    Transport {
        /// Route identity
        route: String,
        /// Underlying transport message
        message: String,
    },

    /// Caller deadline expired.
    #[display("Deadline of {:.3}s exceeded on {}", deadline, route)]
    Timeout {
        /// Route identity
        route: String,
        /// Deadline in seconds
        deadline: f64,
    },

    /// A successful response carried a body that is not JSON.
    #[display("Unexpected content type '{}' with HTTP {} on {}", content_type, status, route)]
    UnexpectedContent {
        /// Route identity
        route: String,
        /// HTTP status code
        status: u16,
        /// Content-Type header value
        content_type: String,
    },

    /// A JSON body did not have the expected shape.
    #[display("Failed to decode response from {}: {}", route, message)]
    Decode {
        /// Route identity
        route: String,
        /// Deserializer message
        message: String,
    },

    /// Credential refresh failed for a reason other than an HTTP response.
    #[display("Credential refresh failed: {}", _0)]
    Credential(String),

    /// The request could not be constructed.
    #[display("Invalid request: {}", _0)]
    InvalidRequest(String),
}

impl RestErrorKind {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            RestErrorKind::Unauthorized { status, .. }
            | RestErrorKind::ClientResponse { status, .. }
            | RestErrorKind::ServerResponse { status, .. }
            | RestErrorKind::UnexpectedContent { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// REST error with source location tracking.
///
/// # Examples
///
/// ```
/// use parley_error::{RestError, RestErrorKind};
///
/// let err = RestError::new(RestErrorKind::ClientResponse {
///     route: "GET /channels/{channel} [123]".to_string(),
///     status: 404,
///     code: 10003,
///     message: "Unknown Channel".to_string(),
///     body: String::new(),
/// });
/// assert!(err.is_not_found());
/// assert_eq!(err.status(), Some(404));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("REST Error: {} at line {} in {}", kind, line, file)]
pub struct RestError {
    /// The kind of error that occurred
    pub kind: RestErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl RestError {
    /// Create a new RestError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: RestErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &RestErrorKind {
        &self.kind
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        self.kind.status()
    }

    /// 404 Not Found.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// 403 Forbidden.
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    /// 400 Bad Request.
    pub fn is_bad_request(&self) -> bool {
        self.status() == Some(400)
    }

    /// The caller's rate-limit budget was exceeded.
    pub fn is_rate_limit_too_long(&self) -> bool {
        matches!(self.kind, RestErrorKind::RateLimitTooLong { .. })
    }

    /// The caller's deadline expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, RestErrorKind::Timeout { .. })
    }
}

/// Result type for REST operations.
pub type RestResult<T> = std::result::Result<T, RestError>;
