//! Rate-limit information carried by response headers.

use reqwest::header::HeaderMap;
use std::time::Duration;

const LIMIT: &str = "x-ratelimit-limit";
const REMAINING: &str = "x-ratelimit-remaining";
const RESET_AFTER: &str = "x-ratelimit-reset-after";
const BUCKET: &str = "x-ratelimit-bucket";
const GLOBAL: &str = "x-ratelimit-global";
const SCOPE: &str = "x-ratelimit-scope";
const RETRY_AFTER: &str = "retry-after";

/// Bucket state reported by the server for one response.
///
/// Values the server omits fall back to a single-call window that resets
/// immediately.
///
/// # Example
///
/// ```
/// use parley_rate_limit::RateLimitHeaders;
/// use reqwest::header::{HeaderMap, HeaderValue};
///
/// let mut headers = HeaderMap::new();
/// headers.insert("x-ratelimit-limit", HeaderValue::from_static("5"));
/// headers.insert("x-ratelimit-remaining", HeaderValue::from_static("4"));
/// headers.insert("x-ratelimit-reset-after", HeaderValue::from_static("1.25"));
/// headers.insert("x-ratelimit-bucket", HeaderValue::from_static("abcd1234"));
///
/// let parsed = RateLimitHeaders::from_headers(&headers).unwrap();
/// assert_eq!(parsed.limit, 5);
/// assert_eq!(parsed.remaining, 4);
/// assert_eq!(parsed.bucket.as_deref(), Some("abcd1234"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitHeaders {
    /// Calls allowed per window
    pub limit: u32,
    /// Calls left in the current window
    pub remaining: u32,
    /// Seconds until the window resets
    pub reset_after: f64,
    /// Server-assigned bucket hash
    pub bucket: Option<String>,
    /// The response was a global limit breach
    pub global: bool,
    /// `user`, `global` or `shared`
    pub scope: Option<String>,
    /// Seconds from the `Retry-After` header
    pub retry_after: Option<f64>,
}

impl RateLimitHeaders {
    /// Parse rate-limit headers, or `None` when the response has no bucket information.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let has_bucket_info = [LIMIT, REMAINING, RESET_AFTER, BUCKET]
            .iter()
            .any(|name| headers.contains_key(*name));
        if !has_bucket_info {
            return None;
        }

        Some(Self {
            limit: parse(headers, LIMIT).unwrap_or(1),
            remaining: parse(headers, REMAINING).unwrap_or(1),
            reset_after: parse::<f64>(headers, RESET_AFTER)
                .filter(|value| value.is_finite() && *value >= 0.0)
                .unwrap_or(0.0),
            bucket: text(headers, BUCKET),
            global: text(headers, GLOBAL).is_some_and(|value| value.eq_ignore_ascii_case("true")),
            scope: text(headers, SCOPE),
            retry_after: parse_retry_after(headers),
        })
    }

    /// Time until the window resets.
    pub fn reset_after(&self) -> Duration {
        Duration::try_from_secs_f64(self.reset_after).unwrap_or(Duration::ZERO)
    }
}

/// Seconds from a `Retry-After` header, if present and numeric.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<f64> {
    parse::<f64>(headers, RETRY_AFTER).filter(|value| value.is_finite() && *value >= 0.0)
}

fn text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}

fn parse<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn absent_headers_give_none() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert!(RateLimitHeaders::from_headers(&headers).is_none());
        assert_eq!(parse_retry_after(&headers), Some(3.0));
    }

    #[test]
    fn missing_values_default_to_single_call_window() {
        let mut headers = HeaderMap::new();
        headers.insert(BUCKET, HeaderValue::from_static("h"));
        let parsed = RateLimitHeaders::from_headers(&headers).unwrap();
        assert_eq!(parsed.limit, 1);
        assert_eq!(parsed.remaining, 1);
        assert_eq!(parsed.reset_after(), Duration::ZERO);
        assert!(!parsed.global);
    }

    #[test]
    fn global_and_scope() {
        let mut headers = HeaderMap::new();
        headers.insert(LIMIT, HeaderValue::from_static("50"));
        headers.insert(GLOBAL, HeaderValue::from_static("true"));
        headers.insert(SCOPE, HeaderValue::from_static("global"));
        let parsed = RateLimitHeaders::from_headers(&headers).unwrap();
        assert!(parsed.global);
        assert_eq!(parsed.scope.as_deref(), Some("global"));
    }

    #[test]
    fn negative_reset_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(RESET_AFTER, HeaderValue::from_static("-4"));
        let parsed = RateLimitHeaders::from_headers(&headers).unwrap();
        assert_eq!(parsed.reset_after, 0.0);
    }
}
