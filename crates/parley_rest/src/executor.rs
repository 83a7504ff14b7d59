//! Request executor: the per-request retry loop.

use crate::{
    RateLimitScope, RequestOutcome, RestRequest, StaticToken, TokenIssuer, TokenStrategy,
    Transport, TransportRequest, classify,
};
use async_trait::async_trait;
use parley_core::{OAuth2Token, routes};
use parley_error::{RestError, RestErrorKind, RestResult};
use parley_rate_limit::{
    GlobalThrottle, RateLimitConfig, RateLimitHeaders, RestConfig, RouteBucketTracker, WaitBudget,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry2::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, instrument, warn};

const RATE_LIMIT_PRECISION: &str = "x-ratelimit-precision";
const AUDIT_LOG_REASON: &str = "x-audit-log-reason";

type Backoff = Box<dyn Iterator<Item = Duration> + Send>;

/// Percent-encode a header value for the platform's URL-decoding headers.
pub(crate) fn url_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn invalid(message: impl Into<String>) -> RestError {
    RestError::new(RestErrorKind::InvalidRequest(message.into()))
}

/// Runs REST calls through bucket admission, the global throttle,
/// credential acquisition and the retry policy.
///
/// Shared state lives in the bucket tracker, the global throttle and the
/// token strategy. Everything else is local to a single call.
pub struct RestExecutor {
    config: RestConfig,
    transport: Arc<dyn Transport>,
    buckets: RouteBucketTracker,
    global: GlobalThrottle,
    token: Option<Arc<dyn TokenStrategy>>,
}

impl std::fmt::Debug for RestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestExecutor")
            .field("base_url", self.config.base_url())
            .field("buckets", &self.buckets.len())
            .field("global", &self.global)
            .field("token", &self.token)
            .finish()
    }
}

impl RestExecutor {
    /// Create an executor from configuration.
    ///
    /// The bucket eviction sweep starts when called inside a Tokio runtime.
    #[instrument(skip_all, fields(base_url = %config.base_url()))]
    pub fn new(
        config: RestConfig,
        rate_limit: &RateLimitConfig,
        transport: Arc<dyn Transport>,
        token: Option<Arc<dyn TokenStrategy>>,
    ) -> Self {
        debug!("Creating REST executor");
        Self::from_parts(
            config,
            transport,
            RouteBucketTracker::from_config(rate_limit),
            GlobalThrottle::from_config(rate_limit),
            token,
        )
    }

    /// Create an executor from already constructed components.
    pub fn from_parts(
        config: RestConfig,
        transport: Arc<dyn Transport>,
        buckets: RouteBucketTracker,
        global: GlobalThrottle,
        token: Option<Arc<dyn TokenStrategy>>,
    ) -> Self {
        Self {
            config,
            transport,
            buckets,
            global,
            token,
        }
    }

    /// Executor settings.
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    /// Route bucket tracker.
    pub fn buckets(&self) -> &RouteBucketTracker {
        &self.buckets
    }

    /// Global throttle.
    pub fn global(&self) -> &GlobalThrottle {
        &self.global
    }

    /// Token strategy, if requests are authenticated.
    pub fn token(&self) -> Option<&Arc<dyn TokenStrategy>> {
        self.token.as_ref()
    }

    /// Stop background work.
    pub fn close(&self) {
        self.buckets.close();
    }

    /// Execute one logical call.
    ///
    /// Returns the decoded JSON body, or `None` for empty responses.
    ///
    /// # Errors
    ///
    /// Returns the first non-recoverable outcome, or the last recoverable
    /// one once its retry budget is spent.
    #[instrument(skip(self, request), fields(route = %request.route()))]
    pub async fn execute(&self, request: RestRequest) -> RestResult<Option<JsonValue>> {
        let deadline = (*request.deadline()).or(self.config.request_deadline());
        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.run(&request))
                .await
                .unwrap_or_else(|_| {
                    warn!(deadline_secs = deadline.as_secs_f64(), "Request deadline exceeded");
                    Err(RestError::new(RestErrorKind::Timeout {
                        route: request.route().to_string(),
                        deadline: deadline.as_secs_f64(),
                    }))
                }),
            None => self.run(&request).await,
        }
    }

    async fn run(&self, request: &RestRequest) -> RestResult<Option<JsonValue>> {
        let route = request.route();
        let url = self.url_for(request)?;
        let mut budget = WaitBudget::new(self.config.max_rate_limit());
        let mut backoff = self.backoff();
        let mut credential_failures = 0u32;
        let mut server_failures = 0u32;
        let mut transport_failures = 0u32;

        loop {
            let permit = self.buckets.acquire(route, &mut budget).await?;
            if !request.no_auth() {
                self.global.acquire(route, &mut budget).await?;
            }

            let authorization = self.authorization(request).await?;
            let transport_request = self.prepare(request, &url, authorization.as_deref())?;

            let outcome = match self.transport.send(transport_request).await {
                Ok(response) => {
                    match RateLimitHeaders::from_headers(&response.headers) {
                        Some(headers) => permit.update(&headers),
                        None if (200..300).contains(&response.status) => permit.mark_unlimited(),
                        None => permit.release(),
                    }
                    classify(response.status, &response.headers, &response.body)
                }
                Err(error) => {
                    permit.release();
                    RequestOutcome::from(error)
                }
            };

            match outcome {
                RequestOutcome::Success(payload) => {
                    debug!("Request succeeded");
                    return Ok(payload);
                }

                RequestOutcome::RateLimited {
                    retry_after,
                    scope: RateLimitScope::Global,
                } => {
                    if request.no_auth() {
                        // Unauthenticated calls are limited apart from the shared gate.
                        let wait =
                            Duration::try_from_secs_f64(retry_after).unwrap_or(Duration::ZERO);
                        budget.charge(wait, route)?;
                        warn!(retry_after, "Unauthenticated request hit global rate limit");
                        tokio::time::sleep(wait).await;
                    } else {
                        self.global.throttle(retry_after);
                    }
                }

                RequestOutcome::RateLimited {
                    retry_after,
                    scope: RateLimitScope::Bucket,
                } => {
                    warn!(retry_after, "Bucket rate limited, waiting for window reset");
                }

                RequestOutcome::RateLimited {
                    retry_after,
                    scope: RateLimitScope::Route,
                } => {
                    let wait = Duration::try_from_secs_f64(retry_after).unwrap_or(Duration::ZERO);
                    if wait <= self.config.immediate_retry_threshold() {
                        debug!(retry_after, "Rate limited briefly, retrying immediately");
                    } else {
                        budget.charge(wait, route)?;
                        warn!(retry_after, "Rate limited, backing off");
                        tokio::time::sleep(wait).await;
                    }
                }

                RequestOutcome::Unauthorized { status } => {
                    let strategy = self
                        .token
                        .as_ref()
                        .filter(|token| token.is_refreshable())
                        .filter(|_| request.auth().is_none() && !request.no_auth());
                    match strategy {
                        Some(strategy) if credential_failures < *self.config.credential_retries() => {
                            credential_failures += 1;
                            warn!(
                                attempt = credential_failures,
                                "Credential rejected, refreshing and retrying"
                            );
                            strategy.invalidate(authorization.as_deref());
                        }
                        _ => {
                            return Err(RequestOutcome::Unauthorized { status }.into_error(route));
                        }
                    }
                }

                RequestOutcome::ServerError {
                    status,
                    retryable: true,
                    ..
                } if server_failures < *self.config.server_error_retries() => {
                    server_failures += 1;
                    let delay = backoff.next().unwrap_or_else(|| self.config.backoff_max());
                    warn!(
                        status,
                        attempt = server_failures,
                        delay_ms = delay.as_millis() as u64,
                        "Server error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }

                RequestOutcome::TransportFailure {
                    ref message,
                    is_timeout,
                } if transport_failures < *self.config.transport_retries() => {
                    transport_failures += 1;
                    let delay = backoff.next().unwrap_or_else(|| self.config.backoff_max());
                    warn!(
                        error = %message,
                        is_timeout,
                        attempt = transport_failures,
                        delay_ms = delay.as_millis() as u64,
                        "Transport failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }

                fatal => {
                    warn!(outcome = ?fatal, "Request failed");
                    return Err(fatal.into_error(route));
                }
            }
        }
    }

    fn backoff(&self) -> Backoff {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.config.backoff_base_ms() / 2)
            .max_delay(self.config.backoff_max());
        if *self.config.backoff_jitter() {
            Box::new(strategy.map(jitter))
        } else {
            Box::new(strategy)
        }
    }

    fn url_for(&self, request: &RestRequest) -> RestResult<String> {
        let base = format!(
            "{}{}",
            self.config.base_url().trim_end_matches('/'),
            request.route().path()
        );
        if request.query().is_empty() {
            return Ok(base);
        }
        reqwest::Url::parse_with_params(&base, request.query())
            .map(String::from)
            .map_err(|e| invalid(format!("Invalid URL for {}: {}", request.route(), e)))
    }

    async fn authorization(&self, request: &RestRequest) -> RestResult<Option<String>> {
        if let Some(auth) = request.auth() {
            return Ok(Some(auth.to_string()));
        }
        if request.no_auth() {
            return Ok(None);
        }
        match &self.token {
            Some(token) => token.acquire(self).await.map(Some),
            None => Ok(None),
        }
    }

    fn prepare(
        &self,
        request: &RestRequest,
        url: &str,
        authorization: Option<&str>,
    ) -> RestResult<TransportRequest> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(self.config.user_agent())
                .map_err(|_| invalid("user_agent is not a valid header value"))?,
        );
        headers.insert(
            HeaderName::from_static(RATE_LIMIT_PRECISION),
            HeaderValue::from_static("millisecond"),
        );

        if let Some(authorization) = authorization {
            let mut value = HeaderValue::from_str(authorization)
                .map_err(|_| invalid("credential is not a valid header value"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        if let Some(reason) = request.reason() {
            let value = HeaderValue::from_str(&url_encode(reason))
                .map_err(|_| invalid("audit log reason is not a valid header value"))?;
            headers.insert(HeaderName::from_static(AUDIT_LOG_REASON), value);
        }

        for (name, value) in request.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| invalid(format!("invalid header name '{}'", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| invalid(format!("invalid value for header '{}'", name)))?;
            headers.insert(name, value);
        }

        Ok(TransportRequest {
            method: request.route().method(),
            url: url.to_string(),
            headers,
            body: request.body(),
        })
    }
}

#[async_trait]
impl TokenIssuer for RestExecutor {
    #[instrument(skip(self, client_secret, scopes))]
    async fn issue_client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
        scopes: &[String],
    ) -> Result<OAuth2Token, RestError> {
        let route = routes::POST_TOKEN
            .compile(&[])
            .map_err(|e| invalid(e.to_string()))?;
        let request = RestRequest::builder()
            .route(route)
            .form(vec![
                ("grant_type".to_string(), "client_credentials".to_string()),
                ("scope".to_string(), scopes.join(" ")),
            ])
            .auth(StaticToken::basic(client_id, client_secret).header())
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        let payload = self.execute(request).await?.ok_or_else(|| {
            RestError::new(RestErrorKind::Credential(
                "token endpoint returned no body".to_string(),
            ))
        })?;

        serde_json::from_value(payload).map_err(|e| {
            RestError::new(RestErrorKind::Credential(format!(
                "malformed token response: {}",
                e
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_is_percent_encoded() {
        assert_eq!(url_encode("spam & abuse"), "spam%20%26%20abuse");
        assert_eq!(url_encode("a+b"), "a%2Bb");
    }
}
