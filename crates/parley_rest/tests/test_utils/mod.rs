//! Test utilities for the REST pipeline.
//!
//! Provides a scripted transport, a counting token strategy and helpers that
//! build an executor with deterministic settings.

#![allow(dead_code)]

pub mod mock_transport;

pub use mock_transport::{MockReply, MockTransport, Recorded};

use async_trait::async_trait;
use parley_core::{CompiledRoute, routes};
use parley_error::RestError;
use parley_rate_limit::{RateLimitConfig, RestConfig};
use parley_rest::{RestExecutor, TokenIssuer, TokenStrategy, TokenType};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Refreshable token whose value changes on every invalidation.
#[derive(Debug, Default)]
pub struct CountingToken {
    generation: AtomicUsize,
    acquires: AtomicUsize,
    invalidations: AtomicUsize,
}

impl CountingToken {
    /// Times the executor asked for a token.
    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    /// Times the executor invalidated a token.
    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStrategy for CountingToken {
    fn token_type(&self) -> TokenType {
        TokenType::Bearer
    }

    async fn acquire(&self, _issuer: &dyn TokenIssuer) -> Result<String, RestError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "Bearer token-{}",
            self.generation.load(Ordering::SeqCst)
        ))
    }

    fn invalidate(&self, _token: Option<&str>) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn is_refreshable(&self) -> bool {
        true
    }
}

/// REST settings with jitter off so backoff delays are exact.
pub fn rest_config() -> RestConfig {
    RestConfig::default()
        .with_base_url("https://chat.test/api/v10".to_string())
        .with_backoff_jitter(false)
}

/// Rate limit settings with the proactive global cap disabled.
pub fn rate_limit_config() -> RateLimitConfig {
    RateLimitConfig::default().with_global_requests_per_second(0)
}

/// Executor over `transport` with the given settings.
pub fn executor_with(
    config: RestConfig,
    transport: Arc<MockTransport>,
    token: Option<Arc<dyn TokenStrategy>>,
) -> RestExecutor {
    RestExecutor::new(config, &rate_limit_config(), transport, token)
}

/// Executor over `transport` with default test settings.
pub fn executor(
    transport: Arc<MockTransport>,
    token: Option<Arc<dyn TokenStrategy>>,
) -> RestExecutor {
    executor_with(rest_config(), transport, token)
}

/// `GET /channels/{channel}/messages` for `channel`.
pub fn messages_route(channel: u64) -> CompiledRoute {
    routes::GET_CHANNEL_MESSAGES
        .compile(&[("channel", &channel)])
        .expect("route compiles")
}
