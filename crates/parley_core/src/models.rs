//! Wire models decoded by the REST client itself.
//!
//! Everything else is returned to callers as raw JSON.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Gateway connection recommendations for a bot.
///
/// # Examples
///
/// ```
/// use parley_core::GatewayBot;
///
/// let bot: GatewayBot = serde_json::from_str(r#"{
///     "url": "wss://gateway.discord.gg",
///     "shards": 9,
///     "session_start_limit": {"total": 1000, "remaining": 999, "reset_after": 14400000}
/// }"#).unwrap();
///
/// assert_eq!(*bot.shards(), 9);
/// assert_eq!(bot.session_start_limit().used(), 1);
/// assert_eq!(*bot.session_start_limit().max_concurrency(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct GatewayBot {
    /// Gateway URL to connect to.
    url: String,
    /// Recommended shard count.
    shards: u32,
    /// Identify budget for the current window.
    session_start_limit: SessionStartLimit,
}

/// How many more sessions may be started within the current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct SessionStartLimit {
    /// Total identifies allowed per window.
    total: u32,
    /// Identifies left in this window.
    remaining: u32,
    /// Milliseconds until the window resets.
    #[serde(rename = "reset_after")]
    reset_after_ms: u64,
    /// Identifies allowed per five seconds.
    #[serde(default = "default_max_concurrency", deserialize_with = "at_least_one")]
    max_concurrency: u32,
}

fn default_max_concurrency() -> u32 {
    1
}

fn at_least_one<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(u32::deserialize(deserializer)?.max(1))
}

impl SessionStartLimit {
    /// Identifies already spent in this window.
    pub fn used(&self) -> u32 {
        self.total.saturating_sub(self.remaining)
    }

    /// Time until the window resets.
    pub fn reset_after(&self) -> Duration {
        Duration::from_millis(self.reset_after_ms)
    }
}

/// Result of an OAuth2 client credentials exchange.
///
/// `Debug` redacts the access token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct OAuth2Token {
    /// Bearer token value.
    access_token: String,
    /// Token type, normally `Bearer`.
    token_type: String,
    /// Lifetime in seconds.
    expires_in: u64,
    /// Space separated scopes granted.
    #[serde(default)]
    scope: String,
}

impl OAuth2Token {
    /// Lifetime as a duration.
    pub fn expires_after(&self) -> Duration {
        Duration::from_secs(self.expires_in)
    }

    /// Granted scopes.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }
}

impl fmt::Debug for OAuth2Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}
