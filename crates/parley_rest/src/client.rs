//! Typed endpoint methods over the request executor.

use crate::executor::url_encode;
use crate::{
    ClientCredentialsStrategy, ReqwestTransport, RestExecutor, RestRequest, StaticToken,
    TokenIssuer, TokenStrategy, Transport,
};
use parley_core::{CompiledRoute, GatewayBot, OAuth2Token, Route, Snowflake, routes};
use parley_error::{ParleyResult, RestError, RestErrorKind};
use parley_rate_limit::{ParleyConfig, RateLimitConfig, RestConfig};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Maximum messages returned by one history request.
const MAX_MESSAGES_PER_PAGE: u8 = 100;

enum Credentials {
    Strategy(Arc<dyn TokenStrategy>),
    ClientCredentials { id: String, secret: String },
}

/// Builder for [`RestClient`].
#[derive(Default)]
pub struct RestClientBuilder {
    rest: Option<RestConfig>,
    rate_limit: Option<RateLimitConfig>,
    credentials: Option<Credentials>,
    transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for RestClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClientBuilder")
            .field("rest", &self.rest)
            .field("rate_limit", &self.rate_limit)
            .field("has_credentials", &self.credentials.is_some())
            .field("has_transport", &self.transport.is_some())
            .finish()
    }
}

impl RestClientBuilder {
    /// Use both sections of a loaded configuration.
    pub fn config(mut self, config: ParleyConfig) -> Self {
        self.rest = Some(config.rest().clone());
        self.rate_limit = Some(config.rate_limit().clone());
        self
    }

    /// Set REST settings.
    pub fn rest_config(mut self, config: RestConfig) -> Self {
        self.rest = Some(config);
        self
    }

    /// Set rate limit settings.
    pub fn rate_limit_config(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Authenticate with a token strategy.
    pub fn token(mut self, strategy: Arc<dyn TokenStrategy>) -> Self {
        self.credentials = Some(Credentials::Strategy(strategy));
        self
    }

    /// Authenticate as a bot.
    pub fn bot_token(self, token: impl AsRef<str>) -> Self {
        self.token(Arc::new(StaticToken::bot(token)))
    }

    /// Authenticate with a pre-issued OAuth2 bearer token.
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.token(Arc::new(StaticToken::bearer(token)))
    }

    /// Authenticate with the OAuth2 client credentials grant.
    ///
    /// The token is fetched on first use and refreshed before it expires.
    pub fn client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials::ClientCredentials {
            id: client_id.into(),
            secret: client_secret.into(),
        });
        self
    }

    /// Replace the HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    ///
    /// Missing configuration falls back to defaults. Must be called inside
    /// a Tokio runtime for the bucket sweeper to start.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn build(self) -> ParleyResult<RestClient> {
        let rest = self.rest.unwrap_or_default();
        rest.validate()?;
        let rate_limit = self.rate_limit.unwrap_or_default();

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(rest.transport_timeout())?),
        };

        let token: Option<Arc<dyn TokenStrategy>> = match self.credentials {
            Some(Credentials::Strategy(strategy)) => Some(strategy),
            Some(Credentials::ClientCredentials { id, secret }) => Some(Arc::new(
                ClientCredentialsStrategy::from_config(id, secret, &rest),
            )),
            None => None,
        };

        Ok(RestClient {
            executor: Arc::new(RestExecutor::new(rest, &rate_limit, transport, token)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PruneResult {
    pruned: Option<u64>,
}

/// REST client for the chat platform.
///
/// Cheap to clone; clones share buckets, the global throttle and the
/// credential cache.
///
/// # Example
///
/// ```no_run
/// use parley_rest::RestClient;
/// use serde_json::json;
///
/// # async fn example() -> parley_error::ParleyResult<()> {
/// let client = RestClient::builder().bot_token("token").build()?;
/// client
///     .create_message(123u64, json!({"content": "hello"}))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RestClient {
    executor: Arc<RestExecutor>,
}

fn id(value: impl Into<Snowflake>) -> Snowflake {
    value.into()
}

fn compile(route: Route, params: &[(&str, &dyn fmt::Display)]) -> ParleyResult<CompiledRoute> {
    Ok(route.compile(params)?)
}

fn expect_body(route: &CompiledRoute, payload: Option<JsonValue>) -> ParleyResult<JsonValue> {
    payload.ok_or_else(|| {
        RestError::new(RestErrorKind::Decode {
            route: route.to_string(),
            message: "expected a JSON body, got none".to_string(),
        })
        .into()
    })
}

fn decode<T: DeserializeOwned>(route: &CompiledRoute, payload: JsonValue) -> ParleyResult<T> {
    serde_json::from_value(payload).map_err(|e| {
        RestError::new(RestErrorKind::Decode {
            route: route.to_string(),
            message: e.to_string(),
        })
        .into()
    })
}

impl RestClient {
    /// Start building a client.
    pub fn builder() -> RestClientBuilder {
        RestClientBuilder::default()
    }

    /// Wrap an existing executor.
    pub fn from_executor(executor: Arc<RestExecutor>) -> Self {
        Self { executor }
    }

    /// Underlying executor.
    pub fn executor(&self) -> &RestExecutor {
        &self.executor
    }

    /// Stop background work.
    pub fn close(&self) {
        self.executor.close();
    }

    /// Execute an arbitrary request.
    pub async fn execute(&self, request: RestRequest) -> ParleyResult<Option<JsonValue>> {
        Ok(self.executor.execute(request).await?)
    }

    async fn fetch(&self, request: RestRequest) -> ParleyResult<JsonValue> {
        let route = request.route().clone();
        let payload = self.executor.execute(request).await?;
        expect_body(&route, payload)
    }

    async fn send(&self, request: RestRequest) -> ParleyResult<()> {
        self.executor.execute(request).await?;
        Ok(())
    }

    fn with_reason(route: CompiledRoute, reason: Option<&str>) -> ParleyResult<RestRequest> {
        let mut builder = RestRequest::builder();
        builder.route(route);
        if let Some(reason) = reason {
            builder.reason(reason);
        }
        Ok(builder.build()?)
    }

    // Channels

    /// Fetch a channel.
    #[instrument(skip(self, channel))]
    pub async fn fetch_channel(&self, channel: impl Into<Snowflake>) -> ParleyResult<JsonValue> {
        let route = compile(routes::GET_CHANNEL, &[("channel", &id(channel))])?;
        self.fetch(RestRequest::new(route)).await
    }

    /// Delete a channel, or close a DM. Returns the deleted channel.
    #[instrument(skip(self, channel, reason))]
    pub async fn delete_channel(
        &self,
        channel: impl Into<Snowflake>,
        reason: Option<&str>,
    ) -> ParleyResult<JsonValue> {
        let route = compile(routes::DELETE_CHANNEL, &[("channel", &id(channel))])?;
        self.fetch(Self::with_reason(route, reason)?).await
    }

    /// Show the typing indicator in a channel.
    #[instrument(skip(self, channel))]
    pub async fn trigger_typing(&self, channel: impl Into<Snowflake>) -> ParleyResult<()> {
        let route = compile(routes::POST_CHANNEL_TYPING, &[("channel", &id(channel))])?;
        self.send(RestRequest::new(route)).await
    }

    // Messages

    /// Fetch one message.
    #[instrument(skip(self, channel, message))]
    pub async fn fetch_message(
        &self,
        channel: impl Into<Snowflake>,
        message: impl Into<Snowflake>,
    ) -> ParleyResult<JsonValue> {
        let route = compile(
            routes::GET_CHANNEL_MESSAGE,
            &[("channel", &id(channel)), ("message", &id(message))],
        )?;
        self.fetch(RestRequest::new(route)).await
    }

    /// Fetch the most recent messages in a channel, newest first.
    ///
    /// `limit` is clamped to 1..=100; `None` uses the platform default.
    #[instrument(skip(self, channel))]
    pub async fn fetch_messages(
        &self,
        channel: impl Into<Snowflake>,
        limit: Option<u8>,
    ) -> ParleyResult<Vec<JsonValue>> {
        let route = compile(routes::GET_CHANNEL_MESSAGES, &[("channel", &id(channel))])?;
        let mut builder = RestRequest::builder();
        builder.route(route.clone());
        if let Some(limit) = limit {
            builder.query_param("limit", limit.clamp(1, MAX_MESSAGES_PER_PAGE));
        }
        let payload = self.fetch(builder.build()?).await?;
        decode(&route, payload)
    }

    /// Post a message. `message` is the message create payload.
    #[instrument(skip(self, channel, message))]
    pub async fn create_message(
        &self,
        channel: impl Into<Snowflake>,
        message: JsonValue,
    ) -> ParleyResult<JsonValue> {
        let route = compile(routes::POST_CHANNEL_MESSAGES, &[("channel", &id(channel))])?;
        let request = RestRequest::builder().route(route).json(message).build()?;
        self.fetch(request).await
    }

    /// Edit a message. Only the fields present in `changes` are updated.
    #[instrument(skip(self, channel, message, changes))]
    pub async fn edit_message(
        &self,
        channel: impl Into<Snowflake>,
        message: impl Into<Snowflake>,
        changes: JsonValue,
    ) -> ParleyResult<JsonValue> {
        let route = compile(
            routes::PATCH_CHANNEL_MESSAGE,
            &[("channel", &id(channel)), ("message", &id(message))],
        )?;
        let request = RestRequest::builder().route(route).json(changes).build()?;
        self.fetch(request).await
    }

    /// Delete a message.
    #[instrument(skip(self, channel, message, reason))]
    pub async fn delete_message(
        &self,
        channel: impl Into<Snowflake>,
        message: impl Into<Snowflake>,
        reason: Option<&str>,
    ) -> ParleyResult<()> {
        let route = compile(
            routes::DELETE_CHANNEL_MESSAGE,
            &[("channel", &id(channel)), ("message", &id(message))],
        )?;
        self.send(Self::with_reason(route, reason)?).await
    }

    /// React to a message as the current user.
    ///
    /// `emoji` is a unicode emoji or `name:id` for custom emoji.
    #[instrument(skip(self, channel, message))]
    pub async fn add_reaction(
        &self,
        channel: impl Into<Snowflake>,
        message: impl Into<Snowflake>,
        emoji: &str,
    ) -> ParleyResult<()> {
        let emoji = url_encode(emoji);
        let route = compile(
            routes::PUT_MY_REACTION,
            &[
                ("channel", &id(channel)),
                ("message", &id(message)),
                ("emoji", &emoji),
            ],
        )?;
        self.send(RestRequest::new(route)).await
    }

    // Guilds

    /// Fetch a guild, optionally with approximate member counts.
    #[instrument(skip(self, guild))]
    pub async fn fetch_guild(
        &self,
        guild: impl Into<Snowflake>,
        with_counts: bool,
    ) -> ParleyResult<JsonValue> {
        let route = compile(routes::GET_GUILD, &[("guild", &id(guild))])?;
        let request = RestRequest::builder()
            .route(route)
            .query_param("with_counts", with_counts)
            .build()?;
        self.fetch(request).await
    }

    /// Start a prune of members inactive for `days`.
    ///
    /// Returns the number pruned when `compute_prune_count` is set.
    #[instrument(skip(self, guild, reason))]
    pub async fn begin_guild_prune(
        &self,
        guild: impl Into<Snowflake>,
        days: u32,
        compute_prune_count: bool,
        reason: Option<&str>,
    ) -> ParleyResult<Option<u64>> {
        let route = compile(routes::POST_GUILD_PRUNE, &[("guild", &id(guild))])?;
        let mut builder = RestRequest::builder();
        builder
            .route(route.clone())
            .query_param("days", days)
            .query_param("compute_prune_count", compute_prune_count);
        if let Some(reason) = reason {
            builder.reason(reason);
        }
        let payload = self.fetch(builder.build()?).await?;
        let result: PruneResult = decode(&route, payload)?;
        debug!(pruned = ?result.pruned, "Guild prune started");
        Ok(result.pruned)
    }

    /// Fetch a guild member.
    #[instrument(skip(self, guild, user))]
    pub async fn fetch_member(
        &self,
        guild: impl Into<Snowflake>,
        user: impl Into<Snowflake>,
    ) -> ParleyResult<JsonValue> {
        let route = compile(
            routes::GET_GUILD_MEMBER,
            &[("guild", &id(guild)), ("user", &id(user))],
        )?;
        self.fetch(RestRequest::new(route)).await
    }

    /// Remove a member from a guild.
    #[instrument(skip(self, guild, user, reason))]
    pub async fn kick_member(
        &self,
        guild: impl Into<Snowflake>,
        user: impl Into<Snowflake>,
        reason: Option<&str>,
    ) -> ParleyResult<()> {
        let route = compile(
            routes::DELETE_GUILD_MEMBER,
            &[("guild", &id(guild)), ("user", &id(user))],
        )?;
        self.send(Self::with_reason(route, reason)?).await
    }

    // Webhooks

    /// Fetch a webhook.
    #[instrument(skip(self, webhook))]
    pub async fn fetch_webhook(&self, webhook: impl Into<Snowflake>) -> ParleyResult<JsonValue> {
        let route = compile(routes::GET_WEBHOOK, &[("webhook", &id(webhook))])?;
        self.fetch(RestRequest::new(route)).await
    }

    /// Execute a webhook with its token.
    ///
    /// Sent without credentials and outside the global throttle. When `wait`
    /// is set the created message is returned.
    #[instrument(skip(self, webhook, token, payload))]
    pub async fn execute_webhook(
        &self,
        webhook: impl Into<Snowflake>,
        token: &str,
        payload: JsonValue,
        wait: bool,
    ) -> ParleyResult<Option<JsonValue>> {
        let route = compile(
            routes::POST_WEBHOOK_WITH_TOKEN,
            &[("webhook", &id(webhook)), ("token", &token)],
        )?;
        let request = RestRequest::builder()
            .route(route)
            .json(payload)
            .query_param("wait", wait)
            .no_auth(true)
            .build()?;
        Ok(self.executor.execute(request).await?)
    }

    // Gateway, users, OAuth2

    /// Fetch the gateway URL, recommended shard count and session limits.
    #[instrument(skip(self))]
    pub async fn fetch_gateway_bot(&self) -> ParleyResult<GatewayBot> {
        let route = compile(routes::GET_GATEWAY_BOT, &[])?;
        let payload = self.fetch(RestRequest::new(route.clone())).await?;
        decode(&route, payload)
    }

    /// Fetch the current user.
    #[instrument(skip(self))]
    pub async fn fetch_my_user(&self) -> ParleyResult<JsonValue> {
        let route = compile(routes::GET_MY_USER, &[])?;
        self.fetch(RestRequest::new(route)).await
    }

    /// Exchange application credentials for a bearer token.
    #[instrument(skip(self, client_secret, scopes))]
    pub async fn authorize_client_credentials_token(
        &self,
        client_id: &str,
        client_secret: &str,
        scopes: &[String],
    ) -> ParleyResult<OAuth2Token> {
        Ok(self
            .executor
            .issue_client_credentials(client_id, client_secret, scopes)
            .await?)
    }
}
