//! Authorization credentials.
//!
//! A [`TokenStrategy`] produces the `Authorization` header value for each
//! attempt. Static tokens never change. Expiring tokens are cached in a
//! [`CredentialCache`], which guarantees that concurrent callers share a
//! single refresh.

use async_trait::async_trait;
use base64::Engine as _;
use parking_lot::Mutex;
use parley_core::OAuth2Token;
use parley_error::RestError;
use parley_rate_limit::RestConfig;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Scopes requested by [`ClientCredentialsStrategy`] unless overridden.
pub const DEFAULT_CLIENT_CREDENTIALS_SCOPES: [&str; 2] = ["applications.commands.update", "identify"];

/// Authorization scheme prefix.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
pub enum TokenType {
    /// Bot token
    Bot,
    /// OAuth2 bearer token
    Bearer,
    /// HTTP basic credentials
    Basic,
}

/// Exchanges application credentials for a bearer token.
///
/// Implemented by the executor so the exchange is itself a rate-limited
/// request.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Perform an OAuth2 client credentials grant.
    async fn issue_client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
        scopes: &[String],
    ) -> Result<OAuth2Token, RestError>;
}

/// Source of `Authorization` header values.
#[async_trait]
pub trait TokenStrategy: Send + Sync + fmt::Debug {
    /// Scheme of the produced header values.
    fn token_type(&self) -> TokenType;

    /// Full header value, e.g. `Bot abc` or `Bearer xyz`.
    async fn acquire(&self, issuer: &dyn TokenIssuer) -> Result<String, RestError>;

    /// Mark a header value as rejected by the server.
    ///
    /// Only takes effect if `token` is still the current value; `None`
    /// discards whatever is cached.
    fn invalidate(&self, token: Option<&str>);

    /// Whether [`acquire`](Self::acquire) can produce a different value after
    /// [`invalidate`](Self::invalidate).
    fn is_refreshable(&self) -> bool;
}

/// A token that never changes.
///
/// # Example
///
/// ```
/// use parley_rest::{StaticToken, TokenStrategy, TokenType};
///
/// let token = StaticToken::bot("abc");
/// assert_eq!(token.token_type(), TokenType::Bot);
/// assert!(!format!("{:?}", token).contains("abc"));
/// ```
#[derive(Clone)]
pub struct StaticToken {
    token_type: TokenType,
    header: String,
}

impl StaticToken {
    /// Token with an explicit scheme.
    pub fn new(token_type: TokenType, token: impl AsRef<str>) -> Self {
        Self {
            token_type,
            header: format!("{} {}", token_type, token.as_ref()),
        }
    }

    /// `Bot <token>`.
    pub fn bot(token: impl AsRef<str>) -> Self {
        Self::new(TokenType::Bot, token)
    }

    /// `Bearer <token>`.
    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self::new(TokenType::Bearer, token)
    }

    /// `Basic base64(<client_id>:<client_secret>)`.
    pub fn basic(client_id: &str, client_secret: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", client_id, client_secret));
        Self::new(TokenType::Basic, encoded)
    }

    /// Full header value.
    pub fn header(&self) -> &str {
        &self.header
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticToken")
            .field("token_type", &self.token_type)
            .field("header", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl TokenStrategy for StaticToken {
    fn token_type(&self) -> TokenType {
        self.token_type
    }

    async fn acquire(&self, _issuer: &dyn TokenIssuer) -> Result<String, RestError> {
        Ok(self.header.clone())
    }

    fn invalidate(&self, _token: Option<&str>) {}

    fn is_refreshable(&self) -> bool {
        false
    }
}

/// Observable state of a [`CredentialCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CredentialState {
    /// Nothing cached.
    Idle,
    /// A refresh is running.
    Refreshing,
    /// A usable credential is cached.
    Fresh,
    /// The cached credential is inside its safety margin.
    Stale,
}

struct Credential {
    value: String,
    refresh_at: Instant,
}

#[derive(Default)]
struct CacheState {
    credential: Option<Credential>,
    generation: u64,
    last_error: Option<RestError>,
}

impl CacheState {
    fn fresh(&self, now: Instant) -> Option<String> {
        self.credential
            .as_ref()
            .filter(|credential| now < credential.refresh_at)
            .map(|credential| credential.value.clone())
    }
}

/// Cache for an expiring credential with single-flight refresh.
///
/// A fresh credential is returned without suspending. Otherwise one caller
/// runs the refresh while the others wait for its result. A failed refresh
/// is returned to every caller that waited on it, and the next call starts
/// a new refresh.
pub struct CredentialCache {
    state: Mutex<CacheState>,
    refresh_lock: AsyncMutex<()>,
    safety_margin: Duration,
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("state", &self.state())
            .field("safety_margin", &self.safety_margin)
            .finish()
    }
}

impl CredentialCache {
    /// Cache refreshing credentials `safety_margin` before they expire.
    pub fn new(safety_margin: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            refresh_lock: AsyncMutex::new(()),
            safety_margin,
        }
    }

    /// Current state.
    pub fn state(&self) -> CredentialState {
        if self.refresh_lock.try_lock().is_err() {
            return CredentialState::Refreshing;
        }
        let state = self.state.lock();
        match &state.credential {
            None => CredentialState::Idle,
            Some(credential) if Instant::now() < credential.refresh_at => CredentialState::Fresh,
            Some(_) => CredentialState::Stale,
        }
    }

    /// Return the cached credential or run `refresh` to obtain a new one.
    ///
    /// `refresh` yields the credential and its lifetime. It runs at most
    /// once across all concurrent callers.
    ///
    /// # Errors
    ///
    /// Returns the refresh error, shared by every caller that waited on it.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<String, RestError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, Duration), RestError>>,
    {
        let observed = {
            let state = self.state.lock();
            if let Some(value) = state.fresh(Instant::now()) {
                return Ok(value);
            }
            state.generation
        };

        let _refreshing = self.refresh_lock.lock().await;

        {
            let state = self.state.lock();
            if state.generation != observed {
                if let Some(value) = state.fresh(Instant::now()) {
                    debug!("Using credential refreshed by another task");
                    return Ok(value);
                }
                if let Some(error) = &state.last_error {
                    debug!("Sharing failed refresh with waiting task");
                    return Err(error.clone());
                }
            }
        }

        debug!("Refreshing credential");
        let result = refresh().await;

        let mut state = self.state.lock();
        state.generation += 1;
        match result {
            Ok((value, lifetime)) => {
                let margin = self.safety_margin.min(lifetime / 2);
                state.credential = Some(Credential {
                    value: value.clone(),
                    refresh_at: Instant::now() + lifetime.saturating_sub(margin),
                });
                state.last_error = None;
                Ok(value)
            }
            Err(error) => {
                warn!(error = %error, "Credential refresh failed");
                state.credential = None;
                state.last_error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Discard the cached credential if it equals `value`, or unconditionally for `None`.
    pub fn invalidate(&self, value: Option<&str>) {
        let mut state = self.state.lock();
        let matches = match (&state.credential, value) {
            (Some(credential), Some(value)) => credential.value == value,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if matches {
            debug!("Invalidating cached credential");
            state.credential = None;
        }
    }
}

/// OAuth2 client credentials grant, refreshed before expiry.
///
/// # Example
///
/// ```
/// use parley_rest::{ClientCredentialsStrategy, TokenStrategy, TokenType};
///
/// let strategy = ClientCredentialsStrategy::new("client-id", "client-secret");
/// assert_eq!(strategy.token_type(), TokenType::Bearer);
/// assert!(strategy.is_refreshable());
/// ```
pub struct ClientCredentialsStrategy {
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    cache: CredentialCache,
}

impl fmt::Debug for ClientCredentialsStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentialsStrategy")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("cache", &self.cache)
            .finish()
    }
}

impl ClientCredentialsStrategy {
    /// Strategy with the default scopes and a 60 second safety margin.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: DEFAULT_CLIENT_CREDENTIALS_SCOPES
                .iter()
                .map(|scope| scope.to_string())
                .collect(),
            cache: CredentialCache::new(Duration::from_secs(60)),
        }
    }

    /// Strategy using the configured safety margin.
    pub fn from_config(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        config: &RestConfig,
    ) -> Self {
        Self::new(client_id, client_secret).with_safety_margin(config.token_safety_margin())
    }

    /// Request these scopes instead of the defaults.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Refresh this long before expiry.
    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.cache = CredentialCache::new(margin);
        self
    }

    /// Requested scopes.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Current cache state.
    pub fn state(&self) -> CredentialState {
        self.cache.state()
    }
}

#[async_trait]
impl TokenStrategy for ClientCredentialsStrategy {
    fn token_type(&self) -> TokenType {
        TokenType::Bearer
    }

    #[instrument(skip(self, issuer), fields(client_id = %self.client_id))]
    async fn acquire(&self, issuer: &dyn TokenIssuer) -> Result<String, RestError> {
        self.cache
            .get_or_refresh(|| async move {
                let token = issuer
                    .issue_client_credentials(&self.client_id, &self.client_secret, &self.scopes)
                    .await?;
                debug!(expires_in = token.expires_in(), "Issued client credentials token");
                Ok((
                    format!("{} {}", TokenType::Bearer, token.access_token()),
                    token.expires_after(),
                ))
            })
            .await
    }

    fn invalidate(&self, token: Option<&str>) {
        self.cache.invalidate(token);
    }

    fn is_refreshable(&self) -> bool {
        true
    }
}
