//! Client configuration.
//!
//! Settings are layered from TOML files and the environment:
//! - Bundled defaults (include_str! from parley.toml)
//! - User overrides (~/.config/parley/parley.toml, then ./parley.toml)
//! - `PARLEY_<SECTION>__<FIELD>` variables, e.g. `PARLEY_REST__MAX_RATE_LIMIT_SECS=10`
//!
//! Every field has a default, so any subset may be overridden.

use config::{Config, Environment, File, FileFormat};
use derive_getters::Getters;
use parley_error::{ConfigError, ConfigErrorKind, ParleyError, ParleyResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const ENV_SECTIONS: [&str; 2] = ["PARLEY_REST__", "PARLEY_RATE_LIMIT__"];

/// Seconds as a `Duration`, treating negative or non-finite values as zero.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn default_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_user_agent() -> String {
    format!(
        "ParleyBot (https://github.com/crumplecup/parley, {})",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_max_rate_limit_secs() -> f64 {
    300.0
}

fn default_transport_timeout_secs() -> f64 {
    30.0
}

fn default_credential_retries() -> u32 {
    1
}

fn default_server_error_retries() -> u32 {
    3
}

fn default_transport_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_secs() -> f64 {
    16.0
}

fn default_backoff_jitter() -> bool {
    true
}

fn default_immediate_retry_threshold_ms() -> u64 {
    5
}

fn default_token_safety_margin_secs() -> f64 {
    60.0
}

/// Settings for the request executor.
///
/// # Example
///
/// ```toml
/// [rest]
/// max_rate_limit_secs = 30.0
/// server_error_retries = 5
/// ```
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, Getters, derive_setters::Setters,
)]
#[serde(deny_unknown_fields)]
#[setters(prefix = "with_")]
pub struct RestConfig {
    /// API base URL, without a trailing slash
    #[serde(default = "default_base_url")]
    #[setters(into)]
    base_url: String,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    #[setters(into)]
    user_agent: String,

    /// Total rate-limit wait a single request may accumulate
    #[serde(default = "default_max_rate_limit_secs")]
    max_rate_limit_secs: f64,

    /// Deadline for a whole request including retries
    #[serde(default)]
    request_deadline_secs: Option<f64>,

    /// Timeout of a single transport attempt
    #[serde(default = "default_transport_timeout_secs")]
    transport_timeout_secs: f64,

    /// Retries after a rejected credential
    #[serde(default = "default_credential_retries")]
    credential_retries: u32,

    /// Retries after a transient 5xx
    #[serde(default = "default_server_error_retries")]
    server_error_retries: u32,

    /// Retries after a connection-level failure
    #[serde(default = "default_transport_retries")]
    transport_retries: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    backoff_base_ms: u64,

    /// Upper bound of a single backoff delay
    #[serde(default = "default_backoff_max_secs")]
    backoff_max_secs: f64,

    /// Randomize backoff delays
    #[serde(default = "default_backoff_jitter")]
    backoff_jitter: bool,

    /// Route 429s at or below this are retried without sleeping
    #[serde(default = "default_immediate_retry_threshold_ms")]
    immediate_retry_threshold_ms: u64,

    /// How early expiring credentials are refreshed
    #[serde(default = "default_token_safety_margin_secs")]
    token_safety_margin_secs: f64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            max_rate_limit_secs: default_max_rate_limit_secs(),
            request_deadline_secs: None,
            transport_timeout_secs: default_transport_timeout_secs(),
            credential_retries: default_credential_retries(),
            server_error_retries: default_server_error_retries(),
            transport_retries: default_transport_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_secs: default_backoff_max_secs(),
            backoff_jitter: default_backoff_jitter(),
            immediate_retry_threshold_ms: default_immediate_retry_threshold_ms(),
            token_safety_margin_secs: default_token_safety_margin_secs(),
        }
    }
}

impl RestConfig {
    /// Rate-limit wait budget per request.
    pub fn max_rate_limit(&self) -> Duration {
        secs(self.max_rate_limit_secs)
    }

    /// Whole-request deadline, if configured.
    pub fn request_deadline(&self) -> Option<Duration> {
        self.request_deadline_secs.map(secs)
    }

    /// Per-attempt transport timeout.
    pub fn transport_timeout(&self) -> Duration {
        secs(self.transport_timeout_secs)
    }

    /// First backoff delay.
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Largest single backoff delay.
    pub fn backoff_max(&self) -> Duration {
        secs(self.backoff_max_secs)
    }

    /// Route 429s at or below this are retried without sleeping.
    pub fn immediate_retry_threshold(&self) -> Duration {
        Duration::from_millis(self.immediate_retry_threshold_ms)
    }

    /// How early expiring credentials are refreshed.
    pub fn token_safety_margin(&self) -> Duration {
        secs(self.token_safety_margin_secs)
    }

    /// Check values the duration helpers would otherwise clamp.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::new(ConfigErrorKind::Invalid {
                section: "rest",
                field: "base_url",
                reason: "must not be empty".to_string(),
            }));
        }
        let durations = [
            ("max_rate_limit_secs", Some(self.max_rate_limit_secs)),
            ("request_deadline_secs", self.request_deadline_secs),
            ("transport_timeout_secs", Some(self.transport_timeout_secs)),
            ("backoff_max_secs", Some(self.backoff_max_secs)),
            ("token_safety_margin_secs", Some(self.token_safety_margin_secs)),
        ];
        for (name, value) in durations {
            let Some(value) = value else {
                continue;
            };
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::new(ConfigErrorKind::Invalid {
                    section: "rest",
                    field: name,
                    reason: format!("must be a non-negative number, got {}", value),
                }));
            }
        }
        Ok(())
    }
}

fn default_bucket_ttl_secs() -> u64 {
    600
}

fn default_bucket_gc_interval_secs() -> u64 {
    20
}

fn default_global_requests_per_second() -> u32 {
    50
}

/// Settings for bucket tracking and the global throttle.
///
/// # Example
///
/// ```toml
/// [rate_limit]
/// bucket_ttl_secs = 300
/// global_requests_per_second = 0  # disable the proactive cap
/// ```
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_setters::Setters,
)]
#[serde(deny_unknown_fields)]
#[setters(prefix = "with_")]
pub struct RateLimitConfig {
    /// Idle time after which an expired bucket is evicted
    #[serde(default = "default_bucket_ttl_secs")]
    bucket_ttl_secs: u64,

    /// How often the eviction sweep runs
    #[serde(default = "default_bucket_gc_interval_secs")]
    bucket_gc_interval_secs: u64,

    /// Proactive cap on authenticated requests per second, 0 disables
    #[serde(default = "default_global_requests_per_second")]
    global_requests_per_second: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            bucket_ttl_secs: default_bucket_ttl_secs(),
            bucket_gc_interval_secs: default_bucket_gc_interval_secs(),
            global_requests_per_second: default_global_requests_per_second(),
        }
    }
}

impl RateLimitConfig {
    /// Bucket eviction TTL.
    pub fn bucket_ttl(&self) -> Duration {
        Duration::from_secs(self.bucket_ttl_secs)
    }

    /// Eviction sweep interval, at least one second.
    pub fn bucket_gc_interval(&self) -> Duration {
        Duration::from_secs(self.bucket_gc_interval_secs.max(1))
    }
}

/// Top-level Parley configuration.
///
/// Loads from TOML files with a precedence system:
/// 1. Bundled defaults (include_str! from parley.toml)
/// 2. User config in home directory (~/.config/parley/parley.toml)
/// 3. User config in current directory (./parley.toml)
/// 4. `PARLEY_*` environment variables
///
/// # Example
///
/// ```no_run
/// use parley_rate_limit::ParleyConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ParleyConfig::load()?;
/// println!("Rate limit budget: {:?}", config.rest().max_rate_limit());
/// # Ok(())
/// # }
/// ```
#[derive(
    Debug, Clone, PartialEq, Default, Serialize, Deserialize, Getters, derive_setters::Setters,
)]
#[serde(deny_unknown_fields)]
#[setters(prefix = "with_")]
pub struct ParleyConfig {
    /// Request executor settings
    #[serde(default)]
    rest: RestConfig,

    /// Bucket tracking and global throttle settings
    #[serde(default)]
    rate_limit: RateLimitConfig,
}

impl ParleyConfig {
    /// Load configuration from a specific file path.
    ///
    /// Fields missing from the file take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ParleyResult<Self> {
        debug!("Loading configuration from file");

        let config: Self = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                ParleyError::from(ConfigError::new(ConfigErrorKind::Read {
                    origin: path.as_ref().display().to_string(),
                    message: e.to_string(),
                }))
            })?
            .try_deserialize()
            .map_err(|e| {
                ParleyError::from(ConfigError::new(ConfigErrorKind::Parse(e.to_string())))
            })?;

        config.rest.validate()?;
        Ok(config)
    }

    /// Load configuration with precedence: environment > current dir > home dir > bundled defaults.
    ///
    /// User config files are optional and silently skipped when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be parsed or a value is invalid.
    #[instrument]
    pub fn load() -> ParleyResult<Self> {
        Self::load_with_vars(std::env::vars())
    }

    /// Like [`load`](Self::load), reading overrides from `vars` instead of
    /// the process environment.
    ///
    /// Only `PARLEY_REST__*` and `PARLEY_RATE_LIMIT__*` names are used;
    /// other `PARLEY_` variables such as tokens are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be parsed or a value is invalid.
    #[instrument(skip(vars))]
    pub fn load_with_vars<I>(vars: I) -> ParleyResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let overrides: config::Map<String, String> = vars
            .into_iter()
            .filter(|(name, _)| {
                ENV_SECTIONS
                    .iter()
                    .any(|section| name.starts_with(section))
            })
            .collect();

        debug!("Loading configuration with precedence: environment > current dir > home dir > bundled defaults");

        const DEFAULT_CONFIG: &str = include_str!("../../../parley.toml");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/parley/parley.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("parley").required(false));

        builder = builder.add_source(
            Environment::with_prefix("PARLEY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(overrides)),
        );

        let config: Self = builder
            .build()
            .map_err(|e| {
                ParleyError::from(ConfigError::new(ConfigErrorKind::Read {
                    origin: "layered sources".to_string(),
                    message: e.to_string(),
                }))
            })?
            .try_deserialize()
            .map_err(|e| {
                ParleyError::from(ConfigError::new(ConfigErrorKind::Parse(e.to_string())))
            })?;

        config.rest.validate()?;
        Ok(config)
    }
}
