//! Configuration error types.

/// What went wrong while loading settings.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ConfigErrorKind {
    /// A configuration source could not be read
    #[display("Failed to read configuration from {}: {}", origin, message)]
    Read {
        /// File path or source description
        origin: String,
        /// Underlying error text
        message: String,
    },

    /// Sources were read but did not deserialize
    #[display("Failed to parse configuration: {}", _0)]
    Parse(String),

    /// A value is outside its allowed range
    #[display("{}.{} {}", section, field, reason)]
    Invalid {
        /// Table the field belongs to
        section: &'static str,
        /// Field name as written in TOML
        field: &'static str,
        /// What is wrong with the value
        reason: String,
    },
}

/// Configuration error with source location.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Configuration Error: {} at line {} in {}", kind, line, file)]
pub struct ConfigError {
    kind: ConfigErrorKind,
    line: u32,
    file: &'static str,
}

impl ConfigError {
    /// Create a new ConfigError at the current location.
    ///
    /// # Examples
    ///
    /// ```
    /// use parley_error::{ConfigError, ConfigErrorKind};
    ///
    /// let err = ConfigError::new(ConfigErrorKind::Invalid {
    ///     section: "rest",
    ///     field: "max_rate_limit_secs",
    ///     reason: "must not be negative".to_string(),
    /// });
    /// assert!(err.to_string().contains("rest.max_rate_limit_secs"));
    /// ```
    #[track_caller]
    pub fn new(kind: ConfigErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }
}
