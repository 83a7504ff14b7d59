//! Top-level error wrapper types.

use crate::{BuilderError, ConfigError, RestError, RouteError};

/// Every error a Parley crate can produce.
///
/// # Examples
///
/// ```
/// use parley_error::{ConfigError, ConfigErrorKind, ParleyError};
///
/// let err: ParleyError = ConfigError::new(ConfigErrorKind::Parse("bad base_url".into())).into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum ParleyErrorKind {
    /// REST pipeline error
    #[from(RestError)]
    Rest(RestError),
    /// Route compilation error
    #[from(RouteError)]
    Route(RouteError),
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// Builder error
    #[from(BuilderError)]
    Builder(BuilderError),
}

/// Parley error with kind discrimination.
///
/// # Examples
///
/// ```
/// use parley_error::{BuilderError, BuilderErrorKind, ParleyResult};
///
/// fn might_fail() -> ParleyResult<()> {
///     Err(BuilderError::new(BuilderErrorKind::MissingField("route".into())))?
/// }
///
/// assert!(might_fail().is_err());
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Parley Error: {}", _0)]
pub struct ParleyError(Box<ParleyErrorKind>);

impl ParleyError {
    /// Create a new error from a kind.
    pub fn new(kind: ParleyErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &ParleyErrorKind {
        &self.0
    }

    /// The REST error, if this is one.
    pub fn as_rest(&self) -> Option<&RestError> {
        match self.kind() {
            ParleyErrorKind::Rest(err) => Some(err),
            _ => None,
        }
    }
}

// Generic From implementation for any type that converts to ParleyErrorKind
impl<T> From<T> for ParleyError
where
    T: Into<ParleyErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Parley operations.
pub type ParleyResult<T> = std::result::Result<T, ParleyError>;
