//! Route compilation errors.

/// Reasons a route template could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum RouteErrorKind {
    /// A placeholder in the template has no value.
    #[display("Missing value for parameter '{}' in {}", parameter, template)]
    MissingParameter {
        /// Template being compiled
        template: String,
        /// Placeholder without a value
        parameter: String,
    },

    /// A value was supplied for a placeholder the template does not have.
    #[display("Unknown parameter '{}' for {}", parameter, template)]
    UnknownParameter {
        /// Template being compiled
        template: String,
        /// Supplied parameter name
        parameter: String,
    },
}

/// Route error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Route Error: {} at line {} in {}", kind, line, file)]
pub struct RouteError {
    kind: RouteErrorKind,
    line: u32,
    file: &'static str,
}

impl RouteError {
    /// Create a new route error with caller location tracking.
    #[track_caller]
    pub fn new(kind: RouteErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &RouteErrorKind {
        &self.kind
    }
}
