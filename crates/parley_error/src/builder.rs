//! Errors from assembling requests and clients.

/// Why a builder refused to produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum BuilderErrorKind {
    /// A required field was never set
    #[display("Missing required field: {}", _0)]
    MissingField(String),

    /// A request was given both a JSON and a form body
    #[display("A request cannot carry both a JSON and a form body")]
    ConflictingBodies,

    /// A field was set to a value the builder rejects
    #[display("Invalid value for '{}': {}", field, reason)]
    InvalidField {
        /// The field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Builder error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Builder Error: {} at line {} in {}", kind, line, file)]
pub struct BuilderError {
    kind: BuilderErrorKind,
    line: u32,
    file: &'static str,
}

impl BuilderError {
    /// Create a new builder error with caller location tracking.
    #[track_caller]
    pub fn new(kind: BuilderErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &BuilderErrorKind {
        &self.kind
    }
}
