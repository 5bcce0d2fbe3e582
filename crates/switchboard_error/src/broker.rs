//! Broker construction errors.

/// Specific broker construction error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum BrokerErrorKind {
    /// No backends were supplied.
    #[display("Broker requires at least one backend")]
    EmptyBackendTable,

    /// Two backends share an identifier.
    #[display("Duplicate backend id: {}", _0)]
    DuplicateBackend(String),

    /// Every registered factory reported itself unusable.
    #[display("No usable backend among: {}", _0)]
    NoUsableBackend(String),

    /// A backend factory failed to produce its client.
    #[display("Backend '{}' could not be created: {}", backend, reason)]
    FactoryFailed {
        /// Backend identifier
        backend: String,
        /// Factory-supplied reason
        reason: String,
    },

    /// A live update referenced a backend the broker does not own.
    #[display("Unknown backend: {}", _0)]
    UnknownBackend(String),
}

/// Broker error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Broker Error: {} at line {} in {}", kind, line, file)]
pub struct BrokerError {
    /// The specific error kind
    pub kind: BrokerErrorKind,
    /// Line number where error occurred
    pub line: u32,
    /// File where error occurred
    pub file: &'static str,
}

impl BrokerError {
    /// Create a new broker error with location tracking.
    #[track_caller]
    pub fn new(kind: BrokerErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &BrokerErrorKind {
        &self.kind
    }
}
