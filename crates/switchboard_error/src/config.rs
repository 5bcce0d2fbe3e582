//! Configuration errors.

/// What went wrong while loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ConfigErrorKind {
    /// A configuration source exists but could not be read or merged.
    #[display("Cannot read {}: {}", source_name, reason)]
    Unreadable {
        /// File or source name
        source_name: String,
        /// Underlying reason
        reason: String,
    },

    /// Sources merged but did not deserialize.
    #[display("Malformed configuration: {}", _0)]
    Malformed(String),

    /// A backend table carries limits that do not form a descriptor.
    #[display("Invalid limits for backend '{}': {}", backend, reason)]
    InvalidBackend {
        /// Backend id
        backend: String,
        /// Why the limits were rejected
        reason: String,
    },

    /// A broker-wide setting is out of range.
    #[display("Invalid setting '{}': {}", key, reason)]
    InvalidSetting {
        /// Dotted key, e.g. `broker.max_outstanding`
        key: String,
        /// Why the value was rejected
        reason: String,
    },
}

/// Configuration error with source location.
///
/// # Examples
///
/// ```
/// use switchboard_error::{ConfigError, ConfigErrorKind};
///
/// let err = ConfigError::new(ConfigErrorKind::InvalidBackend {
///     backend: "gemini".to_string(),
///     reason: "window must be positive".to_string(),
/// });
/// assert!(err.to_string().contains("backend 'gemini'"));
/// assert!(matches!(err.kind(), ConfigErrorKind::InvalidBackend { .. }));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Configuration Error: {} at line {} in {}", kind, line, file)]
pub struct ConfigError {
    kind: ConfigErrorKind,
    line: u32,
    file: &'static str,
}

impl ConfigError {
    /// Create a configuration error, recording the caller's location.
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
