//! Top-level error wrapper types.

use crate::{BrokerError, BuilderError, ConfigError, JsonError, ThrottleError};

/// Every error a Switchboard operation can return to its caller.
///
/// # Examples
///
/// ```
/// use switchboard_error::{ConfigError, ConfigErrorKind, SwitchboardError};
///
/// let err: SwitchboardError =
///     ConfigError::new(ConfigErrorKind::Malformed("bad window".to_string())).into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum SwitchboardErrorKind {
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// Builder / validation error
    #[from(BuilderError)]
    Builder(BuilderError),
    /// Throttle gate error
    #[from(ThrottleError)]
    Throttle(ThrottleError),
    /// Broker construction or update error
    #[from(BrokerError)]
    Broker(BrokerError),
    /// Report serialization error
    #[from(JsonError)]
    Json(JsonError),
}

/// Switchboard error with kind discrimination.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Switchboard Error: {}", _0)]
pub struct SwitchboardError(Box<SwitchboardErrorKind>);

impl SwitchboardError {
    /// Create a new error from a kind.
    pub fn new(kind: SwitchboardErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &SwitchboardErrorKind {
        &self.0
    }
}

impl<T> From<T> for SwitchboardError
where
    T: Into<SwitchboardErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Switchboard operations.
pub type SwitchboardResult<T> = std::result::Result<T, SwitchboardError>;
