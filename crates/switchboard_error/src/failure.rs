//! Backend failure taxonomy.
//!
//! A `BackendFailure` is what a unit of work returns when its call fails. The
//! dispatcher never propagates it; it is turned into a [`ClassifiedFailure`]
//! by [`classify`](crate::classify) and recorded as a `rejected` report entry.

use crate::{ThrottleError, ThrottleErrorKind};
use serde::{Deserialize, Serialize};

/// The actionable category of a backend failure.
///
/// Declaration order is the classifier's rule order: the first matching kind
/// wins.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// Missing, invalid or unauthorized credentials.
    Auth,
    /// Rate limit or spending quota exhausted.
    Quota,
    /// Unknown, retired or inaccessible model.
    Model,
    /// Connection, DNS or upstream availability problem.
    Network,
    /// Deadline exceeded, locally or upstream.
    Timeout,
    /// Payload larger than the backend accepts.
    ContextSize,
    /// Nothing else matched.
    Unknown,
}

impl FailureKind {
    /// Check if retrying the same call later may succeed.
    ///
    /// Quota exhaustion, network trouble and timeouts are transient. Bad
    /// credentials, bad model names and oversized payloads will fail the same
    /// way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::Quota | FailureKind::Network | FailureKind::Timeout
        )
    }
}

/// A raw failure reported by one backend call.
///
/// Adapters that know what went wrong attach a structured `kind`; everything
/// else is classified from the message text.
///
/// # Examples
///
/// ```
/// use switchboard_error::{BackendFailure, FailureKind};
///
/// let raw = BackendFailure::new("HTTP 429: Too Many Requests");
/// assert!(raw.kind().is_none());
///
/// let tagged = BackendFailure::tagged(FailureKind::Auth, "key revoked");
/// assert_eq!(tagged.kind(), Some(FailureKind::Auth));
/// ```
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_more::Display, derive_more::Error,
)]
#[display("{}", message)]
pub struct BackendFailure {
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<FailureKind>,
}

impl BackendFailure {
    /// Create an untagged failure from its message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    /// Create a failure with a structured kind supplied by the adapter.
    pub fn tagged(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: Some(kind),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The structured kind, if the adapter supplied one.
    pub fn kind(&self) -> Option<FailureKind> {
        self.kind
    }
}

impl From<String> for BackendFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for BackendFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<ThrottleError> for BackendFailure {
    fn from(err: ThrottleError) -> Self {
        let message = err.kind.to_string();
        match err.kind {
            ThrottleErrorKind::QueueTimeout { .. } | ThrottleErrorKind::ExecutionTimeout { .. } => {
                Self::tagged(FailureKind::Timeout, message)
            }
            ThrottleErrorKind::InvalidLimits(_) | ThrottleErrorKind::Closed(_) => Self::new(message),
        }
    }
}

/// A backend failure annotated with its kind and remediation hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct ClassifiedFailure {
    /// Failure category.
    kind: FailureKind,
    /// Backend that failed.
    backend_id: String,
    /// Original failure message.
    message: String,
    /// Ordered suggestions, most relevant first. Never empty.
    remediation: Vec<String>,
    /// Whether retrying later may help.
    retryable: bool,
}

impl ClassifiedFailure {
    pub(crate) fn new(
        kind: FailureKind,
        backend_id: impl Into<String>,
        message: impl Into<String>,
        remediation: Vec<String>,
    ) -> Self {
        Self {
            kind,
            backend_id: backend_id.into(),
            message: message.into(),
            remediation,
            retryable: kind.is_retryable(),
        }
    }
}
