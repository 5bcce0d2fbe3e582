//! Admission and execution errors raised by a throttle gate.

use std::time::Duration;

/// Specific throttle gate error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ThrottleErrorKind {
    /// The per-call deadline passed while the call was still queued.
    #[display("Backend '{}' timed out after waiting {:?} in the admission queue", backend, waited)]
    QueueTimeout {
        /// Backend whose gate was waited on
        backend: String,
        /// Time spent in the queue before the deadline fired
        waited: Duration,
    },

    /// The per-call deadline passed while the call was running.
    #[display(
        "Backend '{}' call timed out: {:?} budget exhausted ({:?} spent queued)",
        backend,
        timeout,
        queued
    )]
    ExecutionTimeout {
        /// Backend whose call was cancelled
        backend: String,
        /// Full per-call timeout, measured from the admission request
        timeout: Duration,
        /// Portion of the timeout consumed before the call started
        queued: Duration,
    },

    /// A live limit update carried an unusable value.
    #[display("Invalid gate limits: {}", _0)]
    InvalidLimits(String),

    /// The gate stopped before granting admission.
    #[display("Throttle gate for backend '{}' closed before admission", _0)]
    Closed(String),
}

impl ThrottleErrorKind {
    /// Whether this error means the per-call deadline expired.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ThrottleErrorKind::QueueTimeout { .. } | ThrottleErrorKind::ExecutionTimeout { .. }
        )
    }
}

/// Throttle gate error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Throttle Error: {} at line {} in {}", kind, line, file)]
pub struct ThrottleError {
    /// The specific error kind
    pub kind: ThrottleErrorKind,
    /// Line number where error occurred
    pub line: u32,
    /// File where error occurred
    pub file: &'static str,
}

impl ThrottleError {
    /// Create a new throttle error with location tracking.
    #[track_caller]
    pub fn new(kind: ThrottleErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &ThrottleErrorKind {
        &self.kind
    }
}
