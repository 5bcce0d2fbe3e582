//! Deferred backend calls and their outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use switchboard_error::BackendFailure;
use tokio_util::sync::CancellationToken;

/// Boxed future produced by a [`UnitOfWork`].
pub type WorkFuture = Pin<Box<dyn Future<Output = Result<String, BackendFailure>> + Send>>;

type WorkFn = Box<dyn FnOnce(CancellationToken) -> WorkFuture + Send>;

/// One deferred backend call.
///
/// The closure receives a cancellation token that is raised when the call's
/// deadline passes; well-behaved adapters stop their request when it fires.
/// A unit is consumed by [`call`](Self::call) and cannot run twice.
///
/// # Examples
///
/// ```
/// use switchboard_core::UnitOfWork;
/// use tokio_util::sync::CancellationToken;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let work = UnitOfWork::new(|_token| async { Ok("done".to_string()) });
/// let result = work.call(CancellationToken::new()).await;
/// assert_eq!(result.unwrap(), "done");
/// # });
/// ```
pub struct UnitOfWork(WorkFn);

impl UnitOfWork {
    /// Wrap an async closure as a unit of work.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, BackendFailure>> + Send + 'static,
    {
        Self(Box::new(move |token| Box::pin(f(token))))
    }

    /// Start the call.
    pub fn call(self, token: CancellationToken) -> WorkFuture {
        (self.0)(token)
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UnitOfWork")
    }
}

/// Result of one unit of work against one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The call returned a payload.
    Fulfilled {
        /// Backend that answered.
        backend_id: String,
        /// Response payload.
        payload: String,
    },
    /// The call failed, timed out or was never admitted.
    Failed {
        /// Backend that failed.
        backend_id: String,
        /// Raw failure.
        failure: BackendFailure,
    },
}

impl Outcome {
    /// Build an outcome from a call result.
    pub fn from_result(backend_id: impl Into<String>, result: Result<String, BackendFailure>) -> Self {
        let backend_id = backend_id.into();
        match result {
            Ok(payload) => Outcome::Fulfilled {
                backend_id,
                payload,
            },
            Err(failure) => Outcome::Failed {
                backend_id,
                failure,
            },
        }
    }

    /// Backend this outcome belongs to.
    pub fn backend_id(&self) -> &str {
        match self {
            Outcome::Fulfilled { backend_id, .. } | Outcome::Failed { backend_id, .. } => {
                backend_id
            }
        }
    }

    /// Check if the call succeeded.
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled { .. })
    }
}
