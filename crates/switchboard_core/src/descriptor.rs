//! Static per-backend limits.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use switchboard_error::{BuilderError, BuilderErrorKind};

/// Default sliding-window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Default per-call timeout, measured from the admission request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default context budget in estimated units.
pub const DEFAULT_MAX_CONTEXT_UNITS: u64 = 128_000;

/// Static limits for one backend.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use switchboard_core::BackendDescriptor;
///
/// let descriptor = BackendDescriptor::builder()
///     .id("gemini")
///     .max_concurrent(4usize)
///     .requests_per_window(15u32)
///     .timeout(Duration::from_secs(30))
///     .build()
///     .unwrap();
///
/// assert_eq!(descriptor.id(), "gemini");
/// assert_eq!(*descriptor.window(), Duration::from_secs(60));
/// assert!(descriptor.is_rate_limited());
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_getters::Getters,
    derive_builder::Builder,
)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct BackendDescriptor {
    /// Unique backend identifier.
    id: String,
    /// Maximum calls in flight at once. At least 1.
    #[builder(default = "1")]
    max_concurrent: usize,
    /// Admissions allowed per window; 0 disables window limiting.
    #[builder(default)]
    requests_per_window: u32,
    /// Length of the sliding window.
    #[builder(default = "DEFAULT_WINDOW")]
    window: Duration,
    /// Budget for queue wait plus execution of one call.
    #[builder(default = "DEFAULT_TIMEOUT")]
    timeout: Duration,
    /// Largest payload the backend accepts, in estimated units.
    #[builder(default = "DEFAULT_MAX_CONTEXT_UNITS")]
    max_context_units: u64,
}

impl BackendDescriptor {
    /// Creates a new descriptor builder.
    pub fn builder() -> BackendDescriptorBuilder {
        BackendDescriptorBuilder::default()
    }

    /// Check whether sliding-window limiting applies.
    pub fn is_rate_limited(&self) -> bool {
        self.requests_per_window > 0
    }
}

impl BackendDescriptorBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(id) = &self.id
            && id.trim().is_empty()
        {
            return Err("backend id must not be empty".to_string());
        }
        if self.max_concurrent == Some(0) {
            return Err("max_concurrent must be at least 1".to_string());
        }
        if self.window == Some(Duration::ZERO) {
            return Err("window must be greater than zero".to_string());
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err("timeout must be greater than zero".to_string());
        }
        if self.max_context_units == Some(0) {
            return Err("max_context_units must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl From<BackendDescriptorBuilderError> for BuilderError {
    #[track_caller]
    fn from(err: BackendDescriptorBuilderError) -> Self {
        match err {
            BackendDescriptorBuilderError::UninitializedField(field) => {
                BuilderError::new(BuilderErrorKind::MissingField(field.to_string()))
            }
            BackendDescriptorBuilderError::ValidationError(reason) => {
                BuilderError::new(BuilderErrorKind::ValidationFailed(reason))
            }
        }
    }
}
