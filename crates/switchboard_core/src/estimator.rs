//! Heuristic payload cost estimation.

use crate::PayloadSet;
use serde::{Deserialize, Serialize};
use switchboard_error::{BuilderError, BuilderErrorKind};

/// Character-ratio cost estimator.
///
/// Cost is `ceil(chars / chars_per_unit * safety_factor)`. The safety factor
/// is strictly greater than 1 so estimates err toward overcounting.
///
/// # Examples
///
/// ```
/// use switchboard_core::TokenEstimator;
///
/// let estimator = TokenEstimator::default();
/// // 400 chars / 4.0 * 1.1 = 110
/// assert_eq!(estimator.estimate_chars(400), 110);
/// assert_eq!(estimator.estimate_text(""), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
#[serde(deny_unknown_fields)]
pub struct TokenEstimator {
    /// Characters per estimated unit (default 4.0).
    #[serde(default = "default_chars_per_unit")]
    chars_per_unit: f64,
    /// Overcount factor, > 1.0 (default 1.1).
    #[serde(default = "default_safety_factor")]
    safety_factor: f64,
}

fn default_chars_per_unit() -> f64 {
    4.0
}

fn default_safety_factor() -> f64 {
    1.1
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_unit: default_chars_per_unit(),
            safety_factor: default_safety_factor(),
        }
    }
}

impl TokenEstimator {
    /// Create a validated estimator.
    ///
    /// # Errors
    ///
    /// Returns an error if `chars_per_unit <= 0` or `safety_factor <= 1.0`.
    #[track_caller]
    pub fn new(chars_per_unit: f64, safety_factor: f64) -> Result<Self, BuilderError> {
        let estimator = Self {
            chars_per_unit,
            safety_factor,
        };
        estimator.validate()?;
        Ok(estimator)
    }

    /// Validate ratios, e.g. after deserializing.
    ///
    /// # Errors
    ///
    /// Returns an error if `chars_per_unit <= 0` or `safety_factor <= 1.0`.
    #[track_caller]
    pub fn validate(&self) -> Result<(), BuilderError> {
        if !self.chars_per_unit.is_finite() || self.chars_per_unit <= 0.0 {
            return Err(BuilderError::new(BuilderErrorKind::InvalidField {
                field: "chars_per_unit".to_string(),
                reason: format!("must be a positive number, got {}", self.chars_per_unit),
            }));
        }
        if !self.safety_factor.is_finite() || self.safety_factor <= 1.0 {
            return Err(BuilderError::new(BuilderErrorKind::InvalidField {
                field: "safety_factor".to_string(),
                reason: format!("must be greater than 1.0, got {}", self.safety_factor),
            }));
        }
        Ok(())
    }

    /// Estimate the cost of `chars` characters.
    pub fn estimate_chars(&self, chars: usize) -> u64 {
        if chars == 0 {
            return 0;
        }
        let raw = chars as f64 / self.chars_per_unit * self.safety_factor;
        // Snap away binary noise first: 100.0 * 1.1 is 110.00000000000001.
        ((raw * 1e6).round() / 1e6).ceil() as u64
    }

    /// Estimate the cost of a piece of text.
    pub fn estimate_text(&self, text: &str) -> u64 {
        self.estimate_chars(text.chars().count())
    }

    /// Estimate the cost of a whole payload set.
    pub fn estimate_set(&self, set: &PayloadSet) -> u64 {
        self.estimate_chars(set.total_chars())
    }
}
