//! Merged per-backend results of one fan-out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use switchboard_core::Outcome;
use switchboard_error::{
    BackendFailure, ClassifiedFailure, ClassifyContext, JsonError, SwitchboardResult, classify,
};

/// Result half of a report entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryOutcome {
    /// The backend answered.
    Fulfilled {
        /// Response payload.
        value: String,
    },
    /// The call failed, timed out, panicked or was never admitted.
    Rejected {
        /// Classified failure with remediation.
        failure: ClassifiedFailure,
    },
}

/// One backend's line in a [`FanOutReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct ReportEntry {
    /// Backend this entry belongs to.
    backend_id: String,
    /// Fulfilled value or classified failure.
    #[serde(flatten)]
    outcome: EntryOutcome,
    /// Milliseconds from the start of the fan-out until this entry settled.
    elapsed_ms: u64,
}

impl ReportEntry {
    /// A fulfilled entry.
    pub fn fulfilled(backend_id: impl Into<String>, value: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            backend_id: backend_id.into(),
            outcome: EntryOutcome::Fulfilled {
                value: value.into(),
            },
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// A rejected entry, classifying `failure` against `context`.
    pub fn rejected(failure: &BackendFailure, context: &ClassifyContext, elapsed: Duration) -> Self {
        Self {
            backend_id: context.backend_id.clone(),
            outcome: EntryOutcome::Rejected {
                failure: classify(failure, context),
            },
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Build an entry from a call outcome, classifying a failure against
    /// `context`.
    pub fn from_outcome(outcome: Outcome, context: &ClassifyContext, elapsed: Duration) -> Self {
        match outcome {
            Outcome::Fulfilled {
                backend_id,
                payload,
            } => Self::fulfilled(backend_id, payload, elapsed),
            Outcome::Failed { failure, .. } => Self::rejected(&failure, context, elapsed),
        }
    }

    /// Check if the backend answered.
    pub fn is_fulfilled(&self) -> bool {
        matches!(self.outcome, EntryOutcome::Fulfilled { .. })
    }

    /// The response payload, if fulfilled.
    pub fn value(&self) -> Option<&str> {
        match &self.outcome {
            EntryOutcome::Fulfilled { value } => Some(value),
            EntryOutcome::Rejected { .. } => None,
        }
    }

    /// The classified failure, if rejected.
    pub fn failure(&self) -> Option<&ClassifiedFailure> {
        match &self.outcome {
            EntryOutcome::Fulfilled { .. } => None,
            EntryOutcome::Rejected { failure } => Some(failure),
        }
    }

    /// `"fulfilled"` or `"rejected"`.
    pub fn status(&self) -> &'static str {
        if self.is_fulfilled() {
            "fulfilled"
        } else {
            "rejected"
        }
    }
}

/// Per-backend outcomes of a fan-out, in the order the caller listed the
/// backends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FanOutReport {
    entries: Vec<ReportEntry>,
}

impl FanOutReport {
    /// Wrap entries already in caller order.
    pub fn new(entries: Vec<ReportEntry>) -> Self {
        Self { entries }
    }

    /// Entries in caller order.
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Consume the report into its entries.
    pub fn into_entries(self) -> Vec<ReportEntry> {
        self.entries
    }

    /// Iterate over entries in caller order.
    pub fn iter(&self) -> std::slice::Iter<'_, ReportEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the report has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry for a backend.
    pub fn get(&self, backend_id: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|entry| entry.backend_id == backend_id)
    }

    /// Number of fulfilled entries.
    pub fn fulfilled_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_fulfilled()).count()
    }

    /// Number of rejected entries.
    pub fn rejected_count(&self) -> usize {
        self.len() - self.fulfilled_count()
    }

    /// Render as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> SwitchboardResult<String> {
        Ok(serde_json::to_string_pretty(self).map_err(JsonError::from)?)
    }
}

impl<'a> IntoIterator for &'a FanOutReport {
    type Item = &'a ReportEntry;
    type IntoIter = std::slice::Iter<'a, ReportEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            EntryOutcome::Fulfilled { value } => {
                writeln!(f, "=== {} (fulfilled, {} ms) ===", self.backend_id, self.elapsed_ms)?;
                writeln!(f, "{}", value.trim_end())
            }
            EntryOutcome::Rejected { failure } => {
                writeln!(
                    f,
                    "=== {} (rejected: {}, {} ms) ===",
                    self.backend_id,
                    failure.kind(),
                    self.elapsed_ms
                )?;
                writeln!(f, "Error: {}", failure.message())?;
                writeln!(f, "Suggestions:")?;
                for hint in failure.remediation() {
                    writeln!(f, "  - {}", hint)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for FanOutReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "No backends were requested.");
        }
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        write!(
            f,
            "{} of {} backends fulfilled",
            self.fulfilled_count(),
            self.len()
        )
    }
}
