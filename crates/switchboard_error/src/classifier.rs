//! Keyword classification of backend failures.
//!
//! Classification is advisory: it annotates a failure the dispatcher has
//! already captured and never changes control flow. A structured kind supplied
//! by the adapter always wins; the keyword table below is the fallback for
//! adapters that only have an error message.

use crate::{BackendFailure, ClassifiedFailure, FailureKind};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, instrument};

/// Number of files above which remediation suggests sending fewer files.
pub const LARGE_FILE_COUNT: usize = 10;

/// Ordered rule table. The first pattern that matches decides the kind.
static RULES: LazyLock<Vec<(FailureKind, Regex)>> = LazyLock::new(|| {
    [
        (
            FailureKind::Auth,
            r"(?i)\b(401|403)\b|unauthori[sz]ed|forbidden|authenticat|api[ _-]?key|invalid[ _-]?(token|credentials?)|permission[ _]denied|access[ _]denied",
        ),
        (
            FailureKind::Quota,
            r"(?i)\b429\b|quota|rate[ _-]?limit|too many requests|resource[ _]exhausted|billing|exceeded your current",
        ),
        (
            FailureKind::Model,
            r"(?i)model[ _]not[ _]found|no such model|(unknown|invalid|unsupported|deprecated|decommissioned)[ _]model|\bmodel\b[^.]*\b(not found|does not exist|not supported|is not available|decommissioned)",
        ),
        (
            FailureKind::Network,
            r"(?i)econnrefused|econnreset|enotfound|ehostunreach|connection (refused|reset|closed|failed|aborted|error)|\bdns\b|network|socket|unreachable|broken pipe|\b(502|503)\b|bad gateway|service unavailable",
        ),
        (
            FailureKind::Timeout,
            r"(?i)etimedout|timed[ _-]?out|time[ _-]?outs?\b|deadline[ _]exceeded|\b(408|504)\b",
        ),
        (
            FailureKind::ContextSize,
            r"(?i)context[ _](length|window|size|limit)|maximum context|too many tokens|token[ _]limit|maximum number of tokens|input token count|too long|\b413\b|payload too large|request too large",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("Valid classifier regex")))
    .collect()
});

/// Request-side facts that sharpen remediation hints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifyContext {
    /// Backend the failure came from.
    pub backend_id: String,
    /// Number of files in the payload, when known.
    pub file_count: Option<usize>,
    /// Estimated payload cost in units, when known.
    pub estimated_units: Option<u64>,
    /// Backend's maximum context budget in units, when known.
    pub max_units: Option<u64>,
    /// Per-call timeout in force, when known.
    pub timeout: Option<Duration>,
}

impl ClassifyContext {
    /// Create a context for the given backend with no extra facts.
    pub fn for_backend(backend_id: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            ..Self::default()
        }
    }

    /// Set the number of files in the payload.
    pub fn with_file_count(mut self, count: usize) -> Self {
        self.file_count = Some(count);
        self
    }

    /// Set the estimated payload cost.
    pub fn with_estimated_units(mut self, units: u64) -> Self {
        self.estimated_units = Some(units);
        self
    }

    /// Set the backend's maximum context budget.
    pub fn with_max_units(mut self, units: u64) -> Self {
        self.max_units = Some(units);
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn has_many_files(&self) -> bool {
        self.file_count.is_some_and(|n| n > LARGE_FILE_COUNT)
    }
}

impl FailureKind {
    /// Classify a bare message with the keyword table.
    ///
    /// # Examples
    ///
    /// ```
    /// use switchboard_error::FailureKind;
    ///
    /// assert_eq!(FailureKind::from_message("401 Unauthorized"), FailureKind::Auth);
    /// assert_eq!(FailureKind::from_message("something odd"), FailureKind::Unknown);
    /// ```
    pub fn from_message(message: &str) -> Self {
        RULES
            .iter()
            .find(|(_, pattern)| pattern.is_match(message))
            .map(|(kind, _)| *kind)
            .unwrap_or(FailureKind::Unknown)
    }
}

/// Classify a backend failure.
///
/// # Examples
///
/// ```
/// use switchboard_error::{BackendFailure, ClassifyContext, FailureKind, classify};
///
/// let ctx = ClassifyContext::for_backend("gemini")
///     .with_estimated_units(120_000)
///     .with_max_units(100_000);
/// let failure = classify(&BackendFailure::new("context length exceeded"), &ctx);
///
/// assert_eq!(*failure.kind(), FailureKind::ContextSize);
/// assert!(failure.remediation()[0].contains("120000"));
/// ```
#[instrument(level = "debug", skip_all, fields(backend = %context.backend_id))]
pub fn classify(failure: &BackendFailure, context: &ClassifyContext) -> ClassifiedFailure {
    let kind = failure
        .kind()
        .unwrap_or_else(|| FailureKind::from_message(failure.message()));
    debug!(%kind, tagged = failure.kind().is_some(), "Classified backend failure");

    ClassifiedFailure::new(
        kind,
        context.backend_id.clone(),
        failure.message(),
        remediation(kind, context),
    )
}

fn remediation(kind: FailureKind, ctx: &ClassifyContext) -> Vec<String> {
    let id = &ctx.backend_id;
    let mut hints = Vec::new();

    match kind {
        FailureKind::Auth => {
            hints.push(format!("Verify the API key configured for backend '{}'", id));
            hints.push("Confirm the key is active and allowed to use the requested model".into());
        }
        FailureKind::Quota => {
            hints.push("Wait for the provider's rate-limit window to reset before retrying".into());
            hints.push(format!(
                "Lower requests_per_window or max_concurrent for '{}' to match the provider quota",
                id
            ));
            hints.push("Check the account's billing and usage limits".into());
        }
        FailureKind::Model => {
            hints.push(format!(
                "Check that the model configured for '{}' exists and is spelled correctly",
                id
            ));
            hints.push("Confirm the account has access to this model".into());
        }
        FailureKind::Network => {
            hints.push(format!(
                "Check connectivity to the '{}' endpoint (DNS, proxy, firewall)",
                id
            ));
            hints.push("Retry the request; upstream availability errors are usually transient".into());
        }
        FailureKind::Timeout => {
            match ctx.timeout {
                Some(timeout) => hints.push(format!(
                    "The {}s timeout for '{}' covers queue wait and execution; raise it if calls are legitimately slow",
                    timeout.as_secs_f64(),
                    id
                )),
                None => hints.push(format!("Increase the per-call timeout for '{}'", id)),
            }
            if ctx.has_many_files() {
                hints.push(reduce_files_hint(ctx));
            }
            hints.push("Reduce the payload size so the backend can answer sooner".into());
        }
        FailureKind::ContextSize => {
            if let (Some(estimated), Some(max)) = (ctx.estimated_units, ctx.max_units) {
                hints.push(format!(
                    "Estimated {} units against a maximum of {} for '{}'",
                    estimated, max, id
                ));
            }
            if ctx.has_many_files() {
                hints.push(reduce_files_hint(ctx));
            }
            hints.push(
                "Send fewer or smaller content blocks, or lower their priority so they are trimmed first"
                    .into(),
            );
        }
        FailureKind::Unknown => {
            hints.push(format!("Inspect the raw error message returned by '{}'", id));
            hints.push("Retry the request and report the message if it persists".into());
        }
    }

    hints
}

fn reduce_files_hint(ctx: &ClassifyContext) -> String {
    format!(
        "Reduce file count: {} files were included",
        ctx.file_count.unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_order_auth_before_quota() {
        // Mentions both a key problem and a rate limit; auth comes first.
        let kind = FailureKind::from_message("invalid api key (rate limit headers absent)");
        assert_eq!(kind, FailureKind::Auth);
    }

    #[test]
    fn test_network_before_timeout() {
        let kind = FailureKind::from_message("connection reset while waiting; request timed out");
        assert_eq!(kind, FailureKind::Network);
    }

    #[test]
    fn test_tag_overrides_message() {
        let failure = BackendFailure::tagged(FailureKind::Model, "quota exceeded");
        let classified = classify(&failure, &ClassifyContext::for_backend("x"));
        assert_eq!(*classified.kind(), FailureKind::Model);
    }

    #[test]
    fn test_every_kind_has_remediation() {
        use strum::IntoEnumIterator;

        for kind in FailureKind::iter() {
            let hints = remediation(kind, &ClassifyContext::for_backend("b"));
            assert!(!hints.is_empty(), "{kind} has no remediation");
        }
    }
}
