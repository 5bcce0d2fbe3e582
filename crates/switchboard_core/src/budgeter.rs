//! Fitting payloads into a backend's context budget.

use crate::{PayloadSet, TokenEstimator};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Result of fitting a payload set into a budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct FittedPayload {
    /// The payload to send, possibly with blocks removed.
    payload: PayloadSet,
    /// Estimated cost of `payload`.
    estimated_cost: u64,
    /// Budget the payload was fitted against.
    budget: u64,
    /// Whether any block was dropped.
    trimmed: bool,
    /// Names of dropped blocks, in drop order.
    dropped: Vec<String>,
    /// Still over budget after dropping every unpinned block.
    over_budget: bool,
}

impl FittedPayload {
    /// Consume the result, keeping only the payload.
    pub fn into_payload(self) -> PayloadSet {
        self.payload
    }
}

/// Trims payload sets to fit a context budget.
///
/// Blocks are dropped lowest priority first, earliest position first among
/// equal priorities. Pinned blocks are never dropped. If nothing droppable
/// remains and the payload is still too large, the result is flagged
/// `over_budget` and sent anyway.
///
/// # Examples
///
/// ```
/// use switchboard_core::{ContentBlock, ContextBudgeter, PayloadSet};
///
/// let set: PayloadSet = vec![
///     ContentBlock::new("keep.rs", "x".repeat(400)).with_priority(9),
///     ContentBlock::new("drop.rs", "y".repeat(400)).with_priority(1),
/// ]
/// .into();
///
/// let fitted = ContextBudgeter::default().fit(&set, 150);
/// assert!(*fitted.trimmed());
/// assert_eq!(fitted.dropped(), &vec!["drop.rs".to_string()]);
/// assert_eq!(fitted.payload().names(), vec!["keep.rs"]);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContextBudgeter {
    estimator: TokenEstimator,
}

impl ContextBudgeter {
    /// Create a budgeter using the given estimator.
    pub fn new(estimator: TokenEstimator) -> Self {
        Self { estimator }
    }

    /// The estimator in use.
    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    /// Fit `set` into `budget` estimated units.
    #[instrument(skip(self, set), fields(blocks = set.len()))]
    pub fn fit(&self, set: &PayloadSet, budget: u64) -> FittedPayload {
        let mut chars = set.total_chars();
        let initial = self.estimator.estimate_chars(chars);

        if initial <= budget {
            return FittedPayload {
                payload: set.clone(),
                estimated_cost: initial,
                budget,
                trimmed: false,
                dropped: Vec::new(),
                over_budget: false,
            };
        }

        let mut candidates: Vec<usize> = set
            .iter()
            .enumerate()
            .filter(|(_, block)| !*block.pinned())
            .map(|(index, _)| index)
            .collect();
        candidates.sort_by_key(|&index| (*set.blocks()[index].priority(), index));

        let mut removed = vec![false; set.len()];
        let mut dropped = Vec::new();
        for index in candidates {
            if self.estimator.estimate_chars(chars) <= budget {
                break;
            }
            let block = &set.blocks()[index];
            chars -= block.chars();
            removed[index] = true;
            dropped.push(block.name().clone());
            debug!(block = %block.name(), priority = block.priority(), "Dropped block to fit budget");
        }

        let payload: PayloadSet = set
            .iter()
            .zip(&removed)
            .filter(|(_, removed)| !**removed)
            .map(|(block, _)| block.clone())
            .collect();
        let estimated_cost = self.estimator.estimate_chars(chars);
        let over_budget = estimated_cost > budget;

        if over_budget {
            warn!(
                estimated_cost,
                budget, "Payload exceeds context budget after trimming; sending anyway"
            );
        } else {
            debug!(
                initial,
                estimated_cost,
                dropped = dropped.len(),
                "Payload trimmed to fit budget"
            );
        }

        FittedPayload {
            payload,
            estimated_cost,
            budget,
            trimmed: !dropped.is_empty(),
            dropped,
            over_budget,
        }
    }
}
