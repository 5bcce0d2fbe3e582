//! Parallel fan-out over per-backend gates.
//!
//! Every target gets its own task. A failure, timeout or panic in one task
//! becomes that backend's `rejected` entry and never touches its siblings.

use crate::metrics::BrokerMetrics;
use crate::{FanOutReport, ReportEntry};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;
use switchboard_core::{BackendDescriptor, Outcome, UnitOfWork};
use switchboard_error::{
    BackendFailure, BrokerError, BrokerErrorKind, ClassifyContext, SwitchboardResult,
};
use switchboard_rate_limit::{GateSnapshot, GateUpdate, ThrottleGate};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Facts about the payload being fanned out, used for remediation hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadFacts {
    /// Number of files (content blocks) sent.
    pub file_count: Option<usize>,
    /// Estimated payload cost in units.
    pub estimated_units: Option<u64>,
}

#[derive(Debug, Clone)]
struct Target {
    descriptor: BackendDescriptor,
    gate: ThrottleGate,
}

/// Owns one gate per backend and runs fan-outs across them.
///
/// # Examples
///
/// ```
/// use switchboard_broker::Dispatcher;
/// use switchboard_core::{BackendDescriptor, Outcome, UnitOfWork};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let descriptors = ["a", "b"]
///     .map(|id| BackendDescriptor::builder().id(id).build().unwrap());
/// let dispatcher = Dispatcher::new(descriptors).unwrap();
///
/// let report = dispatcher
///     .fan_out(&["b", "a"], |id| {
///         let id = id.to_string();
///         UnitOfWork::new(move |_token| async move { Ok(format!("hello from {id}")) })
///     })
///     .await;
///
/// assert_eq!(report.entries()[0].backend_id(), "b");
/// assert_eq!(report.fulfilled_count(), 2);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Dispatcher {
    order: Vec<String>,
    targets: HashMap<String, Target>,
}

impl Dispatcher {
    /// Create a gate for every descriptor.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateBackend` if two descriptors share an id.
    pub fn new(
        descriptors: impl IntoIterator<Item = BackendDescriptor>,
    ) -> Result<Self, BrokerError> {
        let mut order = Vec::new();
        let mut targets = HashMap::new();
        for descriptor in descriptors {
            let id = descriptor.id().clone();
            if targets.contains_key(&id) {
                return Err(BrokerError::new(BrokerErrorKind::DuplicateBackend(id)));
            }
            let gate = ThrottleGate::new(&descriptor);
            order.push(id.clone());
            targets.insert(id, Target { descriptor, gate });
        }
        Ok(Self { order, targets })
    }

    /// Backend ids in registration order.
    pub fn backend_ids(&self) -> &[String] {
        &self.order
    }

    /// Check if a backend has a gate.
    pub fn contains(&self, backend_id: &str) -> bool {
        self.targets.contains_key(backend_id)
    }

    /// The gate for a backend.
    pub fn gate(&self, backend_id: &str) -> Option<&ThrottleGate> {
        self.targets.get(backend_id).map(|target| &target.gate)
    }

    /// The static descriptor for a backend.
    pub fn descriptor(&self, backend_id: &str) -> Option<&BackendDescriptor> {
        self.targets.get(backend_id).map(|target| &target.descriptor)
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Vec<&BackendDescriptor> {
        self.order
            .iter()
            .filter_map(|id| self.descriptor(id))
            .collect()
    }

    /// Snapshots of every gate, in registration order.
    pub fn snapshots(&self) -> Vec<GateSnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.gate(id))
            .map(ThrottleGate::snapshot)
            .collect()
    }

    /// Change a backend's live limits.
    ///
    /// # Errors
    ///
    /// Returns `UnknownBackend` for an id without a gate, or the gate's
    /// validation error.
    pub fn update(&self, backend_id: &str, update: GateUpdate) -> SwitchboardResult<()> {
        let gate = self.gate(backend_id).ok_or_else(|| {
            BrokerError::new(BrokerErrorKind::UnknownBackend(backend_id.to_string()))
        })?;
        gate.update(update)?;
        Ok(())
    }

    /// Classification context for a backend and payload.
    pub fn context_for(&self, backend_id: &str, facts: &PayloadFacts) -> ClassifyContext {
        let mut context = ClassifyContext::for_backend(backend_id);
        if let Some(target) = self.targets.get(backend_id) {
            context = context
                .with_max_units(*target.descriptor.max_context_units())
                .with_timeout(*target.gate.limits().timeout());
        }
        if let Some(count) = facts.file_count {
            context = context.with_file_count(count);
        }
        if let Some(units) = facts.estimated_units {
            context = context.with_estimated_units(units);
        }
        context
    }

    /// Run one unit of work per backend and merge the outcomes.
    ///
    /// An empty backend list returns an empty report immediately.
    pub async fn fan_out<S, F>(&self, backends: &[S], make_work: F) -> FanOutReport
    where
        S: AsRef<str>,
        F: FnMut(&str) -> UnitOfWork,
    {
        self.fan_out_with(backends, PayloadFacts::default(), make_work, |_| {})
            .await
    }

    /// [`fan_out`](Self::fan_out) with payload facts for classification and a
    /// callback invoked as each entry settles, in completion order.
    ///
    /// The returned report is always in the order of `backends`.
    #[instrument(skip_all, fields(targets = backends.len()))]
    pub async fn fan_out_with<S, F, C>(
        &self,
        backends: &[S],
        facts: PayloadFacts,
        mut make_work: F,
        mut on_complete: C,
    ) -> FanOutReport
    where
        S: AsRef<str>,
        F: FnMut(&str) -> UnitOfWork,
        C: FnMut(&ReportEntry),
    {
        if backends.is_empty() {
            return FanOutReport::default();
        }

        let metrics = BrokerMetrics::get();
        metrics.record_fan_out(backends.len());
        let started = Instant::now();
        let mut slots: Vec<Option<ReportEntry>> = vec![None; backends.len()];
        let mut tasks = JoinSet::new();

        for (index, backend_id) in backends.iter().enumerate() {
            let backend_id = backend_id.as_ref();
            let context = self.context_for(backend_id, &facts);

            let Some(target) = self.targets.get(backend_id) else {
                warn!(backend = backend_id, "No gate for requested backend");
                let failure = BackendFailure::new(format!("Unknown backend '{}'", backend_id));
                let entry = ReportEntry::rejected(&failure, &context, Duration::ZERO);
                settle(&mut slots, index, entry, &mut on_complete);
                continue;
            };

            let work = match catch_unwind(AssertUnwindSafe(|| make_work(backend_id))) {
                Ok(work) => work,
                Err(panic) => {
                    let failure = BackendFailure::new(format!(
                        "Building the request panicked: {}",
                        panic_message(panic.as_ref())
                    ));
                    let entry = ReportEntry::rejected(&failure, &context, started.elapsed());
                    settle(&mut slots, index, entry, &mut on_complete);
                    continue;
                }
            };

            let gate = target.gate.clone();
            debug!(backend = backend_id, index, "Dispatching unit of work");
            tasks.spawn(async move {
                let result = AssertUnwindSafe(gate.run(work)).catch_unwind().await;
                let result = result.unwrap_or_else(|panic| {
                    Err(BackendFailure::new(format!(
                        "Backend task panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                });
                let outcome = Outcome::from_result(context.backend_id.clone(), result);
                (index, context, outcome, started.elapsed())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, context, outcome, elapsed)) => {
                    if !outcome.is_fulfilled() {
                        debug!(backend = outcome.backend_id(), index, "Backend call failed");
                    }
                    let entry = ReportEntry::from_outcome(outcome, &context, elapsed);
                    settle(&mut slots, index, entry, &mut on_complete);
                }
                Err(e) => warn!(error = %e, "Backend task did not complete"),
            }
        }

        let entries = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let backend_id = backends[index].as_ref();
                    let failure =
                        BackendFailure::new("Backend task was cancelled before completing");
                    let context = self.context_for(backend_id, &facts);
                    ReportEntry::rejected(&failure, &context, started.elapsed())
                })
            })
            .collect();
        let report = FanOutReport::new(entries);
        debug!(
            fulfilled = report.fulfilled_count(),
            rejected = report.rejected_count(),
            "Fan-out complete"
        );
        report
    }
}

fn settle<C: FnMut(&ReportEntry)>(
    slots: &mut [Option<ReportEntry>],
    index: usize,
    entry: ReportEntry,
    on_complete: &mut C,
) {
    BrokerMetrics::get().record_entry(&entry);
    if let Some(failure) = entry.failure() {
        debug!(backend = %entry.backend_id(), kind = %failure.kind(), "Backend rejected");
    }
    on_complete(&entry);
    slots[index] = Some(entry);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
