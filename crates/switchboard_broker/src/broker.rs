//! Composition root: gates, adapters, budgeting and backpressure.

use crate::capacity::OutstandingCalls;
use crate::metrics::BrokerMetrics;
use crate::{
    Availability, Backend, BackendRegistry, CapacityPolicy, Dispatcher, FanOutReport,
    MaxOutstanding, PayloadFacts, ReportEntry, Unbounded,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{
    BackendDescriptor, ContextBudgeter, FittedPayload, PayloadSet, TokenEstimator, UnitOfWork,
};
use switchboard_error::{
    BackendFailure, BrokerError, BrokerErrorKind, FailureKind, SwitchboardResult,
};
use switchboard_rate_limit::{GateSnapshot, GateUpdate, SwitchboardConfig};
use tracing::{debug, info, instrument, warn};

/// Tunables injected into a [`Broker`].
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    estimator: TokenEstimator,
    capacity: Arc<dyn CapacityPolicy>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            estimator: TokenEstimator::default(),
            capacity: Arc::new(Unbounded),
        }
    }
}

impl BrokerSettings {
    /// Settings with default estimator and no capacity ceiling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings taken from a loaded configuration.
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        Self::default()
            .with_estimator(config.estimator())
            .with_max_outstanding(config.broker.max_outstanding)
    }

    /// Use a specific estimator for payload budgeting.
    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Use a custom capacity policy.
    pub fn with_capacity(mut self, policy: impl CapacityPolicy + 'static) -> Self {
        self.capacity = Arc::new(policy);
        self
    }

    /// Cap outstanding backend calls; `None` removes the cap.
    pub fn with_max_outstanding(self, max_outstanding: Option<usize>) -> Self {
        match max_outstanding {
            Some(limit) => self.with_capacity(MaxOutstanding(limit)),
            None => self.with_capacity(Unbounded),
        }
    }
}

/// A logical request: one payload sent to several backends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerRequest {
    /// Backends to call, in report order. Empty means every backend.
    #[serde(default)]
    pub targets: Vec<String>,
    /// Content to send.
    pub payload: PayloadSet,
}

impl BrokerRequest {
    /// A request for `payload` against every backend.
    pub fn new(payload: PayloadSet) -> Self {
        Self {
            targets: Vec::new(),
            payload,
        }
    }

    /// Restrict the request to these backends, in this order.
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }
}

/// How the payload was budgeted before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct FitSummary {
    /// Smallest context budget among the targets.
    budget: u64,
    /// Estimated cost of what was sent.
    estimated_cost: u64,
    /// Number of blocks sent.
    blocks_sent: usize,
    /// Whether any block was dropped.
    trimmed: bool,
    /// Dropped block names, in drop order.
    dropped: Vec<String>,
    /// Sent despite exceeding the budget.
    over_budget: bool,
}

impl From<&FittedPayload> for FitSummary {
    fn from(fitted: &FittedPayload) -> Self {
        Self {
            budget: *fitted.budget(),
            estimated_cost: *fitted.estimated_cost(),
            blocks_sent: fitted.payload().len(),
            trimmed: *fitted.trimmed(),
            dropped: fitted.dropped().clone(),
            over_budget: *fitted.over_budget(),
        }
    }
}

/// Report plus budgeting outcome for one [`BrokerRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct BrokerResponse {
    /// Per-backend outcomes in target order.
    report: FanOutReport,
    /// Payload budgeting outcome.
    fit: FitSummary,
}

impl BrokerResponse {
    /// Consume the response, keeping only the report.
    pub fn into_report(self) -> FanOutReport {
        self.report
    }
}

/// Routes requests to backends through their throttle gates.
///
/// The broker owns every gate and adapter it uses; nothing is shared through
/// process-wide state.
pub struct Broker {
    dispatcher: Dispatcher,
    backends: HashMap<String, Arc<dyn Backend>>,
    budgeter: ContextBudgeter,
    capacity: Arc<dyn CapacityPolicy>,
    outstanding: OutstandingCalls,
}

impl Broker {
    /// Build a broker from descriptors paired with their adapters.
    ///
    /// # Errors
    ///
    /// Returns `EmptyBackendTable` for an empty list and `DuplicateBackend`
    /// when two entries share an id.
    #[instrument(skip_all, fields(backends = backends.len()))]
    pub fn new(
        backends: Vec<(BackendDescriptor, Arc<dyn Backend>)>,
        settings: BrokerSettings,
    ) -> SwitchboardResult<Self> {
        if backends.is_empty() {
            return Err(BrokerError::new(BrokerErrorKind::EmptyBackendTable).into());
        }

        let mut adapters = HashMap::new();
        let mut descriptors = Vec::with_capacity(backends.len());
        for (descriptor, backend) in backends {
            let id = descriptor.id().clone();
            if adapters.contains_key(&id) {
                return Err(BrokerError::new(BrokerErrorKind::DuplicateBackend(id)).into());
            }
            if backend.backend_id() != id {
                warn!(
                    descriptor = %id,
                    adapter = backend.backend_id(),
                    "Adapter id differs from descriptor id; using descriptor id"
                );
            }
            adapters.insert(id, backend);
            descriptors.push(descriptor);
        }

        let dispatcher = Dispatcher::new(descriptors)?;
        info!(backends = ?dispatcher.backend_ids(), capacity = ?settings.capacity, "Broker ready");

        Ok(Self {
            dispatcher,
            backends: adapters,
            budgeter: ContextBudgeter::new(settings.estimator),
            capacity: settings.capacity,
            outstanding: OutstandingCalls::default(),
        })
    }

    /// Build a broker from every usable factory in `registry`.
    ///
    /// Limits come from `config` when it names the backend, otherwise from the
    /// factory's defaults. Backends disabled in configuration, unavailable on
    /// probe, or failing to construct are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `NoUsableBackend` if nothing remains, or a configuration error
    /// for invalid limits.
    #[instrument(skip_all, fields(factories = registry.len()))]
    pub fn from_registry(
        registry: &BackendRegistry,
        config: &SwitchboardConfig,
    ) -> SwitchboardResult<Self> {
        let mut backends = Vec::new();
        let mut skipped = Vec::new();

        for factory in registry.factories() {
            let id = factory.backend_id().to_string();

            let configured = config.backend(&id);
            if configured.is_some_and(|backend| !backend.enabled) {
                debug!(backend = %id, "Backend disabled in configuration");
                skipped.push(format!("{} (disabled)", id));
                continue;
            }

            if let Availability::Unavailable(reason) = factory.probe() {
                warn!(backend = %id, %reason, "Skipping unavailable backend");
                skipped.push(format!("{} ({})", id, reason));
                continue;
            }

            let descriptor = match configured {
                Some(backend) => backend.to_descriptor(&id)?,
                None => factory.default_descriptor()?,
            };

            match factory.create() {
                Ok(backend) => backends.push((descriptor, backend)),
                Err(e) => {
                    warn!(backend = %id, error = %e, "Skipping backend that failed to construct");
                    skipped.push(format!("{} ({})", id, e.kind()));
                }
            }
        }

        if backends.is_empty() {
            let detail = if skipped.is_empty() {
                "no backends registered".to_string()
            } else {
                skipped.join(", ")
            };
            return Err(BrokerError::new(BrokerErrorKind::NoUsableBackend(detail)).into());
        }

        Self::new(backends, BrokerSettings::from_config(config))
    }

    /// Backend ids in registration order.
    pub fn backend_ids(&self) -> &[String] {
        self.dispatcher.backend_ids()
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Vec<&BackendDescriptor> {
        self.dispatcher.descriptors()
    }

    /// Live counters of every gate.
    pub fn gate_snapshots(&self) -> Vec<GateSnapshot> {
        self.dispatcher.snapshots()
    }

    /// The payload budgeter.
    pub fn budgeter(&self) -> &ContextBudgeter {
        &self.budgeter
    }

    /// Backend calls currently reserved across all fan-outs.
    pub fn outstanding(&self) -> usize {
        self.outstanding.current()
    }

    /// Change a backend's limits for future admissions.
    ///
    /// # Errors
    ///
    /// Returns `UnknownBackend` for an id the broker does not own, or an
    /// invalid-limits error.
    pub fn update_backend(&self, backend_id: &str, update: GateUpdate) -> SwitchboardResult<()> {
        self.dispatcher.update(backend_id, update)
    }

    /// Fan arbitrary units of work out to `backends`.
    ///
    /// Subject to the capacity policy; an empty list returns an empty report.
    pub async fn fan_out<S, F>(&self, backends: &[S], make_work: F) -> FanOutReport
    where
        S: AsRef<str>,
        F: FnMut(&str) -> UnitOfWork,
    {
        self.dispatch(backends, PayloadFacts::default(), make_work)
            .await
    }

    /// Budget the payload once, send it to every target, and merge results.
    ///
    /// The payload is fitted against the smallest context budget among the
    /// known targets so that every backend receives the same content.
    #[instrument(skip_all, fields(targets = request.targets.len(), blocks = request.payload.len()))]
    pub async fn execute(&self, request: &BrokerRequest) -> BrokerResponse {
        let targets: Vec<String> = if request.targets.is_empty() {
            self.backend_ids().to_vec()
        } else {
            request.targets.clone()
        };

        let budget = targets
            .iter()
            .filter_map(|id| self.dispatcher.descriptor(id))
            .map(|descriptor| *descriptor.max_context_units())
            .min()
            .unwrap_or(u64::MAX);
        let fitted = self.budgeter.fit(&request.payload, budget);
        let fit = FitSummary::from(&fitted);
        let facts = PayloadFacts {
            file_count: Some(fitted.payload().len()),
            estimated_units: Some(*fitted.estimated_cost()),
        };
        let payload = Arc::new(fitted.into_payload());

        let report = self
            .dispatch(&targets, facts, |id| self.unit_for(id, Arc::clone(&payload)))
            .await;
        BrokerResponse { report, fit }
    }

    fn unit_for(&self, backend_id: &str, payload: Arc<PayloadSet>) -> UnitOfWork {
        match self.backends.get(backend_id) {
            Some(backend) => {
                let backend = Arc::clone(backend);
                UnitOfWork::new(move |token| async move { backend.complete(&payload, token).await })
            }
            None => {
                let message = format!("No adapter registered for backend '{}'", backend_id);
                UnitOfWork::new(move |_token| async move { Err(BackendFailure::new(message)) })
            }
        }
    }

    async fn dispatch<S, F>(&self, targets: &[S], facts: PayloadFacts, make_work: F) -> FanOutReport
    where
        S: AsRef<str>,
        F: FnMut(&str) -> UnitOfWork,
    {
        if targets.is_empty() {
            return FanOutReport::default();
        }

        let known = targets
            .iter()
            .filter(|id| self.dispatcher.contains(id.as_ref()))
            .count();
        let reservation = self.outstanding.reserve(self.capacity.as_ref(), known);
        let mut remaining = reservation.granted();

        let mut admitted: Vec<(usize, &str)> = Vec::with_capacity(targets.len());
        let mut slots: Vec<Option<ReportEntry>> = vec![None; targets.len()];
        for (index, id) in targets.iter().enumerate() {
            let id = id.as_ref();
            if self.dispatcher.contains(id) {
                if remaining == 0 {
                    slots[index] = Some(self.capacity_rejection(id, &facts));
                    continue;
                }
                remaining -= 1;
            }
            admitted.push((index, id));
        }

        let ids: Vec<&str> = admitted.iter().map(|&(_, id)| id).collect();
        let report = self
            .dispatcher
            .fan_out_with(&ids, facts, make_work, |_| {})
            .await;
        drop(reservation);

        for ((index, _), entry) in admitted.into_iter().zip(report.into_entries()) {
            slots[index] = Some(entry);
        }
        FanOutReport::new(slots.into_iter().flatten().collect())
    }

    fn capacity_rejection(&self, backend_id: &str, facts: &PayloadFacts) -> ReportEntry {
        warn!(
            backend = backend_id,
            outstanding = self.outstanding(),
            "Broker at capacity; rejecting target"
        );
        let metrics = BrokerMetrics::get();
        metrics.record_capacity_rejection(backend_id);

        let failure = BackendFailure::tagged(
            FailureKind::Quota,
            format!(
                "Broker capacity exhausted: {} backend calls already outstanding",
                self.outstanding()
            ),
        );
        let context = self.dispatcher.context_for(backend_id, facts);
        let entry = ReportEntry::rejected(&failure, &context, Duration::ZERO);
        metrics.record_entry(&entry);
        entry
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("backends", &self.dispatcher.backend_ids())
            .field("budgeter", &self.budgeter)
            .field("capacity", &self.capacity)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
