//! Metrics for broker fan-outs.
//!
//! Instruments come from the OpenTelemetry global meter and are no-ops until
//! a meter provider is installed.

use crate::ReportEntry;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram, Meter},
};
use std::sync::OnceLock;

static METRICS: OnceLock<BrokerMetrics> = OnceLock::new();

/// Metrics for broker activity, labelled by backend.
#[derive(Clone)]
pub struct BrokerMetrics {
    /// Meter handle kept alive for metric instruments
    _meter: Meter,
    /// Fan-outs started
    pub fan_outs: Counter<u64>,
    /// Settled report entries
    pub entries: Counter<u64>,
    /// Time from fan-out start until an entry settled
    pub entry_duration: Histogram<f64>,
    /// Targets refused by the broker's capacity policy
    pub capacity_rejections: Counter<u64>,
}

impl BrokerMetrics {
    fn init() -> Self {
        let meter = global::meter("switchboard_broker");

        Self {
            _meter: meter.clone(),
            fan_outs: meter
                .u64_counter("broker.fan_outs")
                .with_description("Fan-outs started")
                .build(),
            entries: meter
                .u64_counter("broker.entries")
                .with_description("Settled report entries by backend and status")
                .build(),
            entry_duration: meter
                .f64_histogram("broker.entry.duration")
                .with_unit("seconds")
                .with_description("Time until a backend's entry settled")
                .build(),
            capacity_rejections: meter
                .u64_counter("broker.capacity_rejections")
                .with_description("Targets refused by the capacity policy")
                .build(),
        }
    }

    /// Get the global broker metrics instance.
    pub fn get() -> &'static Self {
        METRICS.get_or_init(Self::init)
    }

    /// Record the start of a fan-out over `targets` backends.
    pub fn record_fan_out(&self, targets: usize) {
        self.fan_outs
            .add(1, &[KeyValue::new("targets", targets as i64)]);
    }

    /// Record one settled entry.
    pub fn record_entry(&self, entry: &ReportEntry) {
        let mut labels = vec![
            KeyValue::new("backend", entry.backend_id().clone()),
            KeyValue::new("status", entry.status()),
        ];
        if let Some(failure) = entry.failure() {
            labels.push(KeyValue::new("kind", failure.kind().as_ref().to_string()));
        }
        self.entries.add(1, &labels);
        self.entry_duration
            .record(*entry.elapsed_ms() as f64 / 1000.0, &labels);
    }

    /// Record a target refused for capacity.
    pub fn record_capacity_rejection(&self, backend_id: &str) {
        self.capacity_rejections
            .add(1, &[KeyValue::new("backend", backend_id.to_string())]);
    }
}

impl Default for BrokerMetrics {
    fn default() -> Self {
        Self::get().clone()
    }
}
