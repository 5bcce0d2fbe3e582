//! Switchboard - throttled parallel fan-out for AI completion requests
//!
//! Switchboard sends one payload to several AI-completion backends at once.
//! Each backend sits behind its own admission gate that enforces a
//! concurrency cap, a sliding request window and a per-call timeout. The
//! payload is trimmed to the tightest context budget before dispatch, and
//! every backend's result lands in a single ordered report. A failure is
//! classified into a small taxonomy with remediation hints and never affects
//! the other backends.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use switchboard::{
//!     BackendRegistry, Broker, BrokerRequest, ContentBlock, NoopFactory, PayloadSet,
//!     SwitchboardConfig,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = BackendRegistry::new()
//!     .with(Arc::new(NoopFactory::new("alpha")))
//!     .with(Arc::new(NoopFactory::new("beta")));
//! let broker = Broker::from_registry(&registry, &SwitchboardConfig::default()).unwrap();
//!
//! let payload = PayloadSet::new().with_block(ContentBlock::new("main.rs", "fn main() {}"));
//! let response = broker.execute(&BrokerRequest::new(payload)).await;
//!
//! assert_eq!(response.report().fulfilled_count(), 2);
//! println!("{}", response.report());
//! # });
//! ```
//!
//! # Architecture
//!
//! - `switchboard_error` - Error types, failure taxonomy and classifier
//! - `switchboard_core` - Descriptors, payloads, estimator and budgeter
//! - `switchboard_rate_limit` - Throttle gates, configuration and header detection
//! - `switchboard_broker` - Dispatcher, reports, backend plugins and the broker
//!
//! This crate re-exports everything for convenience and provides the
//! `switchboard` command-line tool.
//!
//! # Cargo Features
//!
//! - `otel` - Export spans through an OpenTelemetry stdout exporter

pub use switchboard_broker::*;
pub use switchboard_core::*;
pub use switchboard_error::*;
pub use switchboard_rate_limit::*;

pub mod observability;

pub use observability::{
    ObservabilityConfig, init_observability, init_observability_with_config,
    shutdown_observability,
};
