//! Parallel fan-out and request brokering across AI-completion backends.
//!
//! - [`Dispatcher`] runs one unit of work per backend through that backend's
//!   throttle gate and merges the outcomes into a [`FanOutReport`].
//! - [`Broker`] adds payload budgeting, adapter lookup and broker-wide
//!   backpressure on top of the dispatcher.
//! - [`BackendRegistry`] collects [`BackendFactory`]s that are probed before
//!   their backend joins a broker.
//!
//! A failing backend never fails the fan-out: it becomes a `rejected` entry
//! carrying a classified failure and remediation hints.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod broker;
mod capacity;
mod dispatcher;
pub mod metrics;
mod noop;
mod report;

pub use backend::{Availability, Backend, BackendFactory, BackendRegistry};
pub use broker::{Broker, BrokerRequest, BrokerResponse, BrokerSettings, FitSummary};
pub use capacity::{CapacityPolicy, MaxOutstanding, Unbounded};
pub use dispatcher::{Dispatcher, PayloadFacts};
pub use noop::{NoopBackend, NoopFactory};
pub use report::{EntryOutcome, FanOutReport, ReportEntry};
