//! Core data types for the Switchboard request broker.
//!
//! This crate holds the pieces every other Switchboard crate agrees on:
//! backend descriptors, payload sets, the token estimator and context
//! budgeter, and the unit-of-work / outcome pair the dispatcher moves around.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod budgeter;
mod descriptor;
mod estimator;
mod payload;
mod work;

pub use budgeter::{ContextBudgeter, FittedPayload};
pub use descriptor::{
    BackendDescriptor, BackendDescriptorBuilder, DEFAULT_MAX_CONTEXT_UNITS, DEFAULT_TIMEOUT,
    DEFAULT_WINDOW,
};
pub use estimator::TokenEstimator;
pub use payload::{ContentBlock, PayloadSet};
pub use work::{Outcome, UnitOfWork, WorkFuture};
