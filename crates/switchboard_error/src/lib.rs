//! Error types for the Switchboard request broker.
//!
//! This crate provides two families of types:
//!
//! - **Programmer/configuration errors** (`SwitchboardError` and friends), raised
//!   when a broker or gate is constructed from bad input.
//! - **Backend failures** (`BackendFailure`, `FailureKind`, `ClassifiedFailure`),
//!   the raw and classified outcomes of a single backend call. These never abort
//!   a fan-out; they end up as `rejected` report entries.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All constructors use `#[track_caller]` for automatic location capture
//!
//! # Examples
//!
//! ```
//! use switchboard_error::{ConfigError, ConfigErrorKind, SwitchboardResult};
//!
//! fn load() -> SwitchboardResult<()> {
//!     Err(ConfigError::new(ConfigErrorKind::Malformed(
//!         "no backends configured".to_string(),
//!     )))?
//! }
//!
//! assert!(load().is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod broker;
mod builder;
mod classifier;
mod config;
mod error;
mod failure;
mod json;
mod throttle;

pub use broker::{BrokerError, BrokerErrorKind};
pub use builder::{BuilderError, BuilderErrorKind};
pub use classifier::{ClassifyContext, LARGE_FILE_COUNT, classify};
pub use config::{ConfigError, ConfigErrorKind};
pub use error::{SwitchboardError, SwitchboardErrorKind, SwitchboardResult};
pub use failure::{BackendFailure, ClassifiedFailure, FailureKind};
pub use json::JsonError;
pub use throttle::{ThrottleError, ThrottleErrorKind};
