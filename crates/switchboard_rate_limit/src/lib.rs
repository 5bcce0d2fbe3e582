//! Admission control for Switchboard backends.
//!
//! Each backend gets one [`ThrottleGate`] that bounds how many calls run at
//! once and how many start inside a sliding window. Limits come from
//! [`SwitchboardConfig`] and can be adjusted at runtime, for example from
//! provider headers via [`HeaderRateLimitDetector`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod detector;
mod gate;

pub use config::{BackendConfig, CapacityConfig, SwitchboardConfig};
pub use detector::{HEADER_LIMIT_WINDOW, HeaderRateLimitDetector};
pub use gate::{Admission, GateLimits, GateSnapshot, GateUpdate, ThrottleGate};
