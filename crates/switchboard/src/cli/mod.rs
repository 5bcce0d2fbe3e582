//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the switchboard binary.

mod commands;
mod handlers;
mod payload;

pub use commands::{Cli, Commands};
pub use handlers::{list_backends, run_classify, run_dry_run, run_estimate};
