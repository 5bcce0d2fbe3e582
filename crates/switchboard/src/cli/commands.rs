//! CLI command definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Switchboard - throttled parallel fan-out across AI completion backends
#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(about = "Throttled parallel fan-out across AI completion backends", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Configuration file to use instead of the default search path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the resolved backend table
    Backends,

    /// Estimate payload cost and show how it fits each backend
    Estimate {
        /// Files to send, one content block each; earlier files are kept longest
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Restrict to these backends (repeatable)
        #[arg(long = "backend")]
        backends: Vec<String>,
    },

    /// Classify a raw backend error message
    Classify {
        /// The error message to classify
        message: String,

        /// Backend the error came from
        #[arg(long)]
        backend: Option<String>,

        /// Number of files that were sent
        #[arg(long)]
        files: Option<usize>,
    },

    /// Run a full fan-out against no-op backends and print the report
    DryRun {
        /// Files to send, one content block each; earlier files are kept longest
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Restrict to these backends (repeatable)
        #[arg(long = "backend")]
        backends: Vec<String>,

        /// Simulated latency of every backend in milliseconds
        #[arg(long, default_value = "0")]
        latency_ms: u64,
    },
}

/// Output format options
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dry_run() {
        let cli = Cli::try_parse_from([
            "switchboard",
            "dry-run",
            "a.rs",
            "b.rs",
            "--backend",
            "gemini",
            "--backend",
            "openai",
            "--latency-ms",
            "250",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::DryRun {
                files,
                backends,
                latency_ms,
            } => {
                assert_eq!(files, vec![PathBuf::from("a.rs"), PathBuf::from("b.rs")]);
                assert_eq!(backends, vec!["gemini", "openai"]);
                assert_eq!(latency_ms, 250);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "switchboard",
            "backends",
            "--verbose",
            "--json-logs",
            "--config",
            "custom.toml",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert!(cli.json_logs);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert_eq!(cli.format, OutputFormat::Human);
    }

    #[test]
    fn test_estimate_requires_files() {
        assert!(Cli::try_parse_from(["switchboard", "estimate"]).is_err());
    }

    #[test]
    fn test_parse_classify() {
        let cli = Cli::try_parse_from([
            "switchboard",
            "classify",
            "HTTP 429 Too Many Requests",
            "--backend",
            "openai",
            "--files",
            "12",
        ])
        .unwrap();

        match cli.command {
            Commands::Classify {
                message,
                backend,
                files,
            } => {
                assert_eq!(message, "HTTP 429 Too Many Requests");
                assert_eq!(backend.as_deref(), Some("openai"));
                assert_eq!(files, Some(12));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
