//! Switchboard CLI binary.
//!
//! This binary provides command-line access to Switchboard's functionality:
//! - Inspect the resolved backend table
//! - Estimate how a set of files fits each backend's context budget
//! - Classify raw backend error messages
//! - Dry-run a full fan-out against no-op backends

use clap::Parser;
use std::time::Duration;
use switchboard::{ObservabilityConfig, SwitchboardConfig, init_observability_with_config};

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use cli::{Cli, Commands, list_backends, run_classify, run_dry_run, run_estimate};

    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize tracing
    let mut observability = ObservabilityConfig::new("switchboard").with_json_logs(cli.json_logs);
    if cli.verbose {
        observability = observability.with_log_level("debug");
    }
    init_observability_with_config(observability)?;

    let config = match &cli.config {
        Some(path) => SwitchboardConfig::from_file(path)?,
        None => SwitchboardConfig::load()?,
    };

    // Execute the requested command
    match cli.command {
        Commands::Backends => list_backends(&config, cli.format)?,

        Commands::Estimate { files, backends } => {
            run_estimate(&config, &files, &backends, cli.format).await?;
        }

        Commands::Classify {
            message,
            backend,
            files,
        } => run_classify(&config, &message, backend.as_deref(), files, cli.format)?,

        Commands::DryRun {
            files,
            backends,
            latency_ms,
        } => {
            run_dry_run(
                &config,
                &files,
                &backends,
                Duration::from_millis(latency_ms),
                cli.format,
            )
            .await?;
        }
    }

    switchboard::shutdown_observability();
    Ok(())
}
