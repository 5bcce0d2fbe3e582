//! Command handlers.

use super::commands::OutputFormat;
use super::payload::load_payload;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use switchboard::{
    BackendDescriptor, BackendRegistry, Broker, BrokerError, BrokerErrorKind, BrokerRequest,
    BackendFailure, ClassifyContext, ContextBudgeter, FitSummary, JsonError, NoopFactory,
    SwitchboardConfig, classify,
};
use tracing::info;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn print_json<T: Serialize>(value: &T) -> CliResult {
    let json = serde_json::to_string_pretty(value).map_err(JsonError::from)?;
    println!("{}", json);
    Ok(())
}

/// Enabled descriptors, restricted to `wanted` when it is not empty.
fn select_descriptors(
    config: &SwitchboardConfig,
    wanted: &[String],
) -> Result<Vec<BackendDescriptor>, Box<dyn std::error::Error>> {
    let descriptors = config.descriptors()?;
    if wanted.is_empty() {
        return Ok(descriptors);
    }

    let mut selected = Vec::with_capacity(wanted.len());
    for id in wanted {
        let descriptor = descriptors
            .iter()
            .find(|descriptor| descriptor.id() == id)
            .ok_or_else(|| BrokerError::new(BrokerErrorKind::UnknownBackend(id.clone())))?;
        selected.push(descriptor.clone());
    }
    Ok(selected)
}

#[derive(Debug, Serialize)]
struct BackendRow<'a> {
    id: &'a str,
    enabled: bool,
    max_concurrent: usize,
    requests_per_window: u32,
    window_secs: u64,
    timeout_secs: u64,
    max_context_units: u64,
}

/// Print every configured backend, disabled ones included.
pub fn list_backends(config: &SwitchboardConfig, format: OutputFormat) -> CliResult {
    let mut rows: Vec<BackendRow<'_>> = config
        .backends
        .iter()
        .map(|(id, backend)| BackendRow {
            id,
            enabled: backend.enabled,
            max_concurrent: backend.max_concurrent,
            requests_per_window: backend.requests_per_window,
            window_secs: backend.window_secs,
            timeout_secs: backend.timeout_secs,
            max_context_units: backend.max_context_units,
        })
        .collect();
    rows.sort_by(|a, b| a.id.cmp(b.id));

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Human => {
            println!(
                "{:<16} {:>8} {:>11} {:>12} {:>9} {:>12}",
                "BACKEND", "ENABLED", "CONCURRENT", "PER WINDOW", "TIMEOUT", "CONTEXT"
            );
            println!("{:-<73}", "");
            for row in &rows {
                let per_window = if row.requests_per_window == 0 {
                    "unlimited".to_string()
                } else {
                    format!("{}/{}s", row.requests_per_window, row.window_secs)
                };
                println!(
                    "{:<16} {:>8} {:>11} {:>12} {:>8}s {:>12}",
                    row.id,
                    if row.enabled { "yes" } else { "no" },
                    row.max_concurrent,
                    per_window,
                    row.timeout_secs,
                    row.max_context_units
                );
            }
            println!("Total: {} backends", rows.len());
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct EstimateReport {
    blocks: usize,
    chars: usize,
    estimated_units: u64,
    backends: Vec<BackendFit>,
}

#[derive(Debug, Serialize)]
struct BackendFit {
    backend: String,
    #[serde(flatten)]
    fit: FitSummary,
}

/// Size the files and show how the payload fits each backend.
pub async fn run_estimate(
    config: &SwitchboardConfig,
    files: &[PathBuf],
    backends: &[String],
    format: OutputFormat,
) -> CliResult {
    let payload = load_payload(files).await?;
    let budgeter = ContextBudgeter::new(config.estimator());
    let descriptors = select_descriptors(config, backends)?;

    let report = EstimateReport {
        blocks: payload.len(),
        chars: payload.total_chars(),
        estimated_units: budgeter.estimator().estimate_set(&payload),
        backends: descriptors
            .iter()
            .map(|descriptor| BackendFit {
                backend: descriptor.id().clone(),
                fit: FitSummary::from(&budgeter.fit(&payload, *descriptor.max_context_units())),
            })
            .collect(),
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Human => {
            println!(
                "Payload: {} blocks, {} chars, ~{} units",
                report.blocks, report.chars, report.estimated_units
            );
            for row in &report.backends {
                let fit = &row.fit;
                let verdict = if *fit.over_budget() {
                    "over budget even after trimming".to_string()
                } else if *fit.trimmed() {
                    format!("trimmed: dropped {}", fit.dropped().join(", "))
                } else {
                    "fits".to_string()
                };
                println!(
                    "{:<16} {:>10} / {:<10} units  {}",
                    row.backend,
                    fit.estimated_cost(),
                    fit.budget(),
                    verdict
                );
            }
        }
    }
    Ok(())
}

/// Classify a raw error message as if `backend` had returned it.
pub fn run_classify(
    config: &SwitchboardConfig,
    message: &str,
    backend: Option<&str>,
    files: Option<usize>,
    format: OutputFormat,
) -> CliResult {
    let backend_id = backend.unwrap_or("unknown");
    let mut context = ClassifyContext::for_backend(backend_id);
    if let Some(configured) = config.backend(backend_id) {
        context = context
            .with_max_units(configured.max_context_units)
            .with_timeout(Duration::from_secs(configured.timeout_secs));
    }
    if let Some(count) = files {
        context = context.with_file_count(count);
    }

    let classified = classify(&BackendFailure::new(message), &context);
    match format {
        OutputFormat::Json => print_json(&classified)?,
        OutputFormat::Human => {
            println!(
                "Kind: {}{}",
                classified.kind(),
                if *classified.retryable() {
                    " (retryable)"
                } else {
                    ""
                }
            );
            println!("Backend: {}", classified.backend_id());
            println!("Suggestions:");
            for hint in classified.remediation() {
                println!("  - {}", hint);
            }
        }
    }
    Ok(())
}

/// Fan the files out to no-op backends shaped like the configured ones.
pub async fn run_dry_run(
    config: &SwitchboardConfig,
    files: &[PathBuf],
    backends: &[String],
    latency: Duration,
    format: OutputFormat,
) -> CliResult {
    let payload = load_payload(files).await?;
    let descriptors = select_descriptors(config, backends)?;

    let mut registry = BackendRegistry::new();
    for descriptor in &descriptors {
        registry.register(Arc::new(
            NoopFactory::new(descriptor.id().clone()).with_latency(latency),
        ));
    }
    let broker = Broker::from_registry(&registry, config)?;

    let targets: Vec<&String> = descriptors.iter().map(BackendDescriptor::id).collect();
    info!(backends = targets.len(), blocks = payload.len(), "Starting dry run");
    let request = BrokerRequest::new(payload).with_targets(targets);
    let response = broker.execute(&request).await;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Human => {
            let fit = response.fit();
            println!(
                "Sent {} blocks, ~{} of {} units{}",
                fit.blocks_sent(),
                fit.estimated_cost(),
                fit.budget(),
                if fit.dropped().is_empty() {
                    String::new()
                } else {
                    format!(" (dropped {})", fit.dropped().join(", "))
                }
            );
            println!();
            println!("{}", response.report());
        }
    }
    Ok(())
}
