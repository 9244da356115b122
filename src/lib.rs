pub mod analyzers;
pub mod apis;
pub mod billing;
pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod http_client;
pub mod jsonld;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod robots;
pub mod store;

use anyhow::{Context, Result};
use cli::Cli;
use colored::*;
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use billing::InMemoryBilling;
use models::JobStatus;
use orchestrator::{Orchestrator, Services};
use report::ReportView;
use store::{InMemoryJobStore, JobStore};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

fn load_config(args: &Cli) -> Result<Config> {
    let config = match &args.config {
        Some(path) => Config::from_file(Path::new(path))?,
        None => Config::from_default_paths()?.unwrap_or_default(),
    };
    Ok(config.with_process_env())
}

/// Logs to stderr so JSON on stdout stays clean; `RUST_LOG` wins over `verbose`
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "aeocheck=debug" } else { "aeocheck=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let config = load_config(&args)?;
    let args = config.merge_with_cli(&args);
    init_tracing(args.verbose);
    tracing::debug!(url = %args.url, output = %args.output, "Configuration loaded");
    let settings = config.settings(&args);
    let json_output = args.output == "json";

    if !json_output {
        println!("{}", "aeocheck - AI Visibility Report".bright_cyan().bold());
        println!("{}", "=".repeat(50).bright_blue());
        println!();
        println!("{} {}", "Analyzing:".bright_white().bold(), args.url);
        println!();
    }

    let services = Services::from_settings(&settings).context("Failed to build HTTP clients")?;
    let configured = services.gateway.configured_providers();
    if configured.is_empty() {
        tracing::warn!("No LLM provider keys configured; AI presence and competitor scores will be 0");
    } else {
        tracing::info!(providers = ?configured, "LLM providers configured");
    }

    let store = Arc::new(InMemoryJobStore::new());
    let billing = Arc::new(InMemoryBilling::new());
    let orchestrator = Arc::new(Orchestrator::new(services, store.clone(), billing));

    let job_id = orchestrator.submit(&args.url, &args.owner).await?;

    let progress_bar = if args.no_progress || json_output {
        None
    } else {
        let pb = ProgressBar::new(100);
        pb.set_style(ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}")?);
        Some(pb)
    };

    let status = loop {
        let status = orchestrator.get_status(&job_id, &args.owner).await?;
        if let Some(pb) = &progress_bar {
            pb.set_position((status.progress * 100.0).round() as u64);
            pb.set_message(status.status.to_string());
        }
        if status.status.is_terminal() {
            break status;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };
    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }

    if status.status == JobStatus::Failed {
        let job = store.get_job(&job_id).await?;
        let message = status.error.unwrap_or_default();
        match job.error_details {
            Some(details) => anyhow::bail!("{}\n  {} {}", message, "Details:".dimmed(), details),
            None => anyhow::bail!("{}", message),
        }
    }

    let stored = store
        .get_report(&args.owner, &job_id)
        .await?
        .context("Job completed without a report")?;
    let view = ReportView::for_viewer(&stored, !args.redacted);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&view.report)?);
    } else {
        report::print_text_report(&view.report);
    }

    if let Some(filename) = &args.save {
        report::save_json_report(&view.report, filename)?;
    }

    Ok(())
}
