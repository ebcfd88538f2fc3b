//! Impact Card CLI: binary entrypoint
//! Runs one pipeline for a competitor and prints the card as JSON.
//!
//! Usage: `impact-pipeline <competitor> [keywords...]`

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use impact_pipeline::progress::{LogTransport, ProgressEmitter};
use impact_pipeline::{ImpactPipeline, PipelineConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Room used for stage events when none is configured; the CLI only logs them.
const CLI_ROOM: &str = "cli";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("impact_pipeline=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

async fn run(competitor: String, keywords: Vec<String>) -> anyhow::Result<()> {
    let cfg = PipelineConfig::load().context("loading pipeline config")?;
    let room = cfg.progress.room.clone().unwrap_or_else(|| CLI_ROOM.to_string());

    let pipeline = ImpactPipeline::from_config(&cfg)?
        .with_progress(ProgressEmitter::new(Arc::new(LogTransport), Some(room)));

    let outcome = pipeline.generate(&competitor, &keywords).await;
    // Persist call records even when the run failed.
    pipeline.flush_logs().await;

    let card = outcome?;
    println!("{}", serde_json::to_string_pretty(&card)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let mut args = std::env::args().skip(1);
    let Some(competitor) = args.next().filter(|c| !c.trim().is_empty()) else {
        eprintln!("usage: impact-pipeline <competitor> [keywords...]");
        return ExitCode::from(2);
    };
    let keywords: Vec<String> = args.collect();

    match run(competitor, keywords).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "impact card run failed");
            ExitCode::FAILURE
        }
    }
}
