//! ScribeLoop Worker - Main Entry Point
//!
//! Loads the speech model, prints a ready line and then answers transcription
//! requests from stdin until it is closed. Exit status is 0 at end of input
//! and 1 when startup fails. Logs go to stderr; stdout carries only protocol
//! lines.

use anyhow::Context;
use clap::Parser;
use scribeloop_common::{WorkerConfig, METRICS};
use scribeloop_worker::{import_runtime, start, Args, Emitter, Worker, WorkerMessage};
use std::process::ExitCode;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let config = args.into_config();

    // Initialize logging
    let level = config
        .as_ref()
        .map(|c| c.observability.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("scribeloop_worker={level},scribeloop_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting ScribeLoop Worker");

    let mut out = Emitter::new(tokio::io::stdout());

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            out.emit(&WorkerMessage::Fatal { error: e.to_string() })
                .await
                .context("failed to write fatal message")?;
            return Ok(ExitCode::from(1));
        }
    };

    info!(
        "Worker configuration loaded: model={}, task={}, language={:?}, threads={}",
        config.model, config.task, config.language, config.threads
    );

    let model = match start(&config, import_runtime, &mut out).await {
        Ok(model) => model,
        Err(e) => {
            error!("Startup failed: {}", e);
            return Ok(ExitCode::from(1));
        }
    };

    let worker = Worker::new(model, config.clone());
    let stdin = BufReader::new(tokio::io::stdin());

    // Ctrl-C keeps its default action; a pending stdin read is not cancellable.
    worker
        .run(stdin, &mut out)
        .await
        .context("failed to write response")?;

    report_metrics(&config);
    info!("ScribeLoop Worker shutdown complete");
    Ok(ExitCode::SUCCESS)
}

fn report_metrics(config: &WorkerConfig) {
    if !config.observability.enable_metrics {
        return;
    }
    match METRICS.gather() {
        Ok(text) => info!("Worker metrics:\n{}", text),
        Err(e) => error!("Failed to gather metrics: {}", e),
    }
}
