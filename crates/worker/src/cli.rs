//! Command line flags
//!
//! Flags override values from `--config`, which override built-in defaults.

use clap::Parser;
use scribeloop_common::{Result, WorkerConfig};
use std::path::PathBuf;

/// Persistent speech-to-text worker speaking line-delimited JSON on stdio
#[derive(Debug, Parser)]
#[command(name = "scribeloop-worker", version, about)]
pub struct Args {
    /// Model to load [default: base]
    #[arg(long)]
    pub model: Option<String>,

    /// Default task for requests: transcribe or translate [default: transcribe]
    #[arg(long)]
    pub task: Option<String>,

    /// Default language hint; omit to auto-detect
    #[arg(long)]
    pub language: Option<String>,

    /// Compute thread count, 0 keeps the runtime default [default: 0]
    #[arg(long)]
    pub threads: Option<usize>,

    /// Directory holding ggml-<model>.bin files [default: models]
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Build the worker configuration
    pub fn into_config(self) -> Result<WorkerConfig> {
        let mut config = match &self.config {
            Some(path) => WorkerConfig::from_file(path)?,
            None => WorkerConfig::default(),
        };

        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(task) = self.task {
            config.task = task;
        }
        if let Some(language) = self.language {
            config.language = Some(language);
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(model_dir) = self.model_dir {
            config.model_dir = model_dir;
        }
        // An empty hint means auto-detect.
        config.language = config.language.filter(|l| !l.trim().is_empty());

        config.validate()?;
        Ok(config)
    }
}
