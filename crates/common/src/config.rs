//! Configuration structures for ScribeLoop
//!
//! The worker is configured from built-in defaults, an optional YAML file and
//! command line flags, in increasing order of precedence. The merged
//! configuration is immutable once the request loop starts.

use crate::error::{Result, ScribeLoopError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Worker startup configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name of the model to load (e.g. "base", "small.en") or a path to weights
    #[serde(default = "default_model")]
    pub model: String,

    /// Default inference task for requests that do not name one
    #[serde(default = "default_task")]
    pub task: String,

    /// Default language hint; absent means auto-detect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Compute thread count (0 = leave the runtime default alone)
    #[serde(default)]
    pub threads: usize,

    /// Directory holding ggml model files
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is unset (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log a Prometheus text dump of the worker metrics at shutdown
    #[serde(default = "default_metrics")]
    pub enable_metrics: bool,
}

/// Default value functions
fn default_model() -> String {
    "base".to_string()
}

fn default_task() -> String {
    "transcribe".to_string()
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics() -> bool {
    true
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            task: default_task(),
            language: None,
            threads: 0,
            model_dir: default_model_dir(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            enable_metrics: default_metrics(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScribeLoopError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: WorkerConfig = serde_yaml::from_str(&content).map_err(|e| {
            ScribeLoopError::config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ScribeLoopError::config("model name must not be empty"));
        }
        if self.task.trim().is_empty() {
            return Err(ScribeLoopError::config("task must not be empty"));
        }
        Ok(())
    }

    /// Thread count to apply, if any
    pub fn threads_override(&self) -> Option<usize> {
        (self.threads > 0).then_some(self.threads)
    }

    /// Resolve the model name to a weights file
    ///
    /// A name that already points at a file is used as-is; anything else is
    /// looked up as `<model_dir>/ggml-<model>.bin`.
    pub fn model_path(&self) -> PathBuf {
        let direct = Path::new(&self.model);
        if direct.is_file() {
            return direct.to_path_buf();
        }
        self.model_dir.join(format!("ggml-{}.bin", self.model))
    }
}
