//! ScribeLoop common library
//!
//! This crate contains configuration, error and metrics code shared by the
//! worker library and binary.

pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use config::{ObservabilityConfig, WorkerConfig};
pub use error::{Result, ScribeLoopError};
pub use metrics::{LatencyTimer, MetricsRegistry, METRICS};
