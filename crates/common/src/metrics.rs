//! Metrics collection for ScribeLoop
//!
//! The worker has no network surface, so metrics are kept in-process and
//! rendered as Prometheus text into the log at shutdown.

use crate::error::Result;
use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics registry for ScribeLoop
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub worker: WorkerMetrics,
}

/// Worker metrics
#[derive(Debug, Clone)]
pub struct WorkerMetrics {
    /// Total number of requests read (blank lines excluded)
    pub requests_total: IntCounter,

    /// Requests answered with a transcript
    pub requests_success: IntCounter,

    /// Requests answered with an error
    pub requests_failed: IntCounter,

    /// Blank input lines skipped
    pub blank_lines: IntCounter,

    /// Request duration histogram
    pub request_duration: Histogram,

    /// Model load duration
    pub model_load_duration: Histogram,

    /// 1 once the model is loaded
    pub model_loaded: IntGauge,
}

lazy_static! {
    /// Global metrics registry instance
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

impl MetricsRegistry {
    /// Create a new metrics registry
    ///
    /// Metric names are fixed, so registration cannot collide.
    pub fn new() -> Self {
        match Self::try_new() {
            Ok(metrics) => metrics,
            Err(e) => panic!("invalid metric definition: {e}"),
        }
    }

    fn try_new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_total = IntCounter::new(
            "transcription_requests_total",
            "Total number of transcription requests",
        )?;

        let requests_success = IntCounter::new(
            "transcription_requests_success_total",
            "Total number of successful transcription requests",
        )?;

        let requests_failed = IntCounter::new(
            "transcription_requests_failed_total",
            "Total number of failed transcription requests",
        )?;

        let blank_lines = IntCounter::new(
            "transcription_blank_lines_total",
            "Blank input lines skipped without a response",
        )?;

        let request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "transcription_request_duration_seconds",
                "Transcription request duration in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;

        let model_load_duration = Histogram::with_opts(
            HistogramOpts::new(
                "model_load_duration_seconds",
                "Model load duration in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;

        let model_loaded = IntGauge::new("model_loaded", "Whether the model is loaded")?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(requests_success.clone()))?;
        registry.register(Box::new(requests_failed.clone()))?;
        registry.register(Box::new(blank_lines.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(model_load_duration.clone()))?;
        registry.register(Box::new(model_loaded.clone()))?;

        let worker = WorkerMetrics {
            requests_total,
            requests_success,
            requests_failed,
            blank_lines,
            request_duration,
            model_load_duration,
            model_loaded,
        };

        Ok(MetricsRegistry { registry, worker })
    }

    /// Gather all metrics as text
    pub fn gather(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper trait for measuring latency
pub trait LatencyTimer {
    /// Observe the duration of a closure
    fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R;
}

impl LatencyTimer for Histogram {
    fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = std::time::Instant::now();
        let result = f();
        self.observe(start.elapsed().as_secs_f64());
        result
    }
}
