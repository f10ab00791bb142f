//! Worker startup and request loop
//!
//! Startup imports the runtime, applies the thread override and loads the
//! model, announcing the result on the protocol channel. The loop then
//! answers requests strictly one at a time, in input order.

use crate::protocol::{Emitter, Request, RequestError, Response, WorkerMessage};
use crate::runtime::{Runtime, Task, TranscribeOptions, Transcriber};
use scribeloop_common::{LatencyTimer, Result, ScribeLoopError, WorkerConfig, METRICS};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tracing::{debug, info, warn};

/// Import the runtime and load the configured model
///
/// On failure a fatal message has already been emitted when this returns.
/// Failing to apply the thread override is ignored.
pub async fn start<R, F, W>(config: &WorkerConfig, import: F, out: &mut Emitter<W>) -> Result<R::Model>
where
    R: Runtime,
    F: FnOnce(&WorkerConfig) -> Result<R>,
    W: AsyncWrite + Unpin,
{
    let mut runtime = match import(config) {
        Ok(runtime) => runtime,
        Err(e) => {
            let error = format!("Failed to import whisper runtime: {}", e);
            out.emit(&WorkerMessage::Fatal { error }).await?;
            return Err(e);
        }
    };

    if let Some(threads) = config.threads_override() {
        let _ = runtime.set_num_threads(threads);
    }

    let path = config.model_path();
    let loaded = METRICS
        .worker
        .model_load_duration
        .time(|| runtime.load_model(&config.model, &path));

    let model = match loaded {
        Ok(model) => model,
        Err(e) => {
            let error = format!("Failed to load model '{}': {}", config.model, e);
            out.emit(&WorkerMessage::Fatal { error }).await?;
            return Err(e);
        }
    };

    METRICS.worker.model_loaded.set(1);
    info!("Model '{}' ready", config.model);

    out.emit(&WorkerMessage::Ready {
        model: config.model.clone(),
    })
    .await?;

    Ok(model)
}

/// Counts reported when the input stream ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub handled: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Request loop around a loaded model
pub struct Worker<T: Transcriber> {
    model: Arc<T>,
    config: WorkerConfig,
}

impl<T: Transcriber> Worker<T> {
    pub fn new(model: T, config: WorkerConfig) -> Self {
        Self {
            model: Arc::new(model),
            config,
        }
    }

    /// Answer requests from `reader` until end of input
    ///
    /// Only a failure to write a response ends the loop early.
    pub async fn run<R, W>(&self, mut reader: R, out: &mut Emitter<W>) -> Result<LoopSummary>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("Starting request loop");

        let mut summary = LoopSummary::default();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            let response = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => {
                    summary.skipped += 1;
                    METRICS.worker.blank_lines.inc();
                    continue;
                }
                Ok(line) => self.handle_line(line.trim()).await,
                Err(e) => {
                    METRICS.worker.requests_total.inc();
                    METRICS.worker.requests_failed.inc();
                    warn!("Skipping undecodable input line: {}", e);
                    Response::error(Value::Null, RequestError::from(e).to_string())
                }
            };

            summary.handled += 1;
            if response.is_error() {
                summary.failed += 1;
            } else {
                summary.succeeded += 1;
            }

            out.emit(&response).await?;
        }

        info!(
            "Input closed: {} handled, {} succeeded, {} failed, {} blank",
            summary.handled, summary.succeeded, summary.failed, summary.skipped
        );
        Ok(summary)
    }

    /// Turn one non-blank line into its response
    pub async fn handle_line(&self, line: &str) -> Response {
        let start = Instant::now();
        METRICS.worker.requests_total.inc();

        let response = match Request::parse(line) {
            Ok(request) => {
                let id = request.id.clone();
                match self.transcribe(request).await {
                    Ok(text) => Response::text(id, text),
                    Err(e) => Response::error(id, e.to_string()),
                }
            }
            Err((id, e)) => Response::error(id, e.to_string()),
        };

        METRICS.worker.request_duration.observe(start.elapsed().as_secs_f64());
        if response.is_error() {
            METRICS.worker.requests_failed.inc();
            warn!("Request {} failed: {:?}", response.id, response.outcome);
        } else {
            METRICS.worker.requests_success.inc();
            debug!("Request {} done in {:?}", response.id, start.elapsed());
        }

        response
    }

    async fn transcribe(&self, request: Request) -> std::result::Result<String, RequestError> {
        let options = self.resolve_options(&request)?;
        let audio_path = PathBuf::from(request.audio_path);

        debug!(
            "Transcribing {} (task={}, language={:?})",
            audio_path.display(),
            options.task,
            options.language
        );

        // Decoding blocks; run it off the reactor but wait before the next line.
        let model = Arc::clone(&self.model);
        let transcription = tokio::task::spawn_blocking(move || model.transcribe(&audio_path, &options))
            .await
            .map_err(|e| ScribeLoopError::internal(format!("inference task failed: {}", e)))??;

        Ok(transcription.into_text())
    }

    /// Per-request overrides fall back to the startup defaults
    fn resolve_options(&self, request: &Request) -> Result<TranscribeOptions> {
        let task: Task = request.task.as_deref().unwrap_or(&self.config.task).parse()?;
        let language = request
            .language
            .clone()
            .or_else(|| self.config.language.clone());
        Ok(TranscribeOptions::new(task, language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Transcription;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Mutex;

    /// Records every call and answers from a script keyed by audio path
    #[derive(Default)]
    struct MockModel {
        calls: Arc<Mutex<Vec<(PathBuf, TranscribeOptions)>>>,
    }

    impl Transcriber for MockModel {
        fn transcribe(&self, audio_path: &Path, options: &TranscribeOptions) -> Result<Transcription> {
            self.calls
                .lock()
                .unwrap()
                .push((audio_path.to_path_buf(), options.clone()));

            match audio_path.to_str().unwrap() {
                "/tmp/a.wav" => Ok(Transcription {
                    text: Some(" hello world ".to_string()),
                }),
                "/tmp/silence.wav" => Ok(Transcription { text: None }),
                "/tmp/broken.wav" => Err(ScribeLoopError::inference("decoder exploded")),
                other => Ok(Transcription {
                    text: Some(format!("transcript of {}", other)),
                }),
            }
        }
    }

    struct MockRuntime {
        threads: Arc<Mutex<Option<usize>>>,
        reject_threads: bool,
        fail_load: bool,
    }

    impl MockRuntime {
        fn new() -> Self {
            Self {
                threads: Arc::new(Mutex::new(None)),
                reject_threads: false,
                fail_load: false,
            }
        }
    }

    impl Runtime for MockRuntime {
        type Model = MockModel;

        fn set_num_threads(&mut self, threads: usize) -> Result<()> {
            if self.reject_threads {
                return Err(ScribeLoopError::internal("threads locked"));
            }
            *self.threads.lock().unwrap() = Some(threads);
            Ok(())
        }

        fn load_model(&self, _name: &str, _path: &Path) -> Result<MockModel> {
            if self.fail_load {
                return Err(ScribeLoopError::model("no such weights"));
            }
            Ok(MockModel::default())
        }
    }

    fn output_lines(out: Emitter<Vec<u8>>) -> Vec<Value> {
        String::from_utf8(out.into_inner())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    async fn run_lines(config: WorkerConfig, input: &str) -> (Vec<Value>, Vec<(PathBuf, TranscribeOptions)>, LoopSummary) {
        let model = MockModel::default();
        let calls = Arc::clone(&model.calls);
        let worker = Worker::new(model, config);
        let mut out = Emitter::new(Vec::new());
        let summary = worker.run(input.as_bytes(), &mut out).await.unwrap();
        let calls = calls.lock().unwrap().clone();
        (output_lines(out), calls, summary)
    }

    #[tokio::test]
    async fn test_success_trims_text() {
        let (lines, _, summary) =
            run_lines(WorkerConfig::default(), "{\"id\": 1, \"audio_path\": \"/tmp/a.wav\"}\n").await;
        assert_eq!(lines, vec![json!({"id": 1, "text": "hello world"})]);
        assert_eq!(summary.succeeded, 1);
    }

    #[tokio::test]
    async fn test_missing_audio_path_skips_inference() {
        let (lines, calls, _) =
            run_lines(WorkerConfig::default(), "{\"id\": 2, \"audio_path\": \"\"}\n").await;
        assert_eq!(lines, vec![json!({"id": 2, "error": "audio_path is required"})]);
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn test_blank_lines_produce_nothing() {
        let (lines, calls, summary) = run_lines(WorkerConfig::default(), "\n   \n\t\n").await;
        assert!(lines.is_empty());
        assert!(calls.is_empty());
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.handled, 0);
    }

    #[tokio::test]
    async fn test_malformed_line_has_null_id() {
        let (lines, _, summary) = run_lines(WorkerConfig::default(), "not json\n").await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["id"], Value::Null);
        assert!(!lines[0]["error"].as_str().unwrap().is_empty());
        assert!(lines[0].get("text").is_none());
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_responses_keep_request_order() {
        let input = (0..5)
            .map(|i| format!("{{\"id\": {}, \"audio_path\": \"/tmp/{}.wav\"}}\n", i, i))
            .collect::<String>();
        let (lines, _, _) = run_lines(WorkerConfig::default(), &input).await;

        let ids: Vec<Value> = lines.iter().map(|l| l["id"].clone()).collect();
        assert_eq!(ids, (0..5).map(|i| json!(i)).collect::<Vec<_>>());
        assert_eq!(lines[3]["text"], json!("transcript of /tmp/3.wav"));
    }

    #[tokio::test]
    async fn test_language_override_is_per_request() {
        let config = WorkerConfig {
            language: Some("en".to_string()),
            ..WorkerConfig::default()
        };
        let input = concat!(
            "{\"id\": 1, \"audio_path\": \"/tmp/x.wav\", \"language\": \"de\"}\n",
            "{\"id\": 2, \"audio_path\": \"/tmp/y.wav\"}\n",
        );
        let (_, calls, _) = run_lines(config, input).await;

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1.language.as_deref(), Some("de"));
        assert_eq!(calls[1].1.language.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_no_default_language_means_auto_detect() {
        let (_, calls, _) =
            run_lines(WorkerConfig::default(), "{\"id\": 1, \"audio_path\": \"/tmp/x.wav\"}\n").await;
        assert_eq!(calls[0].1.language, None);
        assert_eq!(calls[0].1.task, Task::Transcribe);
        assert_eq!(calls[0].1.temperature, 0.0);
        assert!(!calls[0].1.condition_on_previous_text);
    }

    #[tokio::test]
    async fn test_task_override_and_unknown_task() {
        let input = concat!(
            "{\"id\": \"t\", \"audio_path\": \"/tmp/x.wav\", \"task\": \"translate\"}\n",
            "{\"id\": \"u\", \"audio_path\": \"/tmp/x.wav\", \"task\": \"summarize\"}\n",
        );
        let (lines, calls, _) = run_lines(WorkerConfig::default(), input).await;

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.task, Task::Translate);
        assert_eq!(lines[1]["id"], json!("u"));
        assert!(lines[1]["error"].as_str().unwrap().contains("summarize"));
    }

    #[tokio::test]
    async fn test_inference_error_is_recoverable() {
        let input = concat!(
            "{\"id\": 1, \"audio_path\": \"/tmp/broken.wav\"}\n",
            "{\"id\": 2, \"audio_path\": \"/tmp/silence.wav\"}\n",
        );
        let (lines, _, summary) = run_lines(WorkerConfig::default(), input).await;

        assert_eq!(lines[0], json!({"id": 1, "error": "Inference error: decoder exploded"}));
        assert_eq!(lines[1], json!({"id": 2, "text": ""}));
        assert_eq!(summary, LoopSummary { handled: 2, succeeded: 1, failed: 1, skipped: 0 });
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_recoverable() {
        let model = MockModel::default();
        let worker = Worker::new(model, WorkerConfig::default());
        let mut out = Emitter::new(Vec::new());
        let input: &[u8] = b"\xff\xfe\n{\"id\": 9, \"audio_path\": \"/tmp/a.wav\"}";
        worker.run(input, &mut out).await.unwrap();

        let lines = output_lines(out);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], Value::Null);
        assert!(lines[0].get("error").is_some());
        assert_eq!(lines[1], json!({"id": 9, "text": "hello world"}));
    }

    #[tokio::test]
    async fn test_start_emits_ready() {
        let config = WorkerConfig {
            threads: 4,
            ..WorkerConfig::default()
        };
        let runtime = MockRuntime::new();
        let threads = Arc::clone(&runtime.threads);
        let mut out = Emitter::new(Vec::new());

        let model = start(&config, |_| Ok(runtime), &mut out).await;
        assert!(model.is_ok());
        assert_eq!(*threads.lock().unwrap(), Some(4));
        assert_eq!(output_lines(out), vec![json!({"type": "ready", "model": "base"})]);
    }

    #[tokio::test]
    async fn test_start_ignores_thread_override_failure() {
        let config = WorkerConfig {
            threads: 2,
            ..WorkerConfig::default()
        };
        let runtime = MockRuntime {
            reject_threads: true,
            ..MockRuntime::new()
        };
        let mut out = Emitter::new(Vec::new());

        assert!(start(&config, |_| Ok(runtime), &mut out).await.is_ok());
        assert_eq!(output_lines(out)[0]["type"], json!("ready"));
    }

    #[tokio::test]
    async fn test_start_zero_threads_leaves_runtime_alone() {
        let runtime = MockRuntime::new();
        let threads = Arc::clone(&runtime.threads);
        let mut out = Emitter::new(Vec::new());

        start(&WorkerConfig::default(), |_| Ok(runtime), &mut out).await.unwrap();
        assert_eq!(*threads.lock().unwrap(), None);
    }

    #[tokio::test]
    async fn test_start_import_failure_is_fatal() {
        let mut out = Emitter::new(Vec::new());
        let result = start(
            &WorkerConfig::default(),
            |_| Err::<MockRuntime, _>(ScribeLoopError::runtime("libwhisper missing")),
            &mut out,
        )
        .await;

        let err = result.err().unwrap();
        assert!(err.is_fatal());
        let lines = output_lines(out);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["type"], json!("fatal"));
        assert_eq!(
            lines[0]["error"],
            json!("Failed to import whisper runtime: Runtime unavailable: libwhisper missing")
        );
    }

    #[tokio::test]
    async fn test_start_load_failure_names_model() {
        let config = WorkerConfig {
            model: "large-v3".to_string(),
            ..WorkerConfig::default()
        };
        let runtime = MockRuntime {
            fail_load: true,
            ..MockRuntime::new()
        };
        let mut out = Emitter::new(Vec::new());

        assert!(start(&config, |_| Ok(runtime), &mut out).await.is_err());
        let lines = output_lines(out);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["type"], json!("fatal"));
        assert!(lines[0]["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to load model 'large-v3':"));
    }
}
