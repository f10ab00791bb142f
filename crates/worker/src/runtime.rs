//! Inference runtime seam
//!
//! The request loop only talks to a [`Transcriber`]; the [`Runtime`] that
//! produced it is used once at startup and then dropped. The Whisper backend
//! lives behind the `whisper` cargo feature.

use scribeloop_common::{Result, ScribeLoopError, WorkerConfig};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Inference mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Transcribe in the spoken language
    Transcribe,
    /// Translate speech to English
    Translate,
}

impl FromStr for Task {
    type Err = ScribeLoopError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "transcribe" => Ok(Task::Transcribe),
            "translate" => Ok(Task::Translate),
            other => Err(ScribeLoopError::invalid_input(format!(
                "unsupported task '{}' (expected 'transcribe' or 'translate')",
                other
            ))),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Transcribe => f.write_str("transcribe"),
            Task::Translate => f.write_str("translate"),
        }
    }
}

/// Decoding parameters for a single request
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribeOptions {
    pub task: Task,

    /// Language hint; `None` lets the runtime detect it
    pub language: Option<String>,

    /// Sampling temperature (0 = greedy, deterministic)
    pub temperature: f32,

    /// Feed previous output back as a prompt
    pub condition_on_previous_text: bool,
}

impl TranscribeOptions {
    /// Fixed decoding parameters: deterministic and independent of prior requests
    pub fn new(task: Task, language: Option<String>) -> Self {
        Self {
            task,
            language,
            temperature: 0.0,
            condition_on_previous_text: false,
        }
    }
}

/// Result of a transcription
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcription {
    pub text: Option<String>,
}

impl Transcription {
    /// Transcript text, trimmed; absent text becomes empty
    pub fn into_text(self) -> String {
        self.text.map(|t| t.trim().to_string()).unwrap_or_default()
    }
}

/// A loaded model that can transcribe audio files
pub trait Transcriber: Send + Sync + 'static {
    fn transcribe(&self, audio_path: &Path, options: &TranscribeOptions) -> Result<Transcription>;
}

/// An initialized inference runtime
pub trait Runtime {
    type Model: Transcriber;

    /// Configure the compute thread count
    fn set_num_threads(&mut self, threads: usize) -> Result<()>;

    /// Load the named model from `path`
    fn load_model(&self, name: &str, path: &Path) -> Result<Self::Model>;
}

/// Initialize the Whisper runtime
#[cfg(feature = "whisper")]
pub fn import_runtime(_config: &WorkerConfig) -> Result<crate::whisper::WhisperRuntime> {
    crate::whisper::WhisperRuntime::new()
}

/// Initialize the Whisper runtime
///
/// Always fails: this build does not link whisper.cpp.
#[cfg(not(feature = "whisper"))]
pub fn import_runtime(_config: &WorkerConfig) -> Result<Unavailable> {
    Err(ScribeLoopError::runtime(
        "scribeloop-worker was built without the `whisper` feature",
    ))
}

/// Placeholder runtime for builds without a speech backend
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub enum Unavailable {}

#[cfg(not(feature = "whisper"))]
impl Transcriber for Unavailable {
    fn transcribe(&self, _audio_path: &Path, _options: &TranscribeOptions) -> Result<Transcription> {
        match *self {}
    }
}

#[cfg(not(feature = "whisper"))]
impl Runtime for Unavailable {
    type Model = Unavailable;

    fn set_num_threads(&mut self, _threads: usize) -> Result<()> {
        match *self {}
    }

    fn load_model(&self, _name: &str, _path: &Path) -> Result<Self::Model> {
        match *self {}
    }
}
