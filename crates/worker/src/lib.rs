//! ScribeLoop Worker
//!
//! Persistent speech recognition worker. Loads a Whisper model once, then
//! answers line-delimited JSON transcription requests on stdin, one at a
//! time, with JSON lines on stdout.

pub mod audio;
pub mod cli;
pub mod protocol;
pub mod runtime;
#[cfg(feature = "whisper")]
pub mod whisper;
pub mod worker;

pub use cli::Args;
pub use protocol::{Emitter, Request, RequestError, Response, WorkerMessage};
pub use runtime::{import_runtime, Runtime, Task, TranscribeOptions, Transcriber, Transcription};
pub use worker::{start, LoopSummary, Worker};
