//! Line-delimited JSON protocol
//!
//! Requests arrive one JSON object per line on stdin; every message written
//! back is a single JSON line, flushed before the next request is read.

use scribeloop_common::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Process lifecycle messages
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    /// Model loaded; requests are accepted from now on
    Ready { model: String },
    /// Startup failed; the process exits with status 1
    Fatal { error: String },
}

/// Reply to one request line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: Value,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Text(String),
    Error(String),
}

impl Response {
    pub fn text(id: Value, text: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Outcome::Text(text.into()),
        }
    }

    pub fn error(id: Value, error: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Outcome::Error(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }
}

/// Per-request failure; `Display` is the text sent back in `error`
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("request must be a JSON object")]
    NotAnObject,

    #[error("audio_path is required")]
    MissingAudioPath,

    #[error("{0} must be a string")]
    NotAString(&'static str),

    #[error("{0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error(transparent)]
    Worker(#[from] scribeloop_common::ScribeLoopError),
}

/// A validated request line
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: Value,
    pub audio_path: String,
    pub task: Option<String>,
    pub language: Option<String>,
}

impl Request {
    /// Parse one request line
    ///
    /// The id is recovered whenever the line is a JSON object, so validation
    /// errors can still be correlated. Unparseable lines report a null id.
    pub fn parse(line: &str) -> std::result::Result<Self, (Value, RequestError)> {
        let value: Value = serde_json::from_str(line).map_err(|e| (Value::Null, e.into()))?;
        let fields = match value {
            Value::Object(fields) => fields,
            _ => return Err((Value::Null, RequestError::NotAnObject)),
        };

        let id = fields.get("id").cloned().unwrap_or(Value::Null);

        let audio_path = match optional_string(&fields, "audio_path") {
            Ok(Some(path)) => path,
            Ok(None) => return Err((id, RequestError::MissingAudioPath)),
            Err(e) => return Err((id, e)),
        };
        let task = match optional_string(&fields, "task") {
            Ok(task) => task,
            Err(e) => return Err((id, e)),
        };
        let language = match optional_string(&fields, "language") {
            Ok(language) => language,
            Err(e) => return Err((id, e)),
        };

        Ok(Self {
            id,
            audio_path,
            task,
            language,
        })
    }
}

/// String field lookup where empty-like values count as absent
///
/// `null`, `false`, `0`, `""`, `[]` and `{}` are treated as missing; any other
/// non-string value is an error.
fn optional_string(
    fields: &Map<String, Value>,
    key: &'static str,
) -> std::result::Result<Option<String>, RequestError> {
    match fields.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok((!s.is_empty()).then(|| s.clone())),
        Some(value) if is_empty_like(value) => Ok(None),
        Some(_) => Err(RequestError::NotAString(key)),
    }
}

fn is_empty_like(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

/// Writes protocol messages, one flushed line each
#[derive(Debug)]
pub struct Emitter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> Emitter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialize `message` as a single line and flush it
    pub async fn emit<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
