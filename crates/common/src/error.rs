//! Common error types for ScribeLoop
//!
//! This module defines the error types used across the ScribeLoop worker.
//! Errors fall into two tiers: fatal errors end the process before the
//! request loop starts, everything else is reported per request.

use thiserror::Error;

/// Main error type for ScribeLoop
#[derive(Error, Debug)]
pub enum ScribeLoopError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inference runtime could not be initialized
    #[error("Runtime unavailable: {0}")]
    Runtime(String),

    /// Model loading errors
    #[error("Model error: {0}")]
    Model(String),

    /// Audio file could not be read
    #[error("Audio error: {0}")]
    Audio(String),

    /// Decoding failed inside the runtime
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML configuration parse errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics registration errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScribeLoopError {
    /// Whether this error ends the process instead of a single request
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScribeLoopError::Config(_) | ScribeLoopError::Runtime(_) | ScribeLoopError::Model(_)
        )
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        ScribeLoopError::Config(msg.into())
    }

    /// Create a runtime unavailable error
    pub fn runtime(msg: impl Into<String>) -> Self {
        ScribeLoopError::Runtime(msg.into())
    }

    /// Create a model error
    pub fn model(msg: impl Into<String>) -> Self {
        ScribeLoopError::Model(msg.into())
    }

    /// Create an audio error
    pub fn audio(msg: impl Into<String>) -> Self {
        ScribeLoopError::Audio(msg.into())
    }

    /// Create an inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        ScribeLoopError::Inference(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        ScribeLoopError::InvalidInput(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        ScribeLoopError::Internal(msg.into())
    }
}

/// Result type alias for ScribeLoop operations
pub type Result<T> = std::result::Result<T, ScribeLoopError>;
