//! Error types for the pipeline crate.

use thiserror::Error;

use crate::worker::State;

/// Result type alias for the pipeline crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while assembling or controlling the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid worker transition: {op}() while {state:?}")]
    InvalidTransition { op: &'static str, state: State },

    #[error("timed out after {usec} us waiting for worker state {state:?}")]
    WaitTimeout { state: State, usec: u64 },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("label file error: {0}")]
    LabelError(String),

    #[error("frame source error: {0}")]
    CaptureError(String),

    #[error("inference failed: {0}")]
    InferenceError(String),

    #[error("track sink error: {0}")]
    SinkError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn capture<S: Into<String>>(msg: S) -> Self {
        Self::CaptureError(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::InferenceError(msg.into())
    }

    pub fn sink<S: Into<String>>(msg: S) -> Self {
        Self::SinkError(msg.into())
    }
}
