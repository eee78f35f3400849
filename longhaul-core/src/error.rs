//! Error types for longhaul-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the longhaul-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Model API error (transport failure or non-2xx response)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A session document could not be written
    #[error("failed to write {path:?}: {source}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A background task panicked or was aborted
    #[error("background task failed: {0}")]
    Task(String),

    /// Report rendering error
    #[error("report error: {0}")]
    Report(String),
}

/// Result type alias for longhaul-core
pub type Result<T> = std::result::Result<T, Error>;
