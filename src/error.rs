//! Error types for the evaluation orchestrator.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur while orchestrating evaluations.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The evaluation configuration was rejected before submission.
    #[error("{0}")]
    Validation(String),

    /// Transport or HTTP status failure talking to the agent service.
    #[error("{message}")]
    Remote {
        status_code: Option<u16>,
        message: String,
    },

    /// A well-formed response that explicitly rejected the request.
    #[error("{0}")]
    Logical(String),

    /// The polling budget was exhausted without a terminal status.
    #[error("{0}")]
    Timeout(String),

    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl OrchestratorError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a remote error without an HTTP status.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            status_code: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for OrchestratorError {
    fn from(err: reqwest::Error) -> Self {
        OrchestratorError::Remote {
            status_code: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}
