//! Error types for the evaluation engine.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur while running an evaluation.
#[derive(Error, Debug)]
pub enum EvalError {
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

    /// The gold-set file does not exist.
    #[error("Gold set not found at '{0}'")]
    GoldsetNotFound(PathBuf),

    /// The gold-set file exists but cannot be understood.
    #[error("Malformed gold set: {0}")]
    InvalidGoldset(String),

    /// Configuration file or value error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The conversational chain failed to answer a question.
    #[error("Chain invocation failed: {0}")]
    ChainInvocation(String),

    /// Run artifacts could not be written or read.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The external dataset registry rejected or failed a request.
    #[error("Dataset registry error: {0}")]
    Registry(String),
}

impl EvalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts a run.
    ///
    /// Only configuration-class errors are fatal; everything else is
    /// recovered per item or per artifact.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EvalError::GoldsetNotFound(_) | EvalError::InvalidGoldset(_) | EvalError::Config(_)
        )
    }
}

impl From<reqwest::Error> for EvalError {
    fn from(err: reqwest::Error) -> Self {
        EvalError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::LlmParse(err.to_string())
    }
}

impl From<csv::Error> for EvalError {
    fn from(err: csv::Error) -> Self {
        EvalError::Persistence(err.to_string())
    }
}
