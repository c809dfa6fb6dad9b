//! Error types for plan compilation, persistence and execution bookkeeping.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while compiling, validating or persisting plans
#[derive(Debug, Error)]
pub enum Error {
    /// Specification or template overrides had the wrong shape
    #[error("compilation failed: {0}")]
    Compile(String),

    /// A plan failed its pre-execution checks
    #[error("plan '{plan}' is invalid: {}", .errors.join("; "))]
    InvalidPlan {
        /// Name of the rejected plan
        plan: String,
        /// Human-readable reasons
        errors: Vec<String>,
    },

    /// A plan or state file could not be read or written
    #[error("failed to access {}: {source}", .path.display())]
    File {
        /// File that failed
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}

/// Result type for plan operations
pub type Result<T> = std::result::Result<T, Error>;
