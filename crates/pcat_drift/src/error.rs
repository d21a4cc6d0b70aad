//! Error types for drift reconciliation.

use thiserror::Error;

/// Result type alias for drift operations.
pub type DriftResult<T> = Result<T, DriftError>;

/// Errors that can occur while loading snapshots or computing drift.
///
/// Drift itself is never an error; it is reported as data.
#[derive(Error, Debug)]
pub enum DriftError {
    #[error("Incompatible snapshot: {0}")]
    IncompatibleSnapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
