//! Error types for the Quarry CLI
//!
//! Messages are user-facing and say what to do next.

use quarry_ingest::IngestError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Manifest could not be loaded or failed validation
    #[error("{0}. Check the manifest file and fix the listed problems.")]
    InvalidManifest(String),

    /// A credential or other setting is missing
    #[error("{0}")]
    Config(String),

    /// Version store could not be opened or read
    #[error("{0}. Check that the data directory is readable and not in use.")]
    Store(String),

    /// Ingestion finished with failed datasets
    #[error("{failed} dataset(s) failed in run {run_id}")]
    RunFailed { run_id: String, failed: usize },

    /// Catalog search or download failed
    #[error("{0}. Check your network connection and the source endpoint.")]
    Fetch(String),

    /// Other ingest library error
    #[error(transparent)]
    Ingest(IngestError),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// CSV export failed
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    /// JSON export failed
    #[error("Failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<IngestError> for CliError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(_) | IngestError::ManifestLoad(_) => {
                Self::InvalidManifest(err.to_string())
            }
            IngestError::Config(_) => Self::Config(err.to_string()),
            IngestError::Store(_) | IngestError::Sqlite(_) => Self::Store(err.to_string()),
            IngestError::Fetch { .. } | IngestError::Http(_) => Self::Fetch(err.to_string()),
            other => Self::Ingest(other),
        }
    }
}

impl CliError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
