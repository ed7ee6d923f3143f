//! Error types for the ingest library
//!
//! Validation and manifest-load errors end a whole invocation. Every other
//! variant is caught per dataset by the runner and reported as a failed result.

use thiserror::Error;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error taxonomy for ingestion
#[derive(Error, Debug)]
pub enum IngestError {
    /// Manifest failed validation; carries every problem found
    #[error("Invalid manifest: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Manifest file could not be read or parsed
    #[error("Failed to load manifest: {0}")]
    ManifestLoad(String),

    /// Upstream fetch failed (network, HTTP status, API-reported error)
    #[error("{source_name} fetch failed: {message}")]
    Fetch {
        source_name: String,
        message: String,
    },

    /// Required configuration (usually a credential) is missing
    #[error("Configuration error: {0}")]
    Config(String),

    /// Version store operation failed
    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Common(#[from] quarry_common::QuarryError),
}

impl IngestError {
    /// Create a fetch error for a named source
    pub fn fetch(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether this error ends the whole invocation rather than one dataset
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::ManifestLoad(_))
    }
}
