//! Error types shared across Quarry crates

use thiserror::Error;

/// Result type alias for Quarry operations
pub type Result<T> = std::result::Result<T, QuarryError>;

/// Main error type for shared Quarry utilities
#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid field type: {0}")]
    InvalidFieldType(String),
}
