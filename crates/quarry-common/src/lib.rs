//! Quarry Common Library
//!
//! Shared types, utilities, and error handling for the Quarry workspace.
//!
//! # Overview
//!
//! This crate provides functionality used by every Quarry workspace member:
//!
//! - **Error Handling**: Common error type and result alias
//! - **Checksums**: Content fingerprints used for change detection
//! - **Logging**: `tracing` subscriber setup for binaries
//! - **Types**: Persisted records shared by the ingest library and the CLI
//!
//! # Example
//!
//! ```
//! use quarry_common::checksum::{fingerprint, short_fingerprint, FINGERPRINT_LEN};
//!
//! let content = b"date,value\n2024-01-01,1.5\n";
//! let digest = fingerprint(content);
//! assert_eq!(digest.len(), FINGERPRINT_LEN);
//! assert!(digest.starts_with(&short_fingerprint(content, 12)));
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{QuarryError, Result};
