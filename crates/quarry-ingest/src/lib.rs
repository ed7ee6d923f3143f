//! Quarry Ingest Library
//!
//! Manifest-driven ingestion of public datasets with change detection and
//! schema inference.
//!
//! # Supported Data Sources
//!
//! - **data.gov**: CKAN catalog packages, by id or by search query
//! - **FRED**: Federal Reserve Economic Data time series
//!
//! # Pipeline
//!
//! - [`manifest`]: load and validate the list of datasets to ingest
//! - [`sources`]: fetch raw bytes for each dataset
//! - [`versioning`]: fingerprint content and keep an append-only version log
//! - [`normalizer`]: parse CSV/JSON into typed records with an inferred schema
//! - [`runner`]: drive a manifest through all of the above
//!
//! # Example
//!
//! ```no_run
//! use quarry_ingest::runner::{run_manifest, RunOptions, RunOverrides};
//!
//! #[tokio::main]
//! async fn main() -> quarry_ingest::Result<()> {
//!     let report = run_manifest(
//!         "manifests/phase1.yaml",
//!         RunOverrides::default(),
//!         RunOptions::default(),
//!         None,
//!     )
//!     .await?;
//!     println!("{} succeeded, {} failed", report.succeeded(), report.failed());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod downloader;
pub mod error;
pub mod manifest;
pub mod normalizer;
pub mod runner;
pub mod sources;
pub mod versioning;

pub use error::{IngestError, Result};
pub use manifest::{DatasetSpec, Manifest, ManifestFile, SourceKind, StoreType};
pub use runner::{IngestionReport, IngestionRunner, RunOptions};
