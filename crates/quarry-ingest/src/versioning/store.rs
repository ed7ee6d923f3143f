//! Version store contract and shared artifact layout

use crate::error::{IngestError, Result};
use crate::manifest::{DatasetSpec, Settings, SourceKind, StoreType};
use crate::normalizer::{NormalizedResult, Record};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quarry_common::types::{DatasetRecord, DatasetVersion, RunRecord, RunStatus, Schema};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::flat_file::FlatFileVersionStore;
use super::sqlite::SqliteVersionStore;

pub const SQLITE_FILE: &str = "metadata.db";
pub const FLAT_FILE: &str = "metadata.json";

/// Dataset metadata written on every changed ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRegistration {
    pub id: String,
    pub source: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub license: Option<String>,
}

impl From<&DatasetSpec> for DatasetRegistration {
    fn from(spec: &DatasetSpec) -> Self {
        Self {
            id: spec.id.clone(),
            source: spec.source().as_str().to_string(),
            title: Some(spec.title().to_string()),
            description: spec.metadata.description.clone(),
            license: spec.metadata.license.clone(),
        }
    }
}

/// A version about to be appended; the store assigns sequence and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    pub dataset_id: String,
    pub run_id: String,
    pub raw_path: String,
    pub normalized_path: Option<String>,
    pub content_hash: String,
    pub row_count: Option<usize>,
    pub schema: Option<Schema>,
}

impl NewVersion {
    pub(crate) fn stamp(self, sequence: i64, retrieved_at: DateTime<Utc>) -> DatasetVersion {
        DatasetVersion {
            sequence,
            dataset_id: self.dataset_id,
            run_id: self.run_id,
            raw_path: self.raw_path,
            normalized_path: self.normalized_path,
            content_hash: self.content_hash,
            row_count: self.row_count,
            retrieved_at,
            schema: self.schema,
        }
    }
}

/// Append-only history of runs and dataset versions
///
/// Implementations are selected once from [`StoreType`]; callers never branch
/// on the backend.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Record a run as `running`
    async fn start_run(&self, run_id: &str, manifest_name: &str, manifest_hash: &str)
        -> Result<()>;

    /// Record run completion and its counts
    async fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        datasets_processed: usize,
        datasets_failed: usize,
    ) -> Result<()>;

    /// Insert or update dataset metadata
    async fn register_dataset(&self, dataset: &DatasetRegistration) -> Result<()>;

    /// Append a version record
    async fn record_version(&self, version: NewVersion) -> Result<DatasetVersion>;

    /// Fingerprint of the latest version of a dataset
    async fn latest_hash(&self, dataset_id: &str) -> Result<Option<String>>;

    /// Registered datasets with their latest fingerprint
    async fn datasets(&self) -> Result<Vec<DatasetRecord>>;

    /// Most recent runs first
    async fn runs(&self, limit: usize) -> Result<Vec<RunRecord>>;

    /// All versions of a dataset, oldest first
    async fn versions(&self, dataset_id: &str) -> Result<Vec<DatasetVersion>>;

    /// Artifact layout rooted at the output directory
    fn artifacts(&self) -> &ArtifactWriter;

    /// Persist raw fetched bytes
    async fn save_raw(
        &self,
        dataset_id: &str,
        source: SourceKind,
        content: &[u8],
        format: &str,
        run_id: &str,
    ) -> Result<PathBuf> {
        self.artifacts()
            .write_raw(dataset_id, source, content, format, run_id)
            .await
    }

    /// Persist normalized records plus their schema
    async fn save_normalized(
        &self,
        dataset_id: &str,
        source: SourceKind,
        run_id: &str,
        result: &NormalizedResult,
    ) -> Result<PathBuf> {
        self.artifacts()
            .write_normalized(dataset_id, source, run_id, result)
            .await
    }
}

/// Raw and normalized artifact layout under an output directory
///
/// ```text
/// {root}/raw/{source}/{id}_{YYYYmmdd_HHMMSS}_{run}.{ext}
/// {root}/normalized/{source}/{id}_{run}.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self, source: SourceKind) -> PathBuf {
        self.root.join("raw").join(source.dir_name())
    }

    pub fn normalized_dir(&self, source: SourceKind) -> PathBuf {
        self.root.join("normalized").join(source.dir_name())
    }

    pub fn raw_path(
        &self,
        dataset_id: &str,
        source: SourceKind,
        format: &str,
        run_id: &str,
        at: DateTime<Utc>,
    ) -> PathBuf {
        let ext = file_extension(format);
        self.raw_dir(source).join(format!(
            "{dataset_id}_{}_{run_id}.{ext}",
            at.format("%Y%m%d_%H%M%S")
        ))
    }

    pub fn normalized_path(&self, dataset_id: &str, source: SourceKind, run_id: &str) -> PathBuf {
        self.normalized_dir(source)
            .join(format!("{dataset_id}_{run_id}.json"))
    }

    pub async fn write_raw(
        &self,
        dataset_id: &str,
        source: SourceKind,
        content: &[u8],
        format: &str,
        run_id: &str,
    ) -> Result<PathBuf> {
        let path = self.raw_path(dataset_id, source, format, run_id, Utc::now());
        write_file(&path, content).await?;
        debug!(dataset_id, path = %path.display(), bytes = content.len(), "Saved raw content");
        Ok(path)
    }

    pub async fn write_normalized(
        &self,
        dataset_id: &str,
        source: SourceKind,
        run_id: &str,
        result: &NormalizedResult,
    ) -> Result<PathBuf> {
        let path = self.normalized_path(dataset_id, source, run_id);
        let document = NormalizedDocument {
            schema: &result.schema,
            data: &result.data,
        };
        write_file(&path, &serde_json::to_vec_pretty(&document)?).await?;
        debug!(dataset_id, path = %path.display(), rows = result.row_count, "Saved normalized content");
        Ok(path)
    }
}

/// Lowercase `[a-z0-9]+` extension for an upstream format, `dat` when empty
///
/// MIME types keep their subtype, so `text/csv` becomes `csv`.
pub fn file_extension(format: &str) -> String {
    let format = format.trim().to_lowercase();
    let subtype = format.rsplit('/').next().unwrap_or_default();
    let ext: String = subtype.chars().filter(char::is_ascii_alphanumeric).collect();

    if ext.is_empty() {
        "dat".to_string()
    } else {
        ext
    }
}

#[derive(Serialize)]
struct NormalizedDocument<'a> {
    schema: &'a Schema,
    data: &'a [Record],
}

async fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            IngestError::store(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| IngestError::store(format!("Failed to write {}: {}", path.display(), e)))
}

/// Guess the backend from the metadata file present in `output_dir`
pub fn detect_store_type(output_dir: &Path) -> StoreType {
    if output_dir.join(SQLITE_FILE).exists() {
        StoreType::StructuredDb
    } else if output_dir.join(FLAT_FILE).exists() {
        StoreType::FlatFile
    } else {
        StoreType::default()
    }
}

/// Open the backend configured in the manifest settings
pub fn open_store(settings: &Settings) -> Result<Arc<dyn VersionStore>> {
    open_store_at(&settings.output_dir, settings.store_type)
}

/// Open a backend of the given type rooted at `output_dir`
pub fn open_store_at(output_dir: &Path, store_type: StoreType) -> Result<Arc<dyn VersionStore>> {
    Ok(match store_type {
        StoreType::StructuredDb => Arc::new(SqliteVersionStore::open(output_dir)?),
        StoreType::FlatFile => Arc::new(FlatFileVersionStore::open(output_dir)?),
    })
}
