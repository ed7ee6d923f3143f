//! JSON document version store (`metadata.json`)

use super::store::{ArtifactWriter, DatasetRegistration, NewVersion, VersionStore, FLAT_FILE};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use chrono::Utc;
use quarry_common::types::{DatasetRecord, DatasetVersion, RunRecord, RunStatus};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Metadata {
    #[serde(default)]
    datasets: Vec<DatasetRegistration>,
    #[serde(default)]
    runs: Vec<RunRecord>,
    #[serde(default)]
    versions: Vec<DatasetVersion>,
}

impl Metadata {
    fn latest_version(&self, dataset_id: &str) -> Option<&DatasetVersion> {
        self.versions
            .iter()
            .filter(|v| v.dataset_id == dataset_id)
            .max_by_key(|v| v.recency_key())
    }
}

/// Version store persisted as a single JSON document
///
/// Every operation reloads the document and writes it back through a
/// temporary file, so the file on disk is always complete.
pub struct FlatFileVersionStore {
    path: PathBuf,
    lock: Mutex<()>,
    artifacts: ArtifactWriter,
}

impl FlatFileVersionStore {
    /// Open (or create) `metadata.json` under `output_dir`
    pub fn open(output_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(output_dir)?;

        let store = Self {
            path: output_dir.join(FLAT_FILE),
            lock: Mutex::new(()),
            artifacts: ArtifactWriter::new(output_dir),
        };

        if !store.path.exists() {
            store.save(&Metadata::default())?;
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Metadata> {
        if !self.path.exists() {
            return Ok(Metadata::default());
        }

        let content = std::fs::read(&self.path)?;
        serde_json::from_slice(&content).map_err(|e| {
            IngestError::store(format!(
                "Failed to parse metadata file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn save(&self, metadata: &Metadata) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(metadata)?)?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            IngestError::store(format!(
                "Failed to replace metadata file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Metadata) -> T) -> Result<T> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| IngestError::store(format!("Failed to acquire metadata lock: {}", e)))?;
        Ok(f(&self.load()?))
    }

    fn update<T>(&self, f: impl FnOnce(&mut Metadata) -> Result<T>) -> Result<T> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| IngestError::store(format!("Failed to acquire metadata lock: {}", e)))?;

        let mut metadata = self.load()?;
        let value = f(&mut metadata)?;
        self.save(&metadata)?;
        Ok(value)
    }
}

#[async_trait]
impl VersionStore for FlatFileVersionStore {
    async fn start_run(&self, run_id: &str, manifest_name: &str, manifest_hash: &str) -> Result<()> {
        self.update(|metadata| {
            metadata.runs.push(RunRecord {
                run_id: run_id.to_string(),
                manifest_name: manifest_name.to_string(),
                manifest_hash: manifest_hash.to_string(),
                started_at: Utc::now(),
                completed_at: None,
                status: RunStatus::Running,
                datasets_processed: 0,
                datasets_failed: 0,
            });
            Ok(())
        })
    }

    async fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        datasets_processed: usize,
        datasets_failed: usize,
    ) -> Result<()> {
        self.update(|metadata| {
            let run = metadata
                .runs
                .iter_mut()
                .find(|r| r.run_id == run_id)
                .ok_or_else(|| IngestError::store(format!("Unknown run: {run_id}")))?;

            run.completed_at = Some(Utc::now());
            run.status = status;
            run.datasets_processed = datasets_processed;
            run.datasets_failed = datasets_failed;
            Ok(())
        })
    }

    async fn register_dataset(&self, dataset: &DatasetRegistration) -> Result<()> {
        self.update(|metadata| {
            match metadata.datasets.iter_mut().find(|d| d.id == dataset.id) {
                Some(existing) => *existing = dataset.clone(),
                None => metadata.datasets.push(dataset.clone()),
            }
            Ok(())
        })
    }

    async fn record_version(&self, version: NewVersion) -> Result<DatasetVersion> {
        self.update(|metadata| {
            let sequence = metadata
                .versions
                .iter()
                .map(|v| v.sequence)
                .max()
                .unwrap_or(0)
                + 1;

            let stamped = version.stamp(sequence, Utc::now());
            metadata.versions.push(stamped.clone());
            Ok(stamped)
        })
    }

    async fn latest_hash(&self, dataset_id: &str) -> Result<Option<String>> {
        self.read(|metadata| {
            metadata
                .latest_version(dataset_id)
                .map(|v| v.content_hash.clone())
        })
    }

    async fn datasets(&self) -> Result<Vec<DatasetRecord>> {
        self.read(|metadata| {
            metadata
                .datasets
                .iter()
                .map(|d| {
                    let latest = metadata.latest_version(&d.id);
                    DatasetRecord {
                        id: d.id.clone(),
                        source: d.source.clone(),
                        title: d.title.clone(),
                        description: d.description.clone(),
                        license: d.license.clone(),
                        latest_hash: latest.map(|v| v.content_hash.clone()),
                        last_updated: latest.map(|v| v.retrieved_at),
                    }
                })
                .collect()
        })
    }

    async fn runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        self.read(|metadata| {
            let mut runs: Vec<(usize, &RunRecord)> = metadata.runs.iter().enumerate().collect();
            runs.sort_by(|(ai, a), (bi, b)| (b.started_at, bi).cmp(&(a.started_at, ai)));
            runs.into_iter().take(limit).map(|(_, r)| r.clone()).collect()
        })
    }

    async fn versions(&self, dataset_id: &str) -> Result<Vec<DatasetVersion>> {
        self.read(|metadata| {
            let mut versions: Vec<DatasetVersion> = metadata
                .versions
                .iter()
                .filter(|v| v.dataset_id == dataset_id)
                .cloned()
                .collect();
            versions.sort_by_key(|v| v.recency_key());
            versions
        })
    }

    fn artifacts(&self) -> &ArtifactWriter {
        &self.artifacts
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_version(run_id: &str, hash: &str) -> NewVersion {
        NewVersion {
            dataset_id: "hospitals".to_string(),
            run_id: run_id.to_string(),
            raw_path: format!("raw/hospitals_{run_id}.csv"),
            normalized_path: None,
            content_hash: hash.to_string(),
            row_count: None,
            schema: None,
        }
    }

    #[tokio::test]
    async fn test_creates_empty_document() {
        let dir = TempDir::new().unwrap();
        let store = FlatFileVersionStore::open(dir.path()).unwrap();

        let doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(doc["datasets"], serde_json::json!([]));
        assert_eq!(doc["runs"], serde_json::json!([]));
        assert_eq!(doc["versions"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_versions_and_runs_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FlatFileVersionStore::open(dir.path()).unwrap();
            store.start_run("r1", "phase1", "h").await.unwrap();
            store
                .register_dataset(&DatasetRegistration {
                    id: "hospitals".to_string(),
                    source: "data.gov".to_string(),
                    title: Some("Hospitals".to_string()),
                    description: None,
                    license: None,
                })
                .await
                .unwrap();
            store.record_version(new_version("r1", "h1")).await.unwrap();
            store.record_version(new_version("r2", "h2")).await.unwrap();
            store.complete_run("r1", RunStatus::Completed, 1, 0).await.unwrap();
        }

        let store = FlatFileVersionStore::open(dir.path()).unwrap();
        assert_eq!(
            store.latest_hash("hospitals").await.unwrap().as_deref(),
            Some("h2")
        );

        let versions = store.versions("hospitals").await.unwrap();
        assert_eq!(
            versions.iter().map(|v| v.sequence).collect::<Vec<_>>(),
            vec![1, 2]
        );

        let runs = store.runs(5).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Completed);

        let datasets = store.datasets().await.unwrap();
        assert_eq!(datasets[0].latest_hash.as_deref(), Some("h2"));
        assert_eq!(datasets[0].source, "data.gov");
    }

    #[tokio::test]
    async fn test_latest_hash_breaks_timestamp_ties_by_sequence() {
        let dir = TempDir::new().unwrap();
        let store = FlatFileVersionStore::open(dir.path()).unwrap();
        store.record_version(new_version("r1", "h1")).await.unwrap();
        store.record_version(new_version("r2", "h2")).await.unwrap();

        let at = Utc::now();
        store
            .update(|metadata| {
                for version in &mut metadata.versions {
                    version.retrieved_at = at;
                }
                metadata.versions.reverse();
                Ok(())
            })
            .unwrap();

        assert_eq!(
            store.latest_hash("hospitals").await.unwrap().as_deref(),
            Some("h2")
        );
    }

    #[tokio::test]
    async fn test_corrupt_document_is_store_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(FLAT_FILE), "not json").unwrap();

        let store = FlatFileVersionStore::open(dir.path()).unwrap();
        let err = store.latest_hash("x").await.unwrap_err();
        assert!(matches!(err, IngestError::Store(_)));
    }

    #[tokio::test]
    async fn test_complete_unknown_run_fails() {
        let dir = TempDir::new().unwrap();
        let store = FlatFileVersionStore::open(dir.path()).unwrap();
        assert!(store
            .complete_run("nope", RunStatus::Completed, 0, 0)
            .await
            .is_err());
    }
}
