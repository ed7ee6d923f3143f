//! Manifest-driven ingestion runner
//!
//! Specs run strictly in manifest order, one at a time:
//!
//! ```text
//! fetch -> fingerprint -> compare with latest version
//!     unchanged: skipped
//!     changed:   register -> save raw -> normalize -> save normalized -> append version
//! ```
//!
//! Each spec has exactly one error boundary. Whatever goes wrong inside it
//! becomes a `failed` result and the run moves on. Only recording the run's
//! start and completion can fail the whole run.

mod observer;
mod report;

pub use observer::{RunObserver, TracingObserver};
pub use report::{DatasetResult, DatasetStatus, IngestionReport};

use crate::config::{Credentials, SourceConfig};
use crate::error::Result;
use crate::manifest::{DatasetSpec, Manifest, ManifestFile, SourceKind};
use crate::normalizer::normalize;
use crate::sources::{Fetcher, SourceFetcher};
use crate::versioning::{open_store, ChangeDetector, DatasetRegistration, NewVersion, VersionStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Length of generated run ids
const RUN_ID_LEN: usize = 8;

/// Per-invocation switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Fetch only; no fingerprinting, normalization or persistence
    pub dry_run: bool,
    /// Ingest even when the content is unchanged
    pub force: bool,
}

/// Short random run identifier
pub fn generate_run_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(RUN_ID_LEN);
    id
}

/// Drives a manifest through fetch, change detection, normalization and storage
pub struct IngestionRunner {
    store: Arc<dyn VersionStore>,
    fetcher: Arc<dyn Fetcher>,
    detector: ChangeDetector,
    observer: Arc<dyn RunObserver>,
}

impl IngestionRunner {
    pub fn new(store: Arc<dyn VersionStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            detector: ChangeDetector::new(Arc::clone(&store)),
            store,
            fetcher,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run every spec in the manifest
    ///
    /// Per-dataset failures are reported in the result list. An `Err` means
    /// the run itself could not be recorded.
    pub async fn run(&self, manifest: &Manifest, options: RunOptions) -> Result<IngestionReport> {
        let run_id = generate_run_id();
        let manifest_hash = manifest.fingerprint()?;
        let mut report =
            IngestionReport::new(&run_id, &manifest.name, &manifest_hash, options.dry_run);

        self.observer.run_started(&run_id, manifest, options.dry_run);

        if !options.dry_run {
            self.store
                .start_run(&run_id, &manifest.name, &manifest_hash)
                .await?;
        }

        let total = manifest.sources.len();
        for (index, spec) in manifest.sources.iter().enumerate() {
            self.observer.dataset_started(index, total, spec);
            let result = self.process(spec, &run_id, options).await;
            self.observer.dataset_finished(&result);
            report.results.push(result);
        }

        report.finish();

        if !options.dry_run {
            self.store
                .complete_run(&run_id, report.status, report.processed(), report.failed())
                .await?;
        }

        self.observer.run_finished(&report);
        Ok(report)
    }

    async fn process(&self, spec: &DatasetSpec, run_id: &str, options: RunOptions) -> DatasetResult {
        match self.ingest(spec, run_id, options).await {
            Ok(result) => result,
            Err(e) => {
                warn!(dataset_id = %spec.id, error = %e, "Dataset ingestion failed");
                DatasetResult::failed(&spec.id, e.to_string())
            }
        }
    }

    async fn ingest(&self, spec: &DatasetSpec, run_id: &str, options: RunOptions) -> Result<DatasetResult> {
        let fetched = self.fetcher.fetch(spec).await?;
        debug!(
            dataset_id = %spec.id,
            bytes = fetched.bytes.len(),
            format = %fetched.format,
            "Fetched content"
        );

        if options.dry_run {
            return Ok(DatasetResult::fetched(&spec.id));
        }

        let decision = self
            .detector
            .detect(&spec.id, &fetched.bytes, options.force)
            .await?;

        if !decision.changed {
            debug!(dataset_id = %spec.id, fingerprint = %decision.fingerprint, "Content unchanged");
            return Ok(DatasetResult::skipped(&spec.id));
        }
        if decision.is_new() {
            info!(dataset_id = %spec.id, fingerprint = %decision.fingerprint, "First version of dataset");
        }

        let source: SourceKind = spec.source();
        self.store
            .register_dataset(&DatasetRegistration::from(spec))
            .await?;

        let raw_path = self
            .store
            .save_raw(&spec.id, source, &fetched.bytes, &fetched.format, run_id)
            .await?;

        let normalized = normalize(&fetched.bytes, &fetched.format);

        let normalized_path = self
            .store
            .save_normalized(&spec.id, source, run_id, &normalized)
            .await?;

        self.store
            .record_version(NewVersion {
                dataset_id: spec.id.clone(),
                run_id: run_id.to_string(),
                raw_path: raw_path.display().to_string(),
                normalized_path: Some(normalized_path.display().to_string()),
                content_hash: decision.fingerprint,
                row_count: Some(normalized.row_count),
                schema: Some(normalized.schema),
            })
            .await?;

        Ok(DatasetResult::ingested(
            &spec.id,
            raw_path,
            normalized_path,
            normalized.row_count,
            normalized.warnings,
        ))
    }
}

/// Caller-supplied overrides for [`run_manifest`]
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    /// Replaces `settings.output_dir`
    pub data_dir: Option<PathBuf>,
    /// FRED API key taking precedence over manifest and environment
    pub api_key: Option<String>,
}

/// Load, validate and run a manifest file against its configured store
pub async fn run_manifest(
    path: impl AsRef<Path>,
    overrides: RunOverrides,
    options: RunOptions,
    observer: Option<Arc<dyn RunObserver>>,
) -> Result<IngestionReport> {
    let mut manifest = ManifestFile::load(path)?.validate()?;
    if let Some(dir) = overrides.data_dir {
        manifest = manifest.with_output_dir(dir);
    }

    let store = open_store(&manifest.settings)?;

    let mut credentials = Credentials::new(manifest.settings.api_keys.clone());
    if let Some(key) = overrides.api_key {
        credentials = credentials.with_explicit(SourceKind::Fred, key);
    }
    let fetcher = SourceFetcher::new(&SourceConfig::from_env()?, credentials)?;

    let mut runner = IngestionRunner::new(store, Arc::new(fetcher));
    if let Some(observer) = observer {
        runner = runner.with_observer(observer);
    }

    runner.run(&manifest, options).await
}
