//! Run lifecycle hooks

use super::report::{DatasetResult, DatasetStatus, IngestionReport};
use crate::manifest::{DatasetSpec, Manifest};
use tracing::{error, info, warn};

/// Receives run progress; every hook defaults to a no-op
pub trait RunObserver: Send + Sync {
    fn run_started(&self, _run_id: &str, _manifest: &Manifest, _dry_run: bool) {}

    /// `index` is zero-based
    fn dataset_started(&self, _index: usize, _total: usize, _spec: &DatasetSpec) {}

    fn dataset_finished(&self, _result: &DatasetResult) {}

    fn run_finished(&self, _report: &IngestionReport) {}
}

/// Emits structured `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn run_started(&self, run_id: &str, manifest: &Manifest, dry_run: bool) {
        info!(
            run_id,
            manifest = %manifest.name,
            datasets = manifest.sources.len(),
            dry_run,
            "Starting ingestion run"
        );
    }

    fn dataset_started(&self, index: usize, total: usize, spec: &DatasetSpec) {
        info!(
            dataset_id = %spec.id,
            source = %spec.source(),
            "Processing dataset {}/{}",
            index + 1,
            total
        );
    }

    fn dataset_finished(&self, result: &DatasetResult) {
        match result.status {
            DatasetStatus::Failed => error!(
                dataset_id = %result.dataset_id,
                error = result.error.as_deref().unwrap_or_default(),
                "Dataset failed"
            ),
            status => info!(
                dataset_id = %result.dataset_id,
                %status,
                rows = ?result.row_count,
                changed = result.changed,
                "Dataset finished"
            ),
        }

        for warning in &result.warnings {
            warn!(dataset_id = %result.dataset_id, "{}", warning);
        }
    }

    fn run_finished(&self, report: &IngestionReport) {
        info!(
            run_id = %report.run_id,
            status = %report.status,
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Ingestion run complete"
        );
    }
}
