//! Per-run and per-dataset outcomes

use chrono::{DateTime, Utc};
use quarry_common::types::RunStatus;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one dataset spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    Success,
    Skipped,
    Failed,
}

impl DatasetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Success => "success",
            DatasetStatus::Skipped => "skipped",
            DatasetStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of processing one spec; one per spec per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetResult {
    pub dataset_id: String,
    pub status: DatasetStatus,
    pub raw_path: Option<PathBuf>,
    pub normalized_path: Option<PathBuf>,
    pub row_count: Option<usize>,
    pub error: Option<String>,
    pub changed: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl DatasetResult {
    fn new(dataset_id: &str, status: DatasetStatus) -> Self {
        Self {
            dataset_id: dataset_id.to_string(),
            status,
            raw_path: None,
            normalized_path: None,
            row_count: None,
            error: None,
            changed: false,
            warnings: Vec::new(),
        }
    }

    /// Changed content that was normalized and persisted
    pub fn ingested(
        dataset_id: &str,
        raw_path: PathBuf,
        normalized_path: PathBuf,
        row_count: usize,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            raw_path: Some(raw_path),
            normalized_path: Some(normalized_path),
            row_count: Some(row_count),
            changed: true,
            warnings,
            ..Self::new(dataset_id, DatasetStatus::Success)
        }
    }

    /// Dry run: fetched, nothing else
    pub fn fetched(dataset_id: &str) -> Self {
        Self::new(dataset_id, DatasetStatus::Success)
    }

    pub fn skipped(dataset_id: &str) -> Self {
        Self::new(dataset_id, DatasetStatus::Skipped)
    }

    pub fn failed(dataset_id: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(dataset_id, DatasetStatus::Failed)
        }
    }
}

/// Report for one run; counts are always derived from `results`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub run_id: String,
    pub manifest_name: String,
    pub manifest_hash: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub dry_run: bool,
    pub results: Vec<DatasetResult>,
}

impl IngestionReport {
    pub fn new(
        run_id: impl Into<String>,
        manifest_name: impl Into<String>,
        manifest_hash: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            manifest_name: manifest_name.into(),
            manifest_hash: manifest_hash.into(),
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Running,
            dry_run,
            results: Vec::new(),
        }
    }

    fn count(&self, status: DatasetStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(DatasetStatus::Success)
    }

    pub fn skipped(&self) -> usize {
        self.count(DatasetStatus::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(DatasetStatus::Failed)
    }

    /// Datasets that did not fail
    pub fn processed(&self) -> usize {
        self.succeeded() + self.skipped()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &DatasetResult> {
        self.results
            .iter()
            .filter(|r| r.status == DatasetStatus::Failed)
    }

    /// Stamp completion and derive the aggregate status
    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
        self.status = if self.is_success() {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        };
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_are_derived_from_results() {
        let mut report = IngestionReport::new("r1", "m", "h", false);
        report.results.push(DatasetResult::ingested(
            "a",
            PathBuf::from("raw/a"),
            PathBuf::from("normalized/a"),
            3,
            Vec::new(),
        ));
        report.results.push(DatasetResult::skipped("b"));
        report.results.push(DatasetResult::failed("c", "fred fetch failed: HTTP 500"));

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.processed(), 2);
        assert_eq!(report.failures().next().unwrap().dataset_id, "c");

        report.finish();
        assert_eq!(report.status, RunStatus::CompletedWithErrors);
        assert!(report.completed_at.unwrap() >= report.started_at);
    }

    #[test]
    fn test_clean_run_completes() {
        let mut report = IngestionReport::new("r1", "m", "h", true);
        report.results.push(DatasetResult::fetched("a"));
        report.finish();

        assert_eq!(report.status, RunStatus::Completed);
        assert!(report.results[0].row_count.is_none());
        assert!(!report.results[0].changed);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_value(DatasetResult::skipped("a")).unwrap();
        assert_eq!(json["status"], "skipped");
    }
}
