//! Integration tests for the ingestion runner
//!
//! These tests drive full runs against both store backends with an in-process
//! fetcher, covering:
//! - Idempotent re-runs and forced re-ingestion
//! - Per-dataset failure isolation
//! - Dry runs
//! - Observer notifications

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use quarry_common::types::{FieldType, RunStatus};
use quarry_ingest::manifest::{Manifest, ManifestFile, StoreType};
use quarry_ingest::runner::{
    DatasetResult, DatasetStatus, IngestionReport, IngestionRunner, RunObserver, RunOptions,
};
use quarry_ingest::sources::{FetchedContent, Fetcher};
use quarry_ingest::versioning::{open_store_at, VersionStore};
use quarry_ingest::{DatasetSpec, IngestError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const HOSPITALS_CSV: &[u8] = b"Facility Name,City,Bed Count,Opened\n\
General Hospital,Springfield,\"1,200\",1990-04-01\n\
County Clinic,Shelbyville,45,2005-09-15\n";

const GDP_JSON: &str = r#"{
  "series_id": "GDP",
  "series_info": {"id": "GDP", "title": "Gross Domestic Product"},
  "observations": [
    {"realtime_start": "2024-04-01", "date": "2023-10-01", "value": "27956.998"},
    {"realtime_start": "2024-04-01", "date": "2024-01-01", "value": "28269.174"}
  ]
}"#;

/// Fetcher serving canned responses keyed by dataset id
#[derive(Default)]
struct FakeFetcher {
    responses: Mutex<HashMap<String, std::result::Result<FetchedContent, String>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    fn serve(&self, id: &str, bytes: &[u8], format: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(id.to_string(), Ok(FetchedContent::new(bytes.to_vec(), format)));
    }

    fn fail(&self, id: &str, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(id.to_string(), Err(message.to_string()));
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, spec: &DatasetSpec) -> quarry_ingest::Result<FetchedContent> {
        self.calls.lock().unwrap().push(spec.id.clone());
        match self.responses.lock().unwrap().get(&spec.id) {
            Some(Ok(content)) => Ok(content.clone()),
            Some(Err(message)) => Err(IngestError::fetch(spec.source().as_str(), message.clone())),
            None => Err(IngestError::fetch(spec.source().as_str(), "no canned response")),
        }
    }
}

/// Observer recording every hook as a string
#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RunObserver for RecordingObserver {
    fn run_started(&self, _run_id: &str, manifest: &Manifest, dry_run: bool) {
        self.events
            .lock()
            .unwrap()
            .push(format!("start {} dry_run={}", manifest.name, dry_run));
    }

    fn dataset_started(&self, index: usize, total: usize, spec: &DatasetSpec) {
        self.events
            .lock()
            .unwrap()
            .push(format!("dataset {}/{} {}", index + 1, total, spec.id));
    }

    fn dataset_finished(&self, result: &DatasetResult) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {} {}", result.dataset_id, result.status));
    }

    fn run_finished(&self, report: &IngestionReport) {
        self.events
            .lock()
            .unwrap()
            .push(format!("finish {}", report.status));
    }
}

fn manifest(output_dir: &std::path::Path, store_type: &str) -> Manifest {
    let yaml = format!(
        r#"
name: phase1
description: Health and economic indicators
sources:
  - id: hospitals
    source: data.gov
    query: hospital general information
    format: CSV
    license: public-domain
  - id: gdp
    source: fred
    series_id: GDP
    description: Gross Domestic Product
settings:
  output_dir: {}
  store_type: {}
"#,
        output_dir.display(),
        store_type
    );
    ManifestFile::from_yaml(&yaml).unwrap().validate().unwrap()
}

fn setup(dir: &TempDir, store_type: &str) -> (Manifest, Arc<dyn VersionStore>, Arc<FakeFetcher>) {
    let manifest = manifest(dir.path(), store_type);
    let store = open_store_at(&manifest.settings.output_dir, manifest.settings.store_type).unwrap();

    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.serve("hospitals", HOSPITALS_CSV, "csv");
    fetcher.serve("gdp", GDP_JSON.as_bytes(), "json");

    (manifest, store, fetcher)
}

fn statuses(report: &IngestionReport) -> Vec<DatasetStatus> {
    report.results.iter().map(|r| r.status).collect()
}

const STORE_TYPES: [&str; 2] = ["structured-db", "flat-file"];

#[tokio::test]
async fn test_rerun_skips_unchanged_and_force_reingests() {
    for store_type in STORE_TYPES {
        let dir = TempDir::new().unwrap();
        let (manifest, store, fetcher) = setup(&dir, store_type);
        let runner = IngestionRunner::new(Arc::clone(&store), fetcher.clone());

        // First run ingests everything
        let first = runner.run(&manifest, RunOptions::default()).await.unwrap();
        assert_eq!(statuses(&first), vec![DatasetStatus::Success; 2], "{store_type}");
        assert!(first.results.iter().all(|r| r.changed));
        assert_eq!(first.results[0].row_count, Some(2));
        assert_eq!(first.results[1].row_count, Some(2));
        assert_eq!(first.status, RunStatus::Completed);

        // Second run sees identical content
        let second = runner.run(&manifest, RunOptions::default()).await.unwrap();
        assert_eq!(statuses(&second), vec![DatasetStatus::Skipped; 2], "{store_type}");
        assert!(second.results.iter().all(|r| !r.changed && r.raw_path.is_none()));
        assert_eq!(store.versions("hospitals").await.unwrap().len(), 1);
        assert_eq!(store.versions("gdp").await.unwrap().len(), 1);

        // Forced run appends a version per dataset
        let third = runner
            .run(
                &manifest,
                RunOptions {
                    dry_run: false,
                    force: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(statuses(&third), vec![DatasetStatus::Success; 2], "{store_type}");
        assert!(third.results.iter().all(|r| r.changed));
        assert_eq!(store.versions("hospitals").await.unwrap().len(), 2);
        assert_eq!(store.versions("gdp").await.unwrap().len(), 2);

        let runs = store.runs(5).await.unwrap();
        assert_eq!(runs.len(), 3);
        assert!(runs.iter().all(|r| r.status == RunStatus::Completed));
        assert_eq!(runs[0].run_id, third.run_id);
        assert_eq!(runs[0].datasets_processed, 2);
        assert_eq!(fetcher.calls().len(), 6);
    }
}

#[tokio::test]
async fn test_changed_content_creates_new_version() {
    for store_type in STORE_TYPES {
        let dir = TempDir::new().unwrap();
        let (manifest, store, fetcher) = setup(&dir, store_type);
        let runner = IngestionRunner::new(Arc::clone(&store), fetcher.clone());

        runner.run(&manifest, RunOptions::default()).await.unwrap();
        let before = store.latest_hash("hospitals").await.unwrap().unwrap();

        let mut updated = HOSPITALS_CSV.to_vec();
        updated.extend_from_slice(b"Lakeside Hospital,Capital City,300,2012-01-20\n");
        fetcher.serve("hospitals", &updated, "csv");

        let report = runner.run(&manifest, RunOptions::default()).await.unwrap();
        assert_eq!(report.results[0].status, DatasetStatus::Success);
        assert_eq!(report.results[0].row_count, Some(3));
        assert_eq!(report.results[1].status, DatasetStatus::Skipped);

        let after = store.latest_hash("hospitals").await.unwrap().unwrap();
        assert_ne!(before, after);
        assert_eq!(after.len(), 64);
    }
}

#[tokio::test]
async fn test_failure_is_isolated_to_its_dataset() {
    for store_type in STORE_TYPES {
        let dir = TempDir::new().unwrap();
        let yaml = format!(
            r#"
name: isolation
sources:
  - id: first
    source: fred
    series_id: A
  - id: broken
    source: fred
    series_id: B
  - id: last
    source: data.gov
    dataset_id: pkg-c
settings:
  output_dir: {}
  store_type: {}
"#,
            dir.path().display(),
            store_type
        );
        let manifest = ManifestFile::from_yaml(&yaml).unwrap().validate().unwrap();
        let store =
            open_store_at(&manifest.settings.output_dir, manifest.settings.store_type).unwrap();

        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.serve("first", br#"[{"date": "2024-01-01", "value": 1}]"#, "json");
        fetcher.fail("broken", "HTTP 500 Internal Server Error");
        fetcher.serve("last", br#"{"success": true, "result": {"name": "pkg-c"}}"#, "json");

        let runner = IngestionRunner::new(Arc::clone(&store), fetcher);
        let report = runner.run(&manifest, RunOptions::default()).await.unwrap();

        assert_eq!(report.results.len(), 3);
        assert_eq!(
            statuses(&report),
            vec![
                DatasetStatus::Success,
                DatasetStatus::Failed,
                DatasetStatus::Success
            ]
        );
        let error = report.results[1].error.as_deref().unwrap();
        assert_eq!(error, "fred fetch failed: HTTP 500 Internal Server Error");
        assert_eq!(report.status, RunStatus::CompletedWithErrors);
        assert!(!report.is_success());

        // Envelope without a record list becomes a single record
        assert_eq!(report.results[2].row_count, Some(1));

        let runs = store.runs(1).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::CompletedWithErrors);
        assert_eq!(runs[0].datasets_processed, 2);
        assert_eq!(runs[0].datasets_failed, 1);
        assert!(store.versions("broken").await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_dry_run_persists_nothing() {
    for store_type in STORE_TYPES {
        let dir = TempDir::new().unwrap();
        let (manifest, store, fetcher) = setup(&dir, store_type);
        let runner = IngestionRunner::new(Arc::clone(&store), fetcher.clone());

        let report = runner
            .run(
                &manifest,
                RunOptions {
                    dry_run: true,
                    force: false,
                },
            )
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(statuses(&report), vec![DatasetStatus::Success; 2]);
        assert!(report.results.iter().all(|r| r.row_count.is_none() && !r.changed));
        assert_eq!(fetcher.calls(), vec!["hospitals", "gdp"]);

        assert!(store.runs(5).await.unwrap().is_empty());
        assert!(store.versions("hospitals").await.unwrap().is_empty());
        assert!(store.datasets().await.unwrap().is_empty());
        assert!(!dir.path().join("raw").exists());
        assert!(!dir.path().join("normalized").exists());
    }
}

#[tokio::test]
async fn test_artifacts_and_version_records() {
    let dir = TempDir::new().unwrap();
    let (manifest, store, fetcher) = setup(&dir, "structured-db");
    let runner = IngestionRunner::new(Arc::clone(&store), fetcher);

    let report = runner.run(&manifest, RunOptions::default()).await.unwrap();

    let hospitals = &report.results[0];
    let raw_path = hospitals.raw_path.as_ref().unwrap();
    assert!(raw_path.starts_with(dir.path().join("raw").join("data_gov")));
    assert_eq!(raw_path.extension().unwrap(), "csv");
    assert_eq!(std::fs::read(raw_path).unwrap(), HOSPITALS_CSV);

    let normalized_path = hospitals.normalized_path.as_ref().unwrap();
    assert_eq!(
        normalized_path,
        &dir.path()
            .join("normalized")
            .join("data_gov")
            .join(format!("hospitals_{}.json", report.run_id))
    );
    let doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(normalized_path).unwrap()).unwrap();
    assert_eq!(doc["data"][0]["facility_name"], "General Hospital");
    assert_eq!(doc["data"][0]["bed_count"], 1200.0);
    assert_eq!(doc["schema"]["fields"][3]["name"], "opened");
    assert_eq!(doc["schema"]["fields"][3]["type"], "date");

    let versions = store.versions("gdp").await.unwrap();
    let schema = versions[0].schema.as_ref().unwrap();
    assert_eq!(schema.type_of("value"), Some(FieldType::Number));
    assert_eq!(schema.type_of("date"), Some(FieldType::Date));
    assert_eq!(versions[0].run_id, report.run_id);

    let datasets = store.datasets().await.unwrap();
    assert_eq!(datasets.len(), 2);
    assert_eq!(datasets[1].title.as_deref(), Some("Gross Domestic Product"));
    assert_eq!(datasets[0].license.as_deref(), Some("public-domain"));
    assert_eq!(
        datasets[1].latest_hash.as_deref(),
        Some(versions[0].content_hash.as_str())
    );
}

#[tokio::test]
async fn test_observer_sees_every_step_in_order() {
    let dir = TempDir::new().unwrap();
    let (manifest, store, fetcher) = setup(&dir, "flat-file");
    fetcher.fail("gdp", "API key invalid");

    let observer = Arc::new(RecordingObserver::default());
    let runner = IngestionRunner::new(store, fetcher).with_observer(observer.clone());
    runner.run(&manifest, RunOptions::default()).await.unwrap();

    assert_eq!(
        *observer.events.lock().unwrap(),
        vec![
            "start phase1 dry_run=false",
            "dataset 1/2 hospitals",
            "done hospitals success",
            "dataset 2/2 gdp",
            "done gdp failed",
            "finish completed_with_errors",
        ]
    );
}

#[tokio::test]
async fn test_store_type_selects_metadata_file() {
    let dir = TempDir::new().unwrap();
    let (manifest, _store, _fetcher) = setup(&dir, "files");
    assert_eq!(manifest.settings.store_type, StoreType::FlatFile);
    assert!(dir.path().join("metadata.json").exists());

    let dir = TempDir::new().unwrap();
    let (manifest, _store, _fetcher) = setup(&dir, "sqlite");
    assert_eq!(manifest.settings.store_type, StoreType::StructuredDb);
    assert!(dir.path().join("metadata.db").exists());
}
