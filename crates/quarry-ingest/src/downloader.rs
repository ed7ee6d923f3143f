//! Bulk download of catalog resources and FRED observations
//!
//! Downloads run with bounded concurrency. Files that already exist are
//! skipped when resuming, so an interrupted download can simply be rerun.

use crate::error::{IngestError, Result};
use crate::sources::{DatasetSummary, FredClient, FredObservation};
use crate::versioning::file_extension;
use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Longest sanitized title used in a file name
const MAX_TITLE_LEN: usize = 100;

/// Options for [`download_resources`]
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// File name prefix, usually the source directory name
    pub source: String,
    /// Resource formats to keep (case-insensitive); `None` keeps all
    pub formats: Option<Vec<String>>,
    pub concurrency: usize,
    /// Delay before each download starts
    pub rate_limit: Duration,
    /// Skip files that already exist
    pub resume: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            source: "unknown".to_string(),
            formats: None,
            concurrency: 4,
            rate_limit: Duration::from_millis(500),
            resume: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded { bytes: usize },
    Skipped,
    Failed { error: String },
}

/// Result of one resource download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub url: String,
    pub path: PathBuf,
    pub outcome: DownloadOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub total: usize,
    pub results: Vec<DownloadResult>,
}

impl DownloadSummary {
    fn count(&self, f: impl Fn(&DownloadOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| f(&r.outcome)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, DownloadOutcome::Downloaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DownloadOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DownloadOutcome::Failed { .. }))
    }
}

/// Turns dataset titles into portable file names
pub struct FilenameSanitizer {
    invalid: Regex,
    whitespace: Regex,
}

impl FilenameSanitizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            invalid: Regex::new(r#"[<>:"/\\|?*]"#)?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    pub fn sanitize(&self, name: &str) -> String {
        let name = self.invalid.replace_all(name, "_");
        let name = self.whitespace.replace_all(&name, "_");
        let name: String = name
            .trim_matches(|c| c == '_' || c == '.')
            .chars()
            .take(MAX_TITLE_LEN)
            .collect();

        if name.is_empty() {
            "unnamed".to_string()
        } else {
            name
        }
    }
}

/// File extension for a catalog resource format
pub fn extension_for_format(format: &str) -> String {
    let format = format.trim().to_lowercase();
    match format.as_str() {
        "esri rest" => "json".to_string(),
        "shapefile" => "zip".to_string(),
        _ => file_extension(&format),
    }
}

#[derive(Debug, Clone)]
struct PlannedDownload {
    url: String,
    path: PathBuf,
}

fn plan_downloads(
    datasets: &[DatasetSummary],
    output_dir: &Path,
    options: &DownloadOptions,
    sanitizer: &FilenameSanitizer,
) -> Vec<PlannedDownload> {
    let filter: Option<Vec<String>> = options
        .formats
        .as_ref()
        .map(|formats| formats.iter().map(|f| f.to_lowercase()).collect());

    let mut planned = Vec::new();
    for (dataset_idx, dataset) in datasets.iter().enumerate() {
        let title = dataset
            .title
            .clone()
            .unwrap_or_else(|| format!("dataset_{dataset_idx}"));
        let safe_title = sanitizer.sanitize(&title);

        for (res_idx, resource) in dataset.resources.iter().enumerate() {
            let Some(url) = resource.url.as_deref().filter(|u| !u.is_empty()) else {
                continue;
            };

            let format = resource.format.as_deref().unwrap_or_default();
            if let Some(filter) = &filter {
                if !filter.contains(&format.to_lowercase()) {
                    continue;
                }
            }

            let filename = format!(
                "{}_{}_{}.{}",
                options.source,
                safe_title,
                res_idx,
                extension_for_format(format)
            );
            planned.push(PlannedDownload {
                url: url.to_string(),
                path: output_dir.join(filename),
            });
        }
    }
    planned
}

async fn download_one(client: &Client, item: PlannedDownload, rate_limit: Duration) -> DownloadResult {
    if !rate_limit.is_zero() {
        tokio::time::sleep(rate_limit).await;
    }

    let outcome = match fetch_bytes(client, &item.url).await {
        Ok(bytes) => match tokio::fs::write(&item.path, &bytes).await {
            Ok(()) => DownloadOutcome::Downloaded { bytes: bytes.len() },
            Err(e) => DownloadOutcome::Failed {
                error: e.to_string(),
            },
        },
        Err(error) => DownloadOutcome::Failed { error },
    };

    DownloadResult {
        url: item.url,
        path: item.path,
        outcome,
    }
}

async fn fetch_bytes(client: &Client, url: &str) -> std::result::Result<Vec<u8>, String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| e.without_url().to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {status}"));
    }
    Ok(response
        .bytes()
        .await
        .map_err(|e| e.without_url().to_string())?
        .to_vec())
}

/// Download the resource files of catalog entries into `output_dir`
///
/// Individual download failures are reported in the summary, not returned as
/// errors. `progress` is called once per resource as results arrive.
pub async fn download_resources(
    client: &Client,
    datasets: &[DatasetSummary],
    output_dir: &Path,
    options: &DownloadOptions,
    mut progress: impl FnMut(&DownloadResult),
) -> Result<DownloadSummary> {
    tokio::fs::create_dir_all(output_dir).await?;

    let sanitizer = FilenameSanitizer::new()?;
    let planned = plan_downloads(datasets, output_dir, options, &sanitizer);
    let mut summary = DownloadSummary {
        total: planned.len(),
        results: Vec::with_capacity(planned.len()),
    };

    let mut pending = Vec::new();
    for item in planned {
        if options.resume && item.path.exists() {
            let result = DownloadResult {
                url: item.url,
                path: item.path,
                outcome: DownloadOutcome::Skipped,
            };
            progress(&result);
            summary.results.push(result);
        } else {
            pending.push(item);
        }
    }

    debug!(pending = pending.len(), concurrency = options.concurrency, "Starting downloads");

    let mut downloads = stream::iter(pending)
        .map(|item| download_one(client, item, options.rate_limit))
        .buffer_unordered(options.concurrency.max(1));

    while let Some(result) = downloads.next().await {
        if let DownloadOutcome::Failed { error } = &result.outcome {
            warn!(url = %result.url, error = %error, "Download failed");
        }
        progress(&result);
        summary.results.push(result);
    }

    Ok(summary)
}

/// File format for FRED observation exports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Result of exporting one series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationExport {
    pub series_id: String,
    pub result: std::result::Result<(PathBuf, usize), String>,
}

fn encode_observations(observations: &[FredObservation], format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(observations)?),
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer.write_record(["date", "value"])?;
            for obs in observations {
                writer.write_record([obs.date.as_str(), obs.value.as_str()])?;
            }
            writer
                .into_inner()
                .map_err(|e| IngestError::Io(e.into_error()))
        }
    }
}

/// Write one observation file per series, `fred_{id}_observations.{ext}`
pub async fn download_fred_observations(
    client: &FredClient,
    api_key: &str,
    series: &[DatasetSummary],
    output_dir: &Path,
    format: ExportFormat,
) -> Result<Vec<ObservationExport>> {
    tokio::fs::create_dir_all(output_dir).await?;

    let mut exports = Vec::new();
    for series_id in series.iter().filter_map(|s| s.id.as_deref()) {
        let path = output_dir.join(format!(
            "fred_{series_id}_observations.{}",
            format.extension()
        ));

        let result = async {
            let observations = client.observations(api_key, series_id).await?;
            tokio::fs::write(&path, encode_observations(&observations, format)?).await?;
            Ok::<_, IngestError>(observations.len())
        }
        .await;

        exports.push(ObservationExport {
            series_id: series_id.to_string(),
            result: result.map(|count| (path, count)).map_err(|e| e.to_string()),
        });
    }

    Ok(exports)
}
