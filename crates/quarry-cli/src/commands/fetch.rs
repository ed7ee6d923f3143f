//! `quarry fetch` command implementation
//!
//! Searches a source catalog, writes the matching dataset summaries to a
//! timestamped JSON or CSV file and optionally downloads their resources.

use crate::error::Result;
use crate::progress::{create_spinner, format_bytes};
use crate::{FetchArgs, OutputFormat};
use chrono::Utc;
use colored::Colorize;
use quarry_ingest::config::{Credentials, SourceConfig};
use quarry_ingest::downloader::{
    download_fred_observations, download_resources, DownloadOptions, DownloadOutcome,
    DownloadResult, ExportFormat,
};
use quarry_ingest::sources::{DataGovClient, DatasetSummary, FredClient};
use quarry_ingest::SourceKind;
use std::path::{Path, PathBuf};

/// Search, export and optionally download
pub async fn run(args: FetchArgs) -> Result<()> {
    let config = SourceConfig::from_env()?;
    let client = config.http_client()?;

    let mut credentials = Credentials::default();
    if let Some(key) = &args.api_key {
        credentials = credentials.with_explicit(args.source, key.clone());
    }

    let spinner = create_spinner(&format!("Searching {}...", args.source));
    let fred = FredClient::new(client.clone(), &config.fred_url);
    let searched = match args.source {
        SourceKind::DataGov => {
            DataGovClient::new(client.clone(), &config.data_gov_url)
                .with_api_key(credentials.get(SourceKind::DataGov))
                .search(&args.query, Some(args.limit))
                .await
                .map(|packages| packages.iter().map(|p| p.summary()).collect::<Vec<_>>())
        }
        SourceKind::Fred => match credentials.require(SourceKind::Fred) {
            Ok(key) => fred
                .search_series(&key, &args.query, Some(args.limit))
                .await
                .map(|series| series.iter().map(|s| s.summary()).collect()),
            Err(e) => Err(e),
        },
    };
    spinner.finish_and_clear();
    let datasets = searched?;

    let output_path = write_summaries(&datasets, &args.output, args.source, args.format)?;
    println!(
        "{} Wrote {} datasets to {}",
        "✓".green(),
        datasets.len(),
        output_path.display()
    );

    if !args.download_resources {
        return Ok(());
    }

    println!();
    println!("Downloading resources to {}...", args.download_dir.display());

    if args.source == SourceKind::Fred && args.download_observations {
        let key = credentials.require(SourceKind::Fred)?;
        let exports = download_fred_observations(
            &fred,
            &key,
            &datasets,
            &args.download_dir,
            ExportFormat::Json,
        )
        .await?;

        for export in &exports {
            match &export.result {
                Ok((path, count)) => {
                    println!("  [OK] {} ({} observations)", path.display(), count)
                }
                Err(error) => println!("  [FAIL] {}: {}", export.series_id, error),
            }
        }

        let succeeded = exports.iter().filter(|e| e.result.is_ok()).count();
        println!();
        println!(
            "Downloaded {} observation files, {} failed",
            succeeded,
            exports.len() - succeeded
        );
    } else {
        let options = DownloadOptions {
            source: args.source.dir_name(),
            formats: args.download_formats.clone(),
            concurrency: args.concurrency,
            ..Default::default()
        };
        let summary = download_resources(
            &client,
            &datasets,
            &args.download_dir,
            &options,
            print_download,
        )
        .await?;

        println!();
        println!(
            "Download complete: {} succeeded, {} skipped, {} failed",
            summary.succeeded(),
            summary.skipped(),
            summary.failed()
        );
    }

    Ok(())
}

/// `{source}_datasets_{YYYYmmddHHMMSS}.{ext}` under `output_dir`
pub fn output_path(output_dir: &Path, source: SourceKind, format: OutputFormat) -> PathBuf {
    output_dir.join(format!(
        "{}_datasets_{}.{}",
        source,
        Utc::now().format("%Y%m%d%H%M%S"),
        format.extension()
    ))
}

/// Write summaries as a JSON array or as `title,description,resources` CSV
pub fn write_summaries(
    datasets: &[DatasetSummary],
    output_dir: &Path,
    source: SourceKind,
    format: OutputFormat,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_path(output_dir, source, format);

    match format {
        OutputFormat::Json => {
            std::fs::write(&path, serde_json::to_vec_pretty(datasets)?)?;
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(["title", "description", "resources"])?;
            for dataset in datasets {
                let resources = serde_json::to_string(&dataset.resources)?;
                writer.write_record([
                    dataset.title.as_deref().unwrap_or_default(),
                    dataset.description.as_deref().unwrap_or_default(),
                    resources.as_str(),
                ])?;
            }
            writer.flush()?;
        }
    }

    Ok(path)
}

fn print_download(result: &DownloadResult) {
    match &result.outcome {
        DownloadOutcome::Skipped => {
            println!("  [SKIP] {} (already exists)", result.path.display())
        }
        DownloadOutcome::Downloaded { bytes } => println!(
            "  [OK] {} ({})",
            result.path.display(),
            format_bytes(*bytes as u64)
        ),
        DownloadOutcome::Failed { error } => println!("  [FAIL] {}: {}", result.url, error),
    }
}
