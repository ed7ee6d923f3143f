//! `quarry run` command implementation
//!
//! Runs every dataset in a manifest and prints the run summary.

use crate::error::{CliError, Result};
use crate::progress::ProgressObserver;
use colored::Colorize;
use quarry_ingest::runner::{run_manifest, IngestionReport, RunOptions, RunOverrides};
use std::path::PathBuf;
use std::sync::Arc;

/// Run a manifest; fails when any dataset failed
pub async fn run(
    manifest: PathBuf,
    data_dir: Option<PathBuf>,
    api_key: Option<String>,
    dry_run: bool,
    force: bool,
) -> Result<()> {
    let report = run_manifest(
        &manifest,
        RunOverrides { data_dir, api_key },
        RunOptions { dry_run, force },
        Some(Arc::new(ProgressObserver::new())),
    )
    .await?;

    print_report(&report);

    if report.failed() > 0 {
        return Err(CliError::RunFailed {
            run_id: report.run_id.clone(),
            failed: report.failed(),
        });
    }

    Ok(())
}

fn print_report(report: &IngestionReport) {
    println!();
    println!("{}", "=".repeat(50));
    println!("Run ID: {}", report.run_id);
    println!("Status: {}", report.status);
    println!(
        "Datasets: {} succeeded, {} skipped, {} failed",
        report.succeeded(),
        report.skipped(),
        report.failed()
    );

    if report.failed() > 0 {
        println!();
        println!("{}", "Failed datasets:".red().bold());
        for result in report.failures() {
            println!(
                "  - {}: {}",
                result.dataset_id,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}
