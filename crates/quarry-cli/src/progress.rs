//! Progress indicators for CLI operations
//!
//! Bars draw to stderr and stay hidden when it is not a terminal. Result
//! lines always go to stdout.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use quarry_ingest::manifest::{DatasetSpec, Manifest};
use quarry_ingest::runner::{DatasetResult, DatasetStatus, IngestionReport, RunObserver};
use std::time::Duration;

/// Create a spinner for indeterminate operations
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a progress bar counting items
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb
}

/// Format bytes into human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// One printable line per finished dataset
pub fn result_line(result: &DatasetResult) -> String {
    match result.status {
        DatasetStatus::Success => {
            let detail = match result.row_count {
                Some(rows) => format!("{rows} rows"),
                None => "fetched".to_string(),
            };
            format!("{} {} ({})", "✓".green(), result.dataset_id, detail)
        }
        DatasetStatus::Skipped => {
            format!("{} {} (unchanged)", "→".yellow(), result.dataset_id)
        }
        DatasetStatus::Failed => format!(
            "{} {}: {}",
            "✗".red(),
            result.dataset_id,
            result.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Shows a bar over the manifest's datasets and prints each outcome
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self {
            bar: create_progress_bar(0, "Starting"),
        }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl RunObserver for ProgressObserver {
    fn run_started(&self, run_id: &str, manifest: &Manifest, dry_run: bool) {
        self.bar.set_length(manifest.sources.len() as u64);
        let mode = if dry_run { " (dry run)" } else { "" };
        self.bar.suspend(|| {
            println!(
                "{} {} [{}]{}",
                "Ingesting".cyan().bold(),
                manifest.name,
                run_id,
                mode
            );
        });
    }

    fn dataset_started(&self, _index: usize, _total: usize, spec: &DatasetSpec) {
        self.bar
            .set_message(format!("{} ({})", spec.id, spec.source()));
    }

    fn dataset_finished(&self, result: &DatasetResult) {
        let line = result_line(result);
        let warnings = &result.warnings;
        self.bar.suspend(|| {
            println!("  {line}");
            for warning in warnings {
                println!("    {} {}", "!".yellow(), warning);
            }
        });
        self.bar.inc(1);
    }

    fn run_finished(&self, _report: &IngestionReport) {
        self.bar.finish_and_clear();
    }
}
