//! `quarry status` command implementation
//!
//! Shows registered datasets and recent runs for a data directory.

use crate::error::Result;
use colored::Colorize;
use quarry_ingest::versioning::{detect_store_type, open_store_at};
use quarry_ingest::StoreType;
use std::path::PathBuf;

/// Number of runs listed
const RECENT_RUNS: usize = 5;

/// Show the contents of a version store
pub async fn run(data_dir: PathBuf, store_type: Option<StoreType>) -> Result<()> {
    let store_type = store_type.unwrap_or_else(|| detect_store_type(&data_dir));
    let store = open_store_at(&data_dir, store_type)?;

    println!("Data directory: {}", data_dir.display());
    println!("Store type: {}", store_type);
    println!();

    let datasets = store.datasets().await?;
    if datasets.is_empty() {
        println!("No datasets ingested yet.");
        println!("Run 'quarry run --manifest <file>' to ingest datasets.");
    } else {
        println!("{}", format!("Datasets ({}):", datasets.len()).cyan().bold());
        for dataset in &datasets {
            let last_updated = dataset
                .last_updated
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  - {} ({}) - last updated: {}",
                dataset.id.green(),
                dataset.source,
                last_updated
            );
        }
    }

    let runs = store.runs(RECENT_RUNS).await?;
    if !runs.is_empty() {
        println!();
        println!("{}", "Recent runs:".cyan().bold());
        for run in &runs {
            println!(
                "  - {} ({}) - {} - {}",
                run.run_id,
                run.manifest_name,
                run.status,
                run.started_at.to_rfc3339()
            );
        }
    }

    Ok(())
}
