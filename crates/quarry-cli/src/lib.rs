//! Quarry CLI Library
//!
//! Command-line interface for manifest-driven ingestion of public datasets.
//!
//! # Overview
//!
//! - **Ingestion**: Run every dataset in a manifest (`quarry run`)
//! - **Status**: Inspect the local version store (`quarry status`)
//! - **Catalog export**: Search a source and write summaries, optionally
//!   downloading resource files (`quarry fetch`)

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod commands;
pub mod error;
pub mod progress;

// Re-export commonly used types
pub use error::{CliError, Result};

use clap::{Args, Parser, Subcommand, ValueEnum};
use quarry_ingest::{SourceKind, StoreType};
use std::path::PathBuf;

/// Quarry - manifest-driven ingestion for data.gov and FRED
#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the command reference as markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run manifest-driven ingestion
    Run {
        /// Path to manifest YAML/JSON file
        #[arg(short, long)]
        manifest: PathBuf,

        /// Override the manifest's output directory
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// FRED API key (or set FRED_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Fetch only; persist nothing
        #[arg(long)]
        dry_run: bool,

        /// Ingest even when content is unchanged
        #[arg(long)]
        force: bool,
    },

    /// Show datasets and recent runs in a data directory
    Status {
        /// Path to data directory
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Store type (structured-db, flat-file); detected when omitted
        #[arg(long)]
        store_type: Option<StoreType>,
    },

    /// Search a source catalog and export dataset summaries
    Fetch(FetchArgs),
}

/// Arguments for `quarry fetch`
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Source to search (data.gov, fred)
    pub source: SourceKind,

    /// Search query
    #[arg(long, default_value = "*:*")]
    pub query: String,

    /// Max datasets to fetch
    #[arg(long, default_value_t = 25)]
    pub limit: usize,

    /// Output directory
    #[arg(long, default_value = "output")]
    pub output: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// API key for the source
    #[arg(long)]
    pub api_key: Option<String>,

    /// Download resource files
    #[arg(long)]
    pub download_resources: bool,

    /// Directory for downloads
    #[arg(long, default_value = "downloads")]
    pub download_dir: PathBuf,

    /// Resource formats to download (all when omitted)
    #[arg(long, num_args = 1..)]
    pub download_formats: Option<Vec<String>>,

    /// Parallel downloads
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// (FRED) Download observations instead of resources
    #[arg(long)]
    pub download_observations: bool,
}

/// File format for `quarry fetch` summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}
