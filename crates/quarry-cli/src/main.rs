//! Quarry CLI - Main entry point

use clap::{CommandFactory, Parser};
use quarry_cli::{Cli, Commands};
use quarry_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use quarry_ingest::ManifestFile;
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // Pick up API keys and endpoint overrides from .env
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    let Some(command) = &cli.command else {
        let _ = Cli::command().print_help();
        return;
    };

    let log_config = LogConfig::builder()
        .level(log_level(cli.verbose, command))
        .output(LogOutput::Console)
        .log_file_prefix("quarry-cli")
        .build();

    // Environment variables take precedence
    let log_config = match log_config.clone().merge_env() {
        Ok(merged) => merged,
        Err(e) => {
            eprintln!("Warning: ignoring logging environment: {}", e);
            log_config
        }
    };

    // The CLI still works without logging
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: failed to initialize logging: {}", e);
            None
        }
    };

    if let Err(e) = execute_command(command).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Debug with `--verbose`; `run` uses the manifest's `log_level`; warn otherwise
fn log_level(verbose: bool, command: &Commands) -> LogLevel {
    if verbose {
        return LogLevel::Debug;
    }

    match command {
        Commands::Run { manifest, .. } => ManifestFile::load(manifest)
            .ok()
            .and_then(|file| file.settings)
            .and_then(|settings| settings.log_level)
            .and_then(|level| level.parse().ok())
            .unwrap_or(LogLevel::Warn),
        _ => LogLevel::Warn,
    }
}

async fn execute_command(command: &Commands) -> quarry_cli::Result<()> {
    match command {
        Commands::Run {
            manifest,
            data_dir,
            api_key,
            dry_run,
            force,
        } => {
            quarry_cli::commands::run::run(
                manifest.clone(),
                data_dir.clone(),
                api_key.clone(),
                *dry_run,
                *force,
            )
            .await
        }

        Commands::Status {
            data_dir,
            store_type,
        } => quarry_cli::commands::status::run(data_dir.clone(), *store_type).await,

        Commands::Fetch(args) => quarry_cli::commands::fetch::run(args.clone()).await,
    }
}
