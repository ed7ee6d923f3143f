//! Build automation tasks for Quarry
//!
//! - `generate-cli-docs`: write the CLI reference from the clap definitions

use anyhow::Context;
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for Quarry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &Path) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<quarry_cli::Cli>();

    let content = format!(
        r#"# Quarry CLI Reference

Generated from the CLI source code on {}.

## Quick Start

```bash
# Ingest every dataset in a manifest
quarry run --manifest manifests/phase1.yaml

# Re-ingest even when content is unchanged
quarry run --manifest manifests/phase1.yaml --force

# Inspect the local store
quarry status --data-dir ./data

# Export catalog summaries and download their files
quarry fetch data.gov --query "hospital" --limit 5 --download-resources
```

## Environment

| Variable | Purpose |
|----------|---------|
| `FRED_API_KEY` | FRED API key when not passed with `--api-key` |
| `DATA_GOV_API_KEY` | Optional data.gov API key |
| `QUARRY_DATA_GOV_URL` | data.gov catalog base URL |
| `QUARRY_FRED_URL` | FRED API base URL |
| `QUARRY_HTTP_TIMEOUT_SECS` | HTTP timeout in seconds |
| `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`, `LOG_FILTER` | Logging overrides |

{}
---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let file_path = output_dir.join("cli.md");
    fs::write(&file_path, content)
        .with_context(|| format!("Failed to write {}", file_path.display()))?;

    println!("✅ Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
