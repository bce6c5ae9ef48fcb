//! Build automation tasks for arcpkg
//!
//! This tool provides automation tasks for the arcpkg workspace, including:
//! - Generating the CLI reference from the clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for arcpkg", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    // Generate markdown from clap definitions
    let markdown = clap_markdown::help_markdown::<arcpkg_cli::Cli>();

    let content = format!(
        r#"# arcpkg CLI Reference

Generated from the CLI source code on {}.

## Overview

`arcpkg` turns digitized submission packages (SIPs) into archival packages
(AIPs). An AIP's masters are checked file by file against the SIP manifest
before the SIP and the processing backlog copy are deleted.

Typical flow:

```bash
# New scans become a SIP plus a backlog working copy
arcpkg accession ua435 /ingest/ua435-box3

# ...process derivatives and metadata in /backlog/ua435/<package>...

# Build the AIP, verify it, remove SIP and backlog
arcpkg package ua435_<id>

# Where is a package now?
arcpkg status ua435_<id> --verify
```

When masters were corrected in the backlog after accession, package with
`--update`. The SIP is then kept and must be removed explicitly once the AIP
has been reviewed:

```bash
arcpkg package ua435_<id> --update
arcpkg remove-sip ua435_<id>
```

## Commands

{}

## Configuration

Settings come from built-in defaults, then an optional TOML file
(`--config` or `ARCPKG_CONFIG`), then environment variables:

| Variable | Default |
|----------|---------|
| `ARCPKG_BACKLOG_ROOT` | `/backlog` |
| `ARCPKG_SIP_ROOT` | `/Archives/SIP` |
| `ARCPKG_AIP_ROOT` | `/Archives/AIP` |
| `ARCPKG_LOG_DIR` | `/logs` |
| `ARCPKG_EXTENT_LOG` | `/Archives/extent-log.csv` (`off` disables) |
| `ARCPKG_ALGORITHM` | `sha256` |
| `ARCPKG_TRANSFER` | `native` (or `rsync`) |

Logging honours `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT` and `LOG_FILTER`.

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    // Create output directory if it doesn't exist
    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("✅ Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
