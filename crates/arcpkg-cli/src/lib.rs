//! arcpkg CLI Library
//!
//! Builds archival packages (AIPs) from submission packages (SIPs) and the
//! processing backlog, and retires the SIP once the AIP is verified.
//!
//! # Overview
//!
//! - **Accession**: turn a folder of digitized files into a SIP plus a
//!   backlog working copy (`arcpkg accession`)
//! - **Packaging**: build, verify and finalize the AIP, then remove the SIP
//!   and backlog (`arcpkg package`)
//! - **Manual SIP removal** after an update-mode run (`arcpkg remove-sip`)
//! - **Inspection**: lifecycle state and bag validation (`arcpkg status`,
//!   `arcpkg validate`)

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod bag;
pub mod commands;
pub mod config;
pub mod error;
pub mod extent_log;
pub mod fsops;
pub mod lifecycle;
pub mod manifest;
pub mod package;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod transfer;

pub use config::{Config, Layout};
pub use error::{CliError, Result};
pub use manifest::{DiffReport, Manifest};
pub use pipeline::{PackagingPipeline, PipelineOptions, PipelineReport, PipelineStage};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// arcpkg - archival package lifecycle manager
#[derive(Parser, Debug)]
#[command(name = "arcpkg")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file
    #[arg(long, env = "ARCPKG_CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the AIP for a backlog package and retire its SIP
    Package {
        /// Package ID in the processing directory (e.g. ua435_Xy7...)
        package: String,

        /// Package master files from the processing backlog instead of the SIP.
        /// The SIP is kept and must be removed with `remove-sip`.
        #[arg(short, long)]
        update: bool,

        /// Do not package derivatives (for when masters double as derivatives)
        #[arg(short = 'n', long = "noderivatives")]
        no_derivatives: bool,
    },

    /// Create a SIP from a folder of newly digitized files
    Accession {
        /// Collection identifier
        collection: String,

        /// Folder whose contents become the SIP payload; emptied afterwards
        source: PathBuf,
    },

    /// Remove a SIP once its AIP exists and validates
    RemoveSip {
        /// Package ID
        package: String,
    },

    /// Show where a package is in its lifecycle
    Status {
        /// Package ID
        package: String,

        /// Fully validate the AIP if present
        #[arg(long)]
        verify: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate any bag against its own manifests
    Validate {
        /// Bag directory
        path: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_package_flags() {
        let cli = Cli::try_parse_from(["arcpkg", "package", "ua435_abc", "-u", "-n"]).unwrap();
        match cli.command {
            Commands::Package {
                package,
                update,
                no_derivatives,
            } => {
                assert_eq!(package, "ua435_abc");
                assert!(update);
                assert!(no_derivatives);
            },
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["arcpkg", "package", "ua435_abc", "--noderivatives"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Package {
                update: false,
                no_derivatives: true,
                ..
            }
        ));
    }

    #[test]
    fn test_package_requires_id() {
        assert!(Cli::try_parse_from(["arcpkg", "package"]).is_err());
    }
}
