//! Error types for the arcpkg CLI
//!
//! Every variant is user-facing: it names what failed, which package it
//! concerns, and what state the filesystem was left in so an operator can
//! repair the package without re-digitizing it.

use crate::manifest::DiffReport;
use crate::pipeline::PipelineStage;
use arcpkg_common::ArcpkgError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Comprehensive error type for packaging operations
#[derive(Error, Debug)]
pub enum CliError {
    /// A pipeline stage failed; wraps the underlying cause
    #[error("Packaging '{package}' failed at stage {stage}: {source}")]
    Stage {
        package: String,
        stage: PipelineStage,
        #[source]
        source: Box<CliError>,
    },

    /// Backlog or SIP is missing a required piece; raised before any mutation
    #[error("Package '{package}' is not valid: {reason}. Nothing was modified.")]
    Structural { package: String, reason: String },

    /// Directory is not a well-formed bag, or fails its own fixity check
    #[error("Invalid bag at '{path}': {problems}")]
    InvalidBag { path: String, problems: String },

    /// Bulk copy exhausted its retry budget
    #[error("Copy from '{from}' to '{to}' failed after {attempts} attempts: {last_error}. The partial copy was left in place and nothing was deleted.")]
    Transfer {
        from: String,
        to: String,
        attempts: u32,
        last_error: String,
    },

    /// AIP masters do not match the SIP manifest
    #[error("AIP '{package}' does not conform to the SIP manifest ({} missing, {} changed, {} extra). SIP, AIP and backlog were retained.", .report.missing.len(), .report.changed.len(), .report.extra.len())]
    Reconciliation { package: String, report: DiffReport },

    /// Attempt to delete a SIP without a verified downstream AIP
    #[error("Refusing to remove SIP '{package}': {reason}. A valid AIP must be present first.")]
    LifecycleSafety { package: String, reason: String },

    /// Directory removal exhausted its retry budget
    #[error("Could not remove '{path}' after {attempts} attempts; {} entries remain: {}", .remaining.len(), .remaining.join(", "))]
    RemovalFailed {
        path: String,
        attempts: u32,
        remaining: Vec<String>,
    },

    /// `IngestFiles` called with something other than masters/derivatives
    #[error("'{0}' is not a valid subfolder of the AIP data directory (expected masters or derivatives)")]
    InvalidKind(String),

    /// Target package directory already exists
    #[error("'{0}' already exists. Remove or inspect it before packaging again.")]
    AlreadyExists(String),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check ARCPKG_* environment variables or the config file.")]
    Config(String),

    #[error(transparent)]
    Common(#[from] ArcpkgError),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Extent log error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to parse config file: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create a structural error
    pub fn structural(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Structural {
            package: package.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid bag error
    pub fn invalid_bag(path: impl AsRef<std::path::Path>, problems: impl Into<String>) -> Self {
        Self::InvalidBag {
            path: path.as_ref().display().to_string(),
            problems: problems.into(),
        }
    }

    /// Create a lifecycle safety error
    pub fn lifecycle_safety(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LifecycleSafety {
            package: package.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Attach the pipeline stage and package to an error
    pub fn at_stage(self, package: impl Into<String>, stage: PipelineStage) -> Self {
        match self {
            already @ Self::Stage { .. } => already,
            other => Self::Stage {
                package: package.into(),
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through stage wrappers
    pub fn root_cause(&self) -> &CliError {
        match self {
            Self::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
