//! The packaging run: SIP + backlog → AIP, then the lifecycle transition
//!
//! Stages run in a fixed order and every failure aborts the run. Nothing is
//! deleted before the finished AIP has been checked: against the SIP
//! manifest in standard mode, or against its own manifest in update mode.

use crate::config::{Config, Layout};
use crate::error::{CliError, Result};
use crate::extent_log::ExtentLog;
use crate::fsops::{self, Remover, StdRemover};
use crate::manifest::DiffReport;
use crate::package::{ArchivalPackage, SubmissionPackage};
use crate::retry::RetryPolicy;
use crate::transfer::{ResilientTransfer, Transfer};
use arcpkg_common::{ChecksumAlgorithm, PackageId};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Start,
    SipLoaded,
    SipValidated,
    AipCreated,
    MetadataIngested,
    FilesIngested,
    Cleaned,
    Finalized,
    Reconciled,
    SipRemoved,
    BacklogRemoved,
    ValidationFailed,
    RetainedForManualRemoval,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Start => "checking backlog",
            Self::SipLoaded => "loading SIP",
            Self::SipValidated => "validating SIP",
            Self::AipCreated => "creating AIP",
            Self::MetadataIngested => "ingesting metadata",
            Self::FilesIngested => "ingesting files",
            Self::Cleaned => "cleaning AIP",
            Self::Finalized => "finalizing AIP",
            Self::Reconciled => "reconciling against SIP manifest",
            Self::SipRemoved => "removing SIP",
            Self::BacklogRemoved => "removing backlog",
            Self::ValidationFailed => "validation failed",
            Self::RetainedForManualRemoval => "retaining SIP",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Take masters from the backlog instead of the SIP; skips
    /// reconciliation and SIP removal
    pub update: bool,
    /// Skip derivatives ingestion
    pub no_derivatives: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub package: String,
    pub stages: Vec<PipelineStage>,
    pub outcome: PipelineStage,
    pub aip_path: PathBuf,
    pub extent: String,
    pub files: u64,
    pub reconciliation: Option<DiffReport>,
    pub sip_removal_attempts: Option<u32>,
    pub backlog_removal_attempts: Option<u32>,
    /// Entries that kept the backlog collection directory alive
    pub backlog_collection_remaining: Vec<String>,
}

impl PipelineReport {
    fn new(package: impl Into<String>, aip_path: PathBuf) -> Self {
        Self {
            package: package.into(),
            stages: Vec::new(),
            outcome: PipelineStage::Start,
            aip_path,
            extent: String::new(),
            files: 0,
            reconciliation: None,
            sip_removal_attempts: None,
            backlog_removal_attempts: None,
            backlog_collection_remaining: Vec::new(),
        }
    }

    fn reached(&mut self, stage: PipelineStage) {
        info!(package = %self.package, %stage, "Stage complete");
        self.stages.push(stage);
        self.outcome = stage;
    }
}

pub struct PackagingPipeline {
    layout: Layout,
    algorithm: ChecksumAlgorithm,
    aip_profile: String,
    log_dir: PathBuf,
    extent_log: Option<ExtentLog>,
    transfer: ResilientTransfer,
    removal_policy: RetryPolicy,
    remover: Box<dyn Remover>,
}

impl PackagingPipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            layout: config.layout(),
            algorithm: config.algorithm,
            aip_profile: config.aip_profile.clone(),
            log_dir: config.log_dir.clone(),
            extent_log: config.extent_log.clone().map(ExtentLog::new),
            transfer: config.resilient_transfer(),
            removal_policy: config.removal_policy(),
            remover: Box::new(StdRemover),
        }
    }

    /// Replace the copy backend, keeping the configured retry policy
    pub fn with_transfer(mut self, backend: Box<dyn Transfer>) -> Self {
        self.transfer = ResilientTransfer::new(backend, *self.transfer.policy());
        self
    }

    pub fn with_remover(mut self, remover: Box<dyn Remover>) -> Self {
        self.remover = remover;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Package `package_id` and perform its lifecycle transition
    pub fn run(&self, package_id: &str, options: PipelineOptions) -> Result<PipelineReport> {
        let id = PackageId::parse(package_id)?;
        let package = id.package_id().to_string();
        let backlog = self.layout.backlog_dir(&id);
        let sip_dir = self.layout.sip_dir(&id);
        let aip_path = self.layout.aip_dir(&id);
        info!(
            package = %package,
            backlog = %backlog.display(),
            update = options.update,
            no_derivatives = options.no_derivatives,
            "Packaging"
        );

        let mut report = PipelineReport::new(package.clone(), aip_path);
        let at = |stage: PipelineStage| move |e: CliError| e.at_stage(package_id, stage);

        self.check_backlog(&id, options)
            .map_err(at(PipelineStage::Start))?;
        report.reached(PipelineStage::Start);

        let sip = SubmissionPackage::load(&sip_dir).map_err(at(PipelineStage::SipLoaded))?;
        report.reached(PipelineStage::SipLoaded);

        let validation = sip
            .base()
            .validation()
            .map_err(at(PipelineStage::SipValidated))?;
        if !validation.is_ok() {
            return Err(CliError::invalid_bag(sip.path(), validation.describe())
                .at_stage(package_id, PipelineStage::SipValidated));
        }
        report.reached(PipelineStage::SipValidated);

        let mut aip = ArchivalPackage::create(&self.layout, &id, &self.aip_profile, self.algorithm)
            .map_err(at(PipelineStage::AipCreated))?;
        report.reached(PipelineStage::AipCreated);

        aip.ingest_metadata(&backlog.join("metadata"), &self.transfer)
            .and_then(|()| aip.ingest_sip_provenance(sip.path(), &self.transfer))
            .map_err(at(PipelineStage::MetadataIngested))?;
        report.reached(PipelineStage::MetadataIngested);

        self.ingest_files(&aip, &sip, &backlog, options)
            .map_err(at(PipelineStage::FilesIngested))?;
        report.reached(PipelineStage::FilesIngested);

        aip.clean().map_err(at(PipelineStage::Cleaned))?;
        report.reached(PipelineStage::Cleaned);

        self.finalize(&mut aip, &mut report)
            .map_err(at(PipelineStage::Finalized))?;
        report.reached(PipelineStage::Finalized);

        if options.update {
            return self.finish_update(&id, &aip, report);
        }

        let manifest = aip
            .sip_provenance_manifest(self.algorithm)
            .map_err(at(PipelineStage::Reconciled))?;
        let diff = aip
            .reconcile_against_sip(&manifest)
            .map_err(at(PipelineStage::Reconciled))?;
        if !diff.is_ok() {
            error!(
                package = %package,
                diagnosis = %diff.describe(),
                "AIP does not conform to SIP manifest; nothing deleted"
            );
            return Err(CliError::Reconciliation {
                package: package.clone(),
                report: diff,
            }
            .at_stage(package_id, PipelineStage::Reconciled));
        }
        report.reconciliation = Some(diff);
        report.reached(PipelineStage::Reconciled);

        let attempts = sip
            .safe_remove(&self.layout, &self.removal_policy, self.remover.as_ref())
            .and_then(|attempts| {
                fsops::prune_empty_dir(&self.layout.sip_collection(&id))?;
                Ok(attempts)
            })
            .map_err(at(PipelineStage::SipRemoved))?;
        report.sip_removal_attempts = Some(attempts);
        report.reached(PipelineStage::SipRemoved);

        self.remove_backlog(&id, &mut report)
            .map_err(at(PipelineStage::BacklogRemoved))?;
        report.reached(PipelineStage::BacklogRemoved);

        info!(package = %package, "Packaging complete");
        Ok(report)
    }

    /// Backlog must have `derivatives/` and `metadata/` (and `masters/` in
    /// update mode) before anything is written
    fn check_backlog(&self, id: &PackageId, options: PipelineOptions) -> Result<()> {
        let backlog = self.layout.backlog_dir(id);
        let mut required = vec!["derivatives", "metadata"];
        if options.update {
            required.push("masters");
        }
        if !backlog.is_dir() {
            return Err(CliError::structural(
                id.package_id(),
                format!("backlog package '{}' does not exist", backlog.display()),
            ));
        }
        let missing: Vec<_> = required
            .into_iter()
            .filter(|sub| !backlog.join(sub).is_dir())
            .collect();
        if !missing.is_empty() {
            return Err(CliError::structural(
                id.package_id(),
                format!(
                    "backlog package '{}' is missing {}",
                    backlog.display(),
                    missing.join(", ")
                ),
            ));
        }
        Ok(())
    }

    fn ingest_files(
        &self,
        aip: &ArchivalPackage,
        sip: &SubmissionPackage,
        backlog: &std::path::Path,
        options: PipelineOptions,
    ) -> Result<()> {
        if options.no_derivatives {
            info!(package = %aip.id(), "Skipping derivatives");
        } else {
            aip.ingest_files("derivatives", &backlog.join("derivatives"), &self.transfer)?;
        }

        if options.update {
            info!(package = %aip.id(), "Taking masters from the processing backlog");
            aip.ingest_files("masters", &backlog.join("masters"), &self.transfer)
        } else {
            info!(package = %aip.id(), "Taking masters from the SIP");
            aip.ingest_files("masters", &sip.base().data_dir(), &self.transfer)
        }
    }

    fn finalize(&self, aip: &mut ArchivalPackage, report: &mut PipelineReport) -> Result<()> {
        aip.ingest_logs(&self.log_dir)?;
        aip.finalize()?;

        let extent = aip.base().size()?;
        report.extent = extent.to_string();
        report.files = extent.file_count;
        if let Some(log) = &self.extent_log {
            aip.base().append_extent_log(log)?;
        }
        Ok(())
    }

    /// Update mode: keep the SIP, drop the backlog only if the AIP checks out
    fn finish_update(
        &self,
        id: &PackageId,
        aip: &ArchivalPackage,
        mut report: PipelineReport,
    ) -> Result<PipelineReport> {
        let package = id.package_id();
        warn!(
            package,
            "Update mode: SIP reconciliation skipped; SIP must be removed manually"
        );

        let validation = aip
            .base()
            .validation()
            .map_err(|e| e.at_stage(package, PipelineStage::BacklogRemoved))?;
        if !validation.is_ok() {
            warn!(package, diagnosis = %validation.describe(), "AIP failed validation; backlog kept");
            return Err(CliError::invalid_bag(aip.path(), validation.describe())
                .at_stage(package, PipelineStage::ValidationFailed));
        }

        self.remove_backlog(id, &mut report)
            .map_err(|e| e.at_stage(package, PipelineStage::BacklogRemoved))?;
        report.reached(PipelineStage::BacklogRemoved);
        report.reached(PipelineStage::RetainedForManualRemoval);
        Ok(report)
    }

    fn remove_backlog(&self, id: &PackageId, report: &mut PipelineReport) -> Result<()> {
        let backlog = self.layout.backlog_dir(id);
        let attempts = fsops::remove_tree(&backlog, &self.removal_policy, self.remover.as_ref())?;
        report.backlog_removal_attempts = Some(attempts);

        let collection = self.layout.backlog_collection(id);
        if !fsops::prune_empty_dir(&collection)? && collection.is_dir() {
            let remaining: Vec<String> = std::fs::read_dir(&collection)?
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            info!(
                collection = %collection.display(),
                entries = remaining.len(),
                "Kept non-empty collection directory"
            );
            report.backlog_collection_remaining = remaining;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        assert_eq!(PipelineStage::Reconciled.to_string(), "reconciling against SIP manifest");
        assert_eq!(PipelineStage::SipValidated.to_string(), "validating SIP");
    }

    #[test]
    fn test_stage_error_wraps_once() {
        let err = CliError::structural("ua435_x", "no metadata")
            .at_stage("ua435_x", PipelineStage::Start)
            .at_stage("ua435_x", PipelineStage::SipLoaded);
        match &err {
            CliError::Stage { stage, .. } => assert_eq!(*stage, PipelineStage::Start),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.root_cause(), CliError::Structural { .. }));
        assert!(err.to_string().contains("checking backlog"));
    }

    #[test]
    fn test_update_mode_keeps_backlog_when_aip_is_invalid() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path();
        let config = Config {
            backlog_root: root.join("backlog"),
            sip_root: root.join("SIP"),
            aip_root: root.join("AIP"),
            log_dir: root.join("logs"),
            extent_log: None,
            removal_retry_delay_ms: 0,
            ..Config::default()
        };
        let pipeline = PackagingPipeline::new(&config);
        let id = PackageId::parse("ua435_pkg").unwrap();
        let backlog = pipeline.layout().backlog_dir(&id);
        std::fs::create_dir_all(backlog.join("masters")).unwrap();
        std::fs::write(backlog.join("masters/img001.tif"), "rescanned").unwrap();

        let mut aip =
            ArchivalPackage::create(pipeline.layout(), &id, "urn:aip", ChecksumAlgorithm::Sha256).unwrap();
        aip.ingest_files("masters", &backlog.join("masters"), &pipeline.transfer)
            .unwrap();
        aip.finalize().unwrap();
        std::fs::write(aip.path().join("data/masters/img001.tif"), "bit rot").unwrap();

        let report = PipelineReport::new("ua435_pkg", aip.path().to_path_buf());
        let err = pipeline.finish_update(&id, &aip, report).unwrap_err();

        match &err {
            CliError::Stage { stage, .. } => assert_eq!(*stage, PipelineStage::ValidationFailed),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.root_cause(), CliError::InvalidBag { .. }));
        assert!(backlog.join("masters/img001.tif").is_file());
    }
}
