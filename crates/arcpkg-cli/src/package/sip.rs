use super::{initial_bag_info, ArchivalPackage, PackageBase};
use crate::bag::Bag;
use crate::config::Layout;
use crate::error::{CliError, Result};
use crate::extent_log::ExtentLog;
use crate::fsops::{self, Remover};
use crate::manifest::list_files;
use crate::retry::RetryPolicy;
use crate::transfer::{copy_file_into, ResilientTransfer};
use arcpkg_common::{BagType, ChecksumAlgorithm, PackageId};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Backlog subdirectories prepared for every accessioned package
pub const BACKLOG_SUBDIRS: [&str; 3] = ["masters", "derivatives", "metadata"];

/// What [`SubmissionPackage::accession`] moved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessionReport {
    pub items: usize,
    pub junk_skipped: usize,
}

/// One payload file of a SIP, relative to `data/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryItem {
    pub path: String,
    pub bytes: u64,
}

/// A freshly digitized bundle awaiting preservation
#[derive(Debug, Clone)]
pub struct SubmissionPackage {
    base: PackageBase,
}

impl SubmissionPackage {
    /// Allocate a new package id in `collection` and create an empty SIP bag
    pub fn create(
        layout: &Layout,
        collection: &str,
        profile: &str,
        algorithm: ChecksumAlgorithm,
    ) -> Result<Self> {
        let id = PackageId::generate(collection)?;
        let dir = layout.sip_dir(&id);
        if dir.exists() {
            return Err(CliError::AlreadyExists(dir.display().to_string()));
        }
        let bag = Bag::create(&dir, initial_bag_info(BagType::Sip, &id, profile), algorithm)?;
        info!(package = %id, path = %dir.display(), "Created SIP");
        Ok(Self {
            base: PackageBase::new(id, BagType::Sip, bag),
        })
    }

    /// Open an existing SIP bag
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            base: PackageBase::open(path.as_ref(), BagType::Sip)?,
        })
    }

    pub fn base(&self) -> &PackageBase {
        &self.base
    }

    pub fn id(&self) -> &PackageId {
        self.base.id()
    }

    pub fn path(&self) -> &Path {
        self.base.path()
    }

    /// Bag fixity check; cheaper than reconciling against an AIP
    pub fn validate(&self) -> Result<bool> {
        self.base.validate()
    }

    /// Payload files in name order
    pub fn inventory(&self) -> Result<Vec<InventoryItem>> {
        list_files(&self.base.data_dir())?
            .into_iter()
            .map(|(path, full)| -> Result<InventoryItem> {
                let bytes = fs::metadata(&full)?.len();
                Ok(InventoryItem { path, bytes })
            })
            .collect()
    }

    /// Move the contents of `source_dir` into this SIP and the processing
    /// backlog.
    ///
    /// Top-level junk files are dropped; the rest is copied into both
    /// `data/` and `{backlog}/masters/`, then deleted from `source_dir`,
    /// which is itself removed once empty.
    pub fn accession(
        &mut self,
        source_dir: &Path,
        layout: &Layout,
        transfer: &ResilientTransfer,
    ) -> Result<AccessionReport> {
        let package = self.id().package_id().to_string();
        if !source_dir.is_dir() {
            return Err(CliError::structural(
                &package,
                format!("source '{}' is not a directory", source_dir.display()),
            ));
        }
        let masters = self.prepare_backlog(layout)?;
        let data = self.base.data_dir();

        let mut items: Vec<_> = fs::read_dir(source_dir)?.collect::<std::io::Result<_>>()?;
        items.sort_by_key(|e| e.file_name());

        let mut report = AccessionReport::default();
        for item in &items {
            let path = item.path();
            if item.file_type()?.is_dir() {
                let name = item.file_name();
                transfer.copy(&path, &data.join(&name))?;
                transfer.copy(&path, &masters.join(&name))?;
            } else if fsops::is_junk(&item.file_name().to_string_lossy()) {
                report.junk_skipped += 1;
                continue;
            } else {
                copy_file_into(&path, &data)?;
                copy_file_into(&path, &masters)?;
            }
            report.items += 1;
        }
        fsops::clean_tree(&data)?;
        fsops::clean_tree(&masters)?;

        for item in &items {
            let path = item.path();
            if item.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        fsops::prune_empty_dir(source_dir)?;

        info!(
            package = %package,
            items = report.items,
            source = %source_dir.display(),
            "Accessioned files"
        );
        Ok(report)
    }

    /// Create `{backlog}/{col}/{pkg}/{masters,derivatives,metadata}`
    fn prepare_backlog(&self, layout: &Layout) -> Result<std::path::PathBuf> {
        if !layout.backlog_root.is_dir() {
            return Err(CliError::structural(
                self.id().package_id(),
                format!(
                    "processing root '{}' does not exist",
                    layout.backlog_root.display()
                ),
            ));
        }
        let backlog = layout.backlog_dir(self.id());
        for sub in BACKLOG_SUBDIRS {
            fs::create_dir_all(backlog.join(sub))?;
        }
        Ok(backlog.join("masters"))
    }

    /// Write the ground-truth manifest and record the extent
    pub fn finalize(&mut self, extent_log: Option<&ExtentLog>) -> Result<()> {
        self.base.bag_mut().save()?;
        if let Some(log) = extent_log {
            self.base.append_extent_log(log)?;
        }
        Ok(())
    }

    /// Delete this SIP, but only once a matching AIP exists and validates.
    ///
    /// Any failed precondition returns [`CliError::LifecycleSafety`] without
    /// touching the filesystem. Returns the removal attempts used.
    pub fn safe_remove(
        &self,
        layout: &Layout,
        policy: &RetryPolicy,
        remover: &dyn Remover,
    ) -> Result<u32> {
        let package = self.id().package_id();
        let aip_dir = layout.aip_dir(self.id());
        if !aip_dir.is_dir() {
            return Err(CliError::lifecycle_safety(
                package,
                format!("no AIP at '{}'", aip_dir.display()),
            ));
        }

        let aip = ArchivalPackage::open(&aip_dir).map_err(|e| {
            CliError::lifecycle_safety(package, format!("AIP at '{}' cannot be opened: {e}", aip_dir.display()))
        })?;
        match aip.base().bag().info().get("Bag-Identifier") {
            Some(declared) if declared == package => {},
            other => {
                return Err(CliError::lifecycle_safety(
                    package,
                    format!(
                        "AIP at '{}' declares Bag-Identifier {:?}",
                        aip_dir.display(),
                        other.unwrap_or("<none>")
                    ),
                ))
            },
        }

        let validation = aip.base().validation()?;
        if !validation.is_ok() {
            warn!(package, diagnosis = %validation.describe(), "AIP failed validation; SIP kept");
            return Err(CliError::lifecycle_safety(
                package,
                format!("AIP at '{}' is not valid", aip_dir.display()),
            ));
        }

        info!(package, path = %self.path().display(), "AIP verified, removing SIP");
        fsops::remove_tree(self.path(), policy, remover)
    }
}
