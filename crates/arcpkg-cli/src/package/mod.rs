//! Submission and archival packages
//!
//! Both kinds are bags identified by a [`PackageId`]; [`PackageBase`] holds
//! what they share: identity, junk cleaning and size accounting.

mod aip;
mod sip;

pub use aip::{ArchivalPackage, PayloadKind};
pub use sip::{AccessionReport, InventoryItem, SubmissionPackage};

use crate::bag::{Bag, BagInfo, BagValidation};
use crate::error::{CliError, Result};
use crate::extent_log::{ExtentEvent, ExtentLog};
use crate::fsops;
use arcpkg_common::{BagType, Extent, PackageId};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Identity and bag shared by SIPs and AIPs
#[derive(Debug, Clone)]
pub struct PackageBase {
    id: PackageId,
    bag_type: BagType,
    bag: Bag,
}

impl PackageBase {
    fn new(id: PackageId, bag_type: BagType, bag: Bag) -> Self {
        Self { id, bag_type, bag }
    }

    /// Open the bag at `path`, taking the package id from the directory name
    fn open(path: &Path, bag_type: BagType) -> Result<Self> {
        let bag = Bag::open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CliError::invalid_bag(path, "path has no directory name"))?;
        let id = PackageId::parse(&name)?;

        if let Some(declared) = bag.info().get("Bag-Identifier") {
            if declared != id.package_id() {
                tracing::warn!(
                    path = %path.display(),
                    declared,
                    "Bag-Identifier does not match directory name"
                );
            }
        }
        Ok(Self::new(id, bag_type, bag))
    }

    pub fn id(&self) -> &PackageId {
        &self.id
    }

    pub fn bag_type(&self) -> BagType {
        self.bag_type
    }

    pub fn bag(&self) -> &Bag {
        &self.bag
    }

    pub(crate) fn bag_mut(&mut self) -> &mut Bag {
        &mut self.bag
    }

    pub fn path(&self) -> &Path {
        self.bag.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.bag.data_dir()
    }

    /// Delete junk files from the payload
    pub fn clean(&self) -> Result<Vec<PathBuf>> {
        fsops::clean_tree(&self.data_dir())
    }

    /// Size recorded in Payload-Oxum at the last save
    pub fn size(&self) -> Result<Extent> {
        let oxum = self.bag.payload_oxum()?.ok_or_else(|| {
            CliError::invalid_bag(self.path(), "bag-info.txt has no Payload-Oxum")
        })?;
        Ok(oxum.extent())
    }

    pub fn validation(&self) -> Result<BagValidation> {
        self.bag.validate()
    }

    /// Self-consistency of the bag against its own manifests
    pub fn validate(&self) -> Result<bool> {
        Ok(self.validation()?.is_ok())
    }

    pub fn extent_event(&self) -> Result<ExtentEvent> {
        let extent = self.size()?;
        let info = self.bag.info();
        let field = |key: &str, fallback: &str| info.get(key).unwrap_or(fallback).to_string();
        Ok(ExtentEvent {
            date: field("Bagging-Date", ""),
            collection_id: field("Collection-Identifier", self.id.collection_id()),
            bag_type: field("Bag-Type", &self.bag_type.to_string()),
            bag_id: field("Bag-Identifier", self.id.package_id()),
            files: extent.file_count,
            extent: extent.to_string(),
            megabytes: extent.megabytes(),
        })
    }

    pub fn append_extent_log(&self, log: &ExtentLog) -> Result<()> {
        let event = self.extent_event()?;
        log.append(std::slice::from_ref(&event))?;
        info!(
            package = %self.id,
            bag_type = %self.bag_type,
            extent = %event.extent,
            files = event.files,
            "Recorded extent"
        );
        Ok(())
    }
}

/// Seed metadata common to new SIPs and AIPs
fn initial_bag_info(bag_type: BagType, id: &PackageId, profile: &str) -> BagInfo {
    let posix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    BagInfo::new()
        .with("Bag-Type", bag_type.to_string())
        .with(
            "Bagging-Date",
            Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        )
        .with("Posix-Date", posix.to_string())
        .with("BagIt-Profile-Identifier", profile)
        .with("Collection-Identifier", id.collection_id())
        .with("Bag-Identifier", id.package_id())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use arcpkg_common::ChecksumAlgorithm;
    use std::fs;
    use tempfile::TempDir;

    fn make_bag(root: &Path, name: &str) -> PackageBase {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("masters")).unwrap();
        fs::write(dir.join("masters/a.tif"), vec![0u8; 1536]).unwrap();
        fs::write(dir.join("masters/Thumbs.db"), "junk").unwrap();
        let id = PackageId::parse(name).unwrap();
        let info = initial_bag_info(BagType::Aip, &id, "urn:profile");
        let bag = Bag::create(&dir, info, ChecksumAlgorithm::Sha256).unwrap();
        PackageBase::new(id, BagType::Aip, bag)
    }

    #[test]
    fn test_initial_info_fields() {
        let id = PackageId::parse("ua435_abc").unwrap();
        let info = initial_bag_info(BagType::Sip, &id, "urn:sip");
        assert_eq!(info.get("Bag-Type"), Some("SIP"));
        assert_eq!(info.get("Collection-Identifier"), Some("ua435"));
        assert_eq!(info.get("Bag-Identifier"), Some("ua435_abc"));
        assert_eq!(info.get("BagIt-Profile-Identifier"), Some("urn:sip"));
        assert!(info.get("Posix-Date").unwrap().parse::<f64>().unwrap() > 0.0);
        let keys: Vec<_> = info.iter().map(|(k, _)| k).collect();
        assert_eq!(keys[0], "Bag-Type");
    }

    #[test]
    fn test_size_and_extent_event() {
        let temp = TempDir::new().unwrap();
        let base = make_bag(temp.path(), "ua435_pkg");

        let extent = base.size().unwrap();
        assert_eq!(extent.file_count, 2);

        let event = base.extent_event().unwrap();
        assert_eq!(event.bag_type, "AIP");
        assert_eq!(event.collection_id, "ua435");
        assert_eq!(event.bag_id, "ua435_pkg");
        assert_eq!(event.files, 2);
        assert_eq!(event.extent, "1.5 KB");
        assert_eq!(event.megabytes, 0);
    }

    #[test]
    fn test_clean_removes_only_junk() {
        let temp = TempDir::new().unwrap();
        let base = make_bag(temp.path(), "ua435_pkg");

        let removed = base.clean().unwrap();
        assert_eq!(removed.len(), 1);
        assert!(base.data_dir().join("masters/a.tif").exists());
        assert!(base.clean().unwrap().is_empty());
    }

    #[test]
    fn test_open_reads_id_from_directory() {
        let temp = TempDir::new().unwrap();
        let created = make_bag(temp.path(), "ua435-box2");
        let opened = PackageBase::open(created.path(), BagType::Aip).unwrap();
        assert_eq!(opened.id().collection_id(), "ua435");
        assert!(opened.validate().unwrap());
    }
}
