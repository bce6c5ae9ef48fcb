use super::{initial_bag_info, PackageBase};
use crate::bag::{Bag, DATA_DIR};
use crate::config::Layout;
use crate::error::{CliError, Result};
use crate::fsops;
use crate::manifest::{DiffReport, Manifest};
use crate::retry::retry;
use crate::transfer::{copy_file_into, ResilientTransfer};
use arcpkg_common::{BagType, ChecksumAlgorithm, PackageId};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const METADATA_DIR: &str = "metadata";
pub const SIP_PROVENANCE_DIR: &str = "SIP";
pub const LOGS_DIR: &str = "logs";

/// Payload subfolders an AIP may receive files into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Masters,
    Derivatives,
}

impl PayloadKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            PayloadKind::Masters => "masters",
            PayloadKind::Derivatives => "derivatives",
        }
    }
}

impl std::str::FromStr for PayloadKind {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "masters" => Ok(PayloadKind::Masters),
            "derivatives" => Ok(PayloadKind::Derivatives),
            other => Err(CliError::InvalidKind(other.to_string())),
        }
    }
}

/// The long-term preservation bag
#[derive(Debug, Clone)]
pub struct ArchivalPackage {
    base: PackageBase,
}

impl ArchivalPackage {
    /// Create an empty AIP at `{aip_root}/{col}/{pkg}`. Never reuses a
    /// directory that already exists.
    pub fn create(
        layout: &Layout,
        id: &PackageId,
        profile: &str,
        algorithm: ChecksumAlgorithm,
    ) -> Result<Self> {
        let dir = layout.aip_dir(id);
        if dir.exists() {
            return Err(CliError::AlreadyExists(dir.display().to_string()));
        }
        let bag = Bag::create(&dir, initial_bag_info(BagType::Aip, id, profile), algorithm)?;
        info!(package = %id, path = %dir.display(), "Created AIP");
        Ok(Self {
            base: PackageBase::new(id.clone(), BagType::Aip, bag),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            base: PackageBase::open(path.as_ref(), BagType::Aip)?,
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

    fn tag_dir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.path().join(name);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn require_dir(&self, dir: &Path) -> Result<()> {
        if dir.is_dir() {
            Ok(())
        } else {
            Err(CliError::structural(
                self.id().package_id(),
                format!("'{}' is not a directory", dir.display()),
            ))
        }
    }

    /// Copy descriptive metadata into the `metadata/` tag directory
    pub fn ingest_metadata(&self, source_dir: &Path, transfer: &ResilientTransfer) -> Result<()> {
        self.require_dir(source_dir)?;
        let dest = self.tag_dir(METADATA_DIR)?;
        transfer.copy(source_dir, &dest)?;
        fsops::clean_tree(&dest)?;
        info!(package = %self.id(), from = %source_dir.display(), "Ingested metadata");
        Ok(())
    }

    /// Copy `source_dir` into `data/masters` or `data/derivatives`
    pub fn ingest_files(&self, kind: &str, source_dir: &Path, transfer: &ResilientTransfer) -> Result<()> {
        let kind: PayloadKind = kind.parse()?;
        self.require_dir(source_dir)?;
        let dest = self.base.data_dir().join(kind.dir_name());
        transfer.copy(source_dir, &dest)?;
        info!(
            package = %self.id(),
            kind = kind.dir_name(),
            from = %source_dir.display(),
            "Ingested files"
        );
        Ok(())
    }

    /// Copy the SIP's top-level tag files (bag-info, manifests) into `SIP/`
    pub fn ingest_sip_provenance(&self, sip_dir: &Path, transfer: &ResilientTransfer) -> Result<()> {
        self.require_dir(sip_dir)?;
        let dest = self.tag_dir(SIP_PROVENANCE_DIR)?;

        for entry in fs::read_dir(sip_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let source = entry.path();
            retry(
                transfer.policy(),
                |_| copy_file_into(&source, &dest),
                |attempt, e| warn!(attempt, file = %source.display(), error = %e, "Copy attempt failed"),
            )
            .map_err(|exhausted| CliError::Transfer {
                from: source.display().to_string(),
                to: dest.display().to_string(),
                attempts: exhausted.attempts,
                last_error: exhausted.error.to_string(),
            })?;
            debug!(file = %source.display(), "Copied SIP provenance file");
        }
        info!(package = %self.id(), "Ingested SIP provenance");
        Ok(())
    }

    /// Copy run logs that concern this package into `logs/`.
    ///
    /// A log matches when its name contains the package id, or its name
    /// contains the collection id and its contents mention the package id.
    pub fn ingest_logs(&self, log_dir: &Path) -> Result<Vec<PathBuf>> {
        let dest = self.tag_dir(LOGS_DIR)?;
        let mut copied = Vec::new();
        if !log_dir.is_dir() {
            warn!(log_dir = %log_dir.display(), "Log directory not found; no logs included");
            return Ok(copied);
        }

        let package = self.id().package_id();
        let collection = self.id().collection_id();
        let mut entries: Vec<_> = fs::read_dir(log_dir)?.collect::<std::io::Result<_>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let matches = if name.contains(package) {
                true
            } else if name.contains(collection) {
                let contents = fs::read(entry.path())?;
                String::from_utf8_lossy(&contents).contains(package)
            } else {
                false
            };
            if matches {
                copied.push(copy_file_into(&entry.path(), &dest)?);
            }
        }
        info!(package, count = copied.len(), "Included run logs");
        Ok(copied)
    }

    pub fn clean(&self) -> Result<Vec<PathBuf>> {
        self.base.clean()
    }

    /// Record Payload-Oxum and write the AIP's own manifests
    pub fn finalize(&mut self) -> Result<()> {
        self.base.bag_mut().save()?;
        info!(package = %self.id(), "AIP saved");
        Ok(())
    }

    /// The SIP manifest preserved under `SIP/`.
    ///
    /// Prefers `algorithm`, falling back to the strongest other manifest
    /// present. Having none is a structural failure.
    pub fn sip_provenance_manifest(&self, algorithm: ChecksumAlgorithm) -> Result<Manifest> {
        let dir = self.path().join(SIP_PROVENANCE_DIR);
        let candidates = std::iter::once(algorithm)
            .chain(ChecksumAlgorithm::ALL.into_iter().rev().filter(|a| *a != algorithm));
        for candidate in candidates {
            let path = dir.join(candidate.manifest_file_name());
            if path.is_file() {
                debug!(path = %path.display(), "Using SIP manifest");
                return Manifest::load(&path, candidate);
            }
        }
        Err(CliError::structural(
            self.id().package_id(),
            format!(
                "cannot validate against SIP manifest, no {} present",
                dir.join(algorithm.manifest_file_name()).display()
            ),
        ))
    }

    /// Compare `data/masters` with the SIP manifest.
    ///
    /// SIP paths `data/<p>` are expected at `data/masters/<p>`; the report
    /// lists paths as `masters/<p>`.
    pub fn reconcile_against_sip(&self, sip_manifest: &Manifest) -> Result<DiffReport> {
        let expected = sip_manifest.rebase(DATA_DIR, "")?;
        let masters = self.base.data_dir().join(PayloadKind::Masters.dir_name());
        let report = expected
            .diff(&masters)?
            .prefixed(PayloadKind::Masters.dir_name());
        if report.is_ok() {
            info!(package = %self.id(), files = expected.len(), "AIP masters conform to SIP manifest");
        }
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::transfer::NativeTransfer;
    use tempfile::TempDir;

    fn layout(root: &Path) -> Layout {
        Layout {
            backlog_root: root.join("backlog"),
            sip_root: root.join("SIP"),
            aip_root: root.join("AIP"),
        }
    }

    fn transfer() -> ResilientTransfer {
        ResilientTransfer::new(Box::new(NativeTransfer), RetryPolicy::transfer_default())
    }

    /// SIP-shaped directory with `img001.tif` and `img002.tif`
    fn sip_fixture(root: &Path) -> PathBuf {
        let sip = root.join("sip-src");
        fs::create_dir_all(&sip).unwrap();
        fs::write(sip.join("img001.tif"), "one").unwrap();
        fs::write(sip.join("img002.tif"), "two").unwrap();
        let bag = Bag::create(
            &sip,
            crate::bag::BagInfo::new().with("Bag-Type", "SIP"),
            ChecksumAlgorithm::Sha256,
        )
        .unwrap();
        bag.path().to_path_buf()
    }

    fn aip(root: &Path) -> ArchivalPackage {
        let id = PackageId::parse("ua435_pkg1").unwrap();
        ArchivalPackage::create(&layout(root), &id, "urn:aip", ChecksumAlgorithm::Sha256).unwrap()
    }

    #[test]
    fn test_create_refuses_existing_dir() {
        let temp = TempDir::new().unwrap();
        let first = aip(temp.path());
        assert_eq!(first.base().bag().info().get("Bag-Type"), Some("AIP"));
        assert_eq!(first.base().bag().info().get("Collection-Identifier"), Some("ua435"));

        let id = PackageId::parse("ua435_pkg1").unwrap();
        let err =
            ArchivalPackage::create(&layout(temp.path()), &id, "urn:aip", ChecksumAlgorithm::Sha256)
                .unwrap_err();
        assert!(matches!(err, CliError::AlreadyExists(_)));
    }

    #[test]
    fn test_ingest_files_rejects_unknown_kind() {
        let temp = TempDir::new().unwrap();
        let aip = aip(temp.path());
        let err = aip
            .ingest_files("thumbnails", temp.path(), &transfer())
            .unwrap_err();
        assert!(matches!(err, CliError::InvalidKind(kind) if kind == "thumbnails"));
    }

    #[test]
    fn test_reconcile_clean_copy_is_ok() {
        let temp = TempDir::new().unwrap();
        let sip = sip_fixture(temp.path());
        let aip = aip(temp.path());

        aip.ingest_sip_provenance(&sip, &transfer()).unwrap();
        aip.ingest_files("masters", &sip.join("data"), &transfer()).unwrap();

        let manifest = aip.sip_provenance_manifest(ChecksumAlgorithm::Sha256).unwrap();
        let report = aip.reconcile_against_sip(&manifest).unwrap();
        assert!(report.is_ok(), "{}", report.describe());
        assert!(aip.path().join("SIP/bag-info.txt").is_file());
        assert!(!aip.path().join("SIP/data").exists());
    }

    #[test]
    fn test_reconcile_reports_each_category_once() {
        let temp = TempDir::new().unwrap();
        let sip = sip_fixture(temp.path());
        let aip = aip(temp.path());
        aip.ingest_sip_provenance(&sip, &transfer()).unwrap();
        aip.ingest_files("masters", &sip.join("data"), &transfer()).unwrap();

        let masters = aip.base().data_dir().join("masters");
        fs::remove_file(masters.join("img002.tif")).unwrap();
        fs::write(masters.join("img001.tif"), "edited").unwrap();
        fs::write(masters.join("img999.tif"), "new").unwrap();

        let manifest = aip.sip_provenance_manifest(ChecksumAlgorithm::Sha256).unwrap();
        let report = aip.reconcile_against_sip(&manifest).unwrap();
        assert_eq!(report.missing, vec!["masters/img002.tif"]);
        assert_eq!(report.changed, vec!["masters/img001.tif"]);
        assert_eq!(report.extra, vec!["masters/img999.tif"]);
    }

    #[test]
    fn test_missing_sip_manifest_is_structural() {
        let temp = TempDir::new().unwrap();
        let aip = aip(temp.path());
        let err = aip
            .sip_provenance_manifest(ChecksumAlgorithm::Sha256)
            .unwrap_err();
        assert!(matches!(err, CliError::Structural { .. }));
    }

    #[test]
    fn test_ingest_logs_by_name_or_content() {
        let temp = TempDir::new().unwrap();
        let logs = temp.path().join("logs");
        fs::create_dir_all(&logs).unwrap();
        fs::write(logs.join("arcpkg-ua435_pkg1.log.2024-03-01"), "run").unwrap();
        fs::write(logs.join("ua435-batch.log"), "processed ua435_pkg1 ok").unwrap();
        fs::write(logs.join("ua435-other.log"), "processed ua435_pkg2").unwrap();
        fs::write(logs.join("unrelated.log"), "ua435_pkg1").unwrap();

        let aip = aip(temp.path());
        let copied = aip.ingest_logs(&logs).unwrap();
        let names: Vec<_> = copied
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["arcpkg-ua435_pkg1.log.2024-03-01", "ua435-batch.log"]);
    }

    #[test]
    fn test_metadata_cleaned_and_tagged() {
        let temp = TempDir::new().unwrap();
        let meta = temp.path().join("meta");
        fs::create_dir_all(meta.join("ead")).unwrap();
        fs::write(meta.join("ua435_pkg1.tsv"), "Type\tTitle\n").unwrap();
        fs::write(meta.join("desktop.ini"), "x").unwrap();
        fs::write(meta.join("ead/finding-aid.xml"), "<ead/>").unwrap();

        let mut aip = aip(temp.path());
        aip.ingest_metadata(&meta, &transfer()).unwrap();
        aip.finalize().unwrap();

        assert!(aip.path().join("metadata/ead/finding-aid.xml").is_file());
        assert!(!aip.path().join("metadata/desktop.ini").exists());
        let tags = fs::read_to_string(aip.path().join("tagmanifest-sha256.txt")).unwrap();
        assert!(tags.contains("metadata/ead/finding-aid.xml"));
        assert!(aip.base().validate().unwrap());
    }
}
