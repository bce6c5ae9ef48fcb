//! BagIt container handling
//!
//! Both SIPs and AIPs are stored as bags:
//!
//! ```text
//! {bag}/
//! ├── bagit.txt
//! ├── bag-info.txt
//! ├── manifest-sha256.txt       # hash  data/<path>
//! ├── tagmanifest-sha256.txt    # every other tag file
//! ├── data/                     # payload
//! └── metadata/, SIP/, logs/    # tag directories (AIP only)
//! ```

use crate::error::{CliError, Result};
use crate::manifest::{list_files, DiffReport, Manifest};
use arcpkg_common::{ChecksumAlgorithm, PayloadOxum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const BAGIT_TXT: &str = "bagit.txt";
pub const BAG_INFO_TXT: &str = "bag-info.txt";
pub const DATA_DIR: &str = "data";

const BAGIT_DECLARATION: &str = "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n";
const STAGING_DIR: &str = ".arcpkg-payload";

/// Ordered `bag-info.txt` key/value pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagInfo {
    fields: Vec<(String, String)>,
}

impl BagInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`BagInfo::set`]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set `key`, keeping its original position if it already exists
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse `Key: Value` lines; indented lines continue the previous value
    pub fn parse(text: &str) -> Result<Self> {
        let mut info = Self::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = info.fields.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                    continue;
                }
            }
            let (key, value) = line.split_once(':').ok_or_else(|| {
                CliError::invalid_bag(BAG_INFO_TXT, format!("malformed line {line:?}"))
            })?;
            info.fields
                .push((key.trim().to_string(), value.trim().to_string()));
        }
        Ok(info)
    }

    pub fn render(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{k}: {v}\n"))
            .collect()
    }
}

/// Result of a bag's self-consistency check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagValidation {
    /// `(declared, actual)` when Payload-Oxum disagrees with the payload
    pub oxum_mismatch: Option<(PayloadOxum, PayloadOxum)>,
    /// Payload manifest vs `data/`, paths relative to the bag
    pub payload: DiffReport,
    /// Tag manifest vs tag files
    pub tags: DiffReport,
}

impl BagValidation {
    pub fn is_ok(&self) -> bool {
        self.oxum_mismatch.is_none() && self.payload.is_ok() && self.tags.is_ok()
    }

    /// Operator-facing summary of everything that failed
    pub fn describe(&self) -> String {
        let mut out = String::new();
        if let Some((declared, actual)) = self.oxum_mismatch {
            out.push_str(&format!(
                "Payload-Oxum declares {declared} but payload is {actual}\n"
            ));
        }
        out.push_str(&self.payload.describe());
        out.push_str(&self.tags.describe());
        out
    }
}

/// A bag on disk
#[derive(Debug, Clone)]
pub struct Bag {
    path: PathBuf,
    info: BagInfo,
    algorithms: Vec<ChecksumAlgorithm>,
}

impl Bag {
    /// Turn `dir` into a bag.
    ///
    /// Anything already inside `dir` becomes payload. `dir` is created if it
    /// does not exist.
    pub fn create(dir: impl AsRef<Path>, info: BagInfo, algorithm: ChecksumAlgorithm) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let staging = dir.join(STAGING_DIR);
        fs::create_dir(&staging)?;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_name() == STAGING_DIR {
                continue;
            }
            fs::rename(entry.path(), staging.join(entry.file_name()))?;
        }
        fs::rename(&staging, dir.join(DATA_DIR))?;

        fs::write(dir.join(BAGIT_TXT), BAGIT_DECLARATION)?;

        let mut info = info;
        if info.get("Bag-Software-Agent").is_none() {
            info.set(
                "Bag-Software-Agent",
                format!("arcpkg {}", env!("CARGO_PKG_VERSION")),
            );
        }
        let mut bag = Self {
            path: dir.to_path_buf(),
            info,
            algorithms: vec![algorithm],
        };
        bag.save()?;
        info!(path = %dir.display(), "Created bag");
        Ok(bag)
    }

    /// Open an existing bag, checking only its structure
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(CliError::invalid_bag(dir, "directory does not exist"));
        }

        let mut problems = Vec::new();
        if !dir.join(BAGIT_TXT).is_file() {
            problems.push(format!("missing {BAGIT_TXT}"));
        }
        if !dir.join(BAG_INFO_TXT).is_file() {
            problems.push(format!("missing {BAG_INFO_TXT}"));
        }
        if !dir.join(DATA_DIR).is_dir() {
            problems.push(format!("missing {DATA_DIR}/ payload directory"));
        }
        let algorithms: Vec<_> = ChecksumAlgorithm::ALL
            .into_iter()
            .filter(|alg| dir.join(alg.manifest_file_name()).is_file())
            .collect();
        if algorithms.is_empty() {
            problems.push("no payload manifest (manifest-<algorithm>.txt)".to_string());
        }
        if !problems.is_empty() {
            return Err(CliError::invalid_bag(dir, problems.join(", ")));
        }

        let info = BagInfo::parse(&fs::read_to_string(dir.join(BAG_INFO_TXT))?)?;
        debug!(path = %dir.display(), ?algorithms, "Opened bag");
        Ok(Self {
            path: dir.to_path_buf(),
            info,
            algorithms,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data_dir(&self) -> PathBuf {
        self.path.join(DATA_DIR)
    }

    pub fn info(&self) -> &BagInfo {
        &self.info
    }

    /// Mutable metadata; persisted by the next [`Bag::save`]
    pub fn info_mut(&mut self) -> &mut BagInfo {
        &mut self.info
    }

    pub fn algorithms(&self) -> &[ChecksumAlgorithm] {
        &self.algorithms
    }

    /// Strongest algorithm with a payload manifest
    pub fn primary_algorithm(&self) -> ChecksumAlgorithm {
        self.algorithms
            .iter()
            .copied()
            .max_by_key(|alg| *alg as u8)
            .unwrap_or_default()
    }

    /// Declared Payload-Oxum, if any
    pub fn payload_oxum(&self) -> Result<Option<PayloadOxum>> {
        self.info
            .get("Payload-Oxum")
            .map(|v| v.parse::<PayloadOxum>().map_err(CliError::from))
            .transpose()
    }

    /// Load the payload manifest for `algorithm`
    pub fn payload_manifest(&self, algorithm: ChecksumAlgorithm) -> Result<Manifest> {
        Manifest::load(self.path.join(algorithm.manifest_file_name()), algorithm)
    }

    /// Recompute payload manifests, Payload-Oxum and tag manifests
    pub fn save(&mut self) -> Result<()> {
        let data_dir = self.data_dir();
        let oxum = measure_payload(&data_dir)?;
        self.info.set("Payload-Oxum", oxum.to_string());

        for algorithm in &self.algorithms {
            let manifest = Manifest::compute(&data_dir, *algorithm)?.rebase("", DATA_DIR)?;
            manifest.save(self.path.join(algorithm.manifest_file_name()))?;
        }
        fs::write(self.path.join(BAG_INFO_TXT), self.info.render())?;

        for algorithm in &self.algorithms {
            let tags = Manifest::compute_filtered(&self.path, *algorithm, is_tag_file)?;
            tags.save(self.path.join(algorithm.tag_manifest_file_name()))?;
        }

        info!(
            path = %self.path.display(),
            payload_oxum = %oxum,
            "Saved bag manifests"
        );
        Ok(())
    }

    /// Full fixity check of the bag against its own manifests
    pub fn validate(&self) -> Result<BagValidation> {
        let mut validation = BagValidation::default();
        let data_dir = self.data_dir();

        if let Some(declared) = self.payload_oxum()? {
            let actual = measure_payload(&data_dir)?;
            if declared != actual {
                validation.oxum_mismatch = Some((declared, actual));
            }
        }

        for algorithm in &self.algorithms {
            let expected = self.payload_manifest(*algorithm)?.rebase(DATA_DIR, "")?;
            let payload = expected.diff(&data_dir)?.prefixed(DATA_DIR);
            merge(&mut validation.payload, payload);

            let tag_manifest = self.path.join(algorithm.tag_manifest_file_name());
            if tag_manifest.is_file() {
                let expected = Manifest::load(&tag_manifest, *algorithm)?;
                let tags = expected.diff_filtered(&self.path, is_tag_file)?;
                merge(&mut validation.tags, tags);
            }
        }

        if validation.is_ok() {
            info!(path = %self.path.display(), "Bag is valid");
        } else {
            warn!(
                path = %self.path.display(),
                diagnosis = %validation.describe(),
                "Bag failed validation"
            );
        }
        Ok(validation)
    }

    pub fn is_valid(&self) -> Result<bool> {
        Ok(self.validate()?.is_ok())
    }
}

/// Files covered by the tag manifest: everything outside `data/` except the
/// tag manifests themselves
fn is_tag_file(relative: &str) -> bool {
    if relative.starts_with("data/") {
        return false;
    }
    !(!relative.contains('/') && relative.starts_with("tagmanifest-"))
}

/// Total bytes and file count under `data_dir`
pub fn measure_payload(data_dir: &Path) -> Result<PayloadOxum> {
    let mut oxum = PayloadOxum::default();
    for (_, full) in list_files(data_dir)? {
        oxum.total_bytes += fs::metadata(&full)?.len();
        oxum.file_count += 1;
    }
    Ok(oxum)
}

fn merge(into: &mut DiffReport, from: DiffReport) {
    for (target, source) in [
        (&mut into.missing, from.missing),
        (&mut into.changed, from.changed),
        (&mut into.extra, from.extra),
    ] {
        for path in source {
            if !target.contains(&path) {
                target.push(path);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_info() -> BagInfo {
        BagInfo::new()
            .with("Bag-Type", "SIP")
            .with("Collection-Identifier", "apap101")
            .with("Bag-Identifier", "apap101_abc")
    }

    #[test]
    fn test_bag_info_parse_render_keeps_order() {
        let text = "Bag-Type: AIP\nBag-Identifier: x_1\nExternal-Description: a long\n  wrapped value\n";
        let info = BagInfo::parse(text).unwrap();
        assert_eq!(info.get("bag-type"), Some("AIP"));
        assert_eq!(info.get("External-Description"), Some("a long wrapped value"));

        let mut info = info;
        info.set("Bag-Type", "SIP");
        let keys: Vec<_> = info.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Bag-Type", "Bag-Identifier", "External-Description"]);
        assert!(info.render().starts_with("Bag-Type: SIP\n"));
    }

    #[test]
    fn test_create_moves_existing_content_into_payload() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("bag");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("img001.tif"), "pixels").unwrap();
        fs::write(dir.join("sub/img002.tif"), "more pixels").unwrap();

        let bag = Bag::create(&dir, sample_info(), ChecksumAlgorithm::Sha256).unwrap();

        assert!(dir.join("data/img001.tif").is_file());
        assert!(dir.join("data/sub/img002.tif").is_file());
        assert!(!dir.join(STAGING_DIR).exists());
        assert_eq!(bag.payload_oxum().unwrap(), Some(PayloadOxum::new(17, 2)));

        let manifest = fs::read_to_string(dir.join("manifest-sha256.txt")).unwrap();
        assert!(manifest.contains("  data/img001.tif\n"));
        assert!(manifest.contains("  data/sub/img002.tif\n"));
        assert!(dir.join("tagmanifest-sha256.txt").is_file());
    }

    #[test]
    fn test_open_reports_structural_problems() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join(BAGIT_TXT), BAGIT_DECLARATION).unwrap();

        let err = Bag::open(root.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing bag-info.txt"));
        assert!(message.contains("missing data/"));
        assert!(message.contains("no payload manifest"));

        assert!(Bag::open(root.path().join("nope")).is_err());
    }

    #[test]
    fn test_fresh_bag_validates_and_reopens() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("bag");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.txt"), "a").unwrap();
        Bag::create(&dir, sample_info(), ChecksumAlgorithm::Sha512).unwrap();

        let bag = Bag::open(&dir).unwrap();
        assert_eq!(bag.algorithms(), &[ChecksumAlgorithm::Sha512]);
        assert_eq!(bag.info().get("Bag-Identifier"), Some("apap101_abc"));
        assert!(bag.is_valid().unwrap());
    }

    #[test]
    fn test_validate_detects_payload_and_tag_tampering() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("bag");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.txt"), "a").unwrap();
        let bag = Bag::create(&dir, sample_info(), ChecksumAlgorithm::Sha256).unwrap();

        fs::write(dir.join("data/a.txt"), "tampered").unwrap();
        fs::write(dir.join("data/stray.txt"), "x").unwrap();
        fs::write(dir.join(BAG_INFO_TXT), "Bag-Type: AIP\n").unwrap();

        let validation = bag.validate().unwrap();
        assert!(!validation.is_ok());
        assert!(validation.oxum_mismatch.is_some());
        assert_eq!(validation.payload.changed, vec!["data/a.txt"]);
        assert_eq!(validation.payload.extra, vec!["data/stray.txt"]);
        assert_eq!(validation.tags.changed, vec![BAG_INFO_TXT]);
    }

    #[cfg(unix)]
    #[test]
    fn test_names_with_newline_and_percent_validate() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("bag");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("box1\nfolder2.tif"), "one").unwrap();
        fs::write(dir.join("100%.tif"), "two").unwrap();
        Bag::create(&dir, sample_info(), ChecksumAlgorithm::Sha256).unwrap();

        let manifest = fs::read_to_string(dir.join("manifest-sha256.txt")).unwrap();
        assert!(manifest.contains("  data/box1%0Afolder2.tif\n"));
        assert!(manifest.contains("  data/100%25.tif\n"));

        let bag = Bag::open(&dir).unwrap();
        assert!(bag.is_valid().unwrap());
    }

    #[test]
    fn test_save_covers_tag_directories() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("bag");
        let mut bag = Bag::create(&dir, sample_info(), ChecksumAlgorithm::Sha256).unwrap();

        fs::create_dir_all(dir.join("metadata")).unwrap();
        fs::write(dir.join("metadata/desc.tsv"), "title").unwrap();
        assert!(!bag.is_valid().unwrap());

        bag.save().unwrap();
        let tags = fs::read_to_string(dir.join("tagmanifest-sha256.txt")).unwrap();
        assert!(tags.contains("  metadata/desc.tsv\n"));
        assert!(tags.contains("  manifest-sha256.txt\n"));
        assert!(!tags.contains("tagmanifest"));
        assert!(bag.is_valid().unwrap());
    }

    #[test]
    fn test_is_tag_file() {
        assert!(is_tag_file("bagit.txt"));
        assert!(is_tag_file("manifest-sha256.txt"));
        assert!(is_tag_file("SIP/tagmanifest-sha256.txt"));
        assert!(!is_tag_file("tagmanifest-md5.txt"));
        assert!(!is_tag_file("data/x"));
    }
}
