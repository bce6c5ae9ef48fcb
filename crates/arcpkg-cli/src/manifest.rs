//! Checksum manifests and three-way reconciliation
//!
//! A manifest is an ordered list of `(relative path, hash)` pairs in the BagIt
//! text form, one `hash  path` line per file. Paths always use `/` and are
//! relative to whatever root the manifest describes. On disk, `%`, CR and LF
//! in paths are percent-encoded (`%25`, `%0D`, `%0A`) as BagIt requires.

use crate::error::{CliError, Result};
use arcpkg_common::checksum::compute_file_checksum;
use arcpkg_common::ChecksumAlgorithm;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// One line of a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub hash: String,
}

/// Ordered set of path→hash entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    algorithm: ChecksumAlgorithm,
    entries: Vec<ManifestEntry>,
    paths: HashSet<String>,
}

/// Outcome of comparing a manifest to the files actually on disk
///
/// A path appears in at most one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    /// Listed in the manifest, absent on disk
    pub missing: Vec<String>,
    /// Present on disk with a different hash
    pub changed: Vec<String>,
    /// Present on disk, not listed in the manifest
    pub extra: Vec<String>,
}

impl DiffReport {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty() && self.changed.is_empty() && self.extra.is_empty()
    }

    /// Re-root every reported path under `prefix`
    pub fn prefixed(self, prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        let apply = |paths: Vec<String>| {
            paths
                .into_iter()
                .map(|p| format!("{prefix}/{p}"))
                .collect::<Vec<_>>()
        };
        Self {
            missing: apply(self.missing),
            changed: apply(self.changed),
            extra: apply(self.extra),
        }
    }

    /// Multi-line, operator-facing diagnosis
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (title, paths) in [
            ("Missing files defined in manifest", &self.missing),
            ("Files defined in manifest have changed", &self.changed),
            ("Additional files not in manifest", &self.extra),
        ] {
            if paths.is_empty() {
                continue;
            }
            out.push_str(title);
            out.push_str(":\n");
            for path in paths {
                out.push('\t');
                out.push_str(path);
                out.push('\n');
            }
        }
        out
    }
}

impl Manifest {
    /// Create an empty manifest
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        Self {
            algorithm,
            entries: Vec::new(),
            paths: HashSet::new(),
        }
    }

    /// Hash every file under `root`
    pub fn compute(root: impl AsRef<Path>, algorithm: ChecksumAlgorithm) -> Result<Self> {
        Self::compute_filtered(root, algorithm, |_| true)
    }

    /// Hash every file under `root` whose relative path passes `include`
    pub fn compute_filtered(
        root: impl AsRef<Path>,
        algorithm: ChecksumAlgorithm,
        include: impl Fn(&str) -> bool,
    ) -> Result<Self> {
        let root = root.as_ref();
        let mut manifest = Self::new(algorithm);
        for (relative, full) in list_files(root)? {
            if !include(&relative) {
                continue;
            }
            let hash = compute_file_checksum(&full, algorithm)?;
            debug!(path = %relative, %hash, "Hashed file");
            manifest.push(relative, hash)?;
        }
        Ok(manifest)
    }

    /// Parse manifest text.
    ///
    /// The hash is separated from the path by one whitespace character, or
    /// by the usual two spaces; anything after that belongs to the path, so
    /// names starting with a space survive.
    pub fn parse(text: &str, algorithm: ChecksumAlgorithm) -> Result<Self> {
        let mut manifest = Self::new(algorithm);
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let (hash, rest) = line.split_once(char::is_whitespace).ok_or_else(|| {
                CliError::invalid_bag(
                    "manifest",
                    format!("line {} is not 'hash  path': {line:?}", line_no + 1),
                )
            })?;
            let path = rest.strip_prefix(' ').unwrap_or(rest);
            if path.is_empty() {
                return Err(CliError::invalid_bag(
                    "manifest",
                    format!("line {} has no path", line_no + 1),
                ));
            }
            manifest.push(decode_path(path), hash)?;
        }
        Ok(manifest)
    }

    /// Load a manifest file
    pub fn load(path: impl AsRef<Path>, algorithm: ChecksumAlgorithm) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(CliError::invalid_bag(
                path,
                "manifest file does not exist",
            ));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, algorithm).map_err(|e| match e {
            CliError::InvalidBag { problems, .. } => CliError::invalid_bag(path, problems),
            other => other,
        })
    }

    /// Save manifest to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.render())?;
        Ok(())
    }

    /// Render in BagIt text form
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}  {}\n", e.hash, encode_path(&e.path)))
            .collect()
    }

    /// Append an entry, rejecting duplicate paths
    pub fn push(&mut self, path: impl Into<String>, hash: impl Into<String>) -> Result<()> {
        let path = path.into();
        if !self.paths.insert(path.clone()) {
            return Err(CliError::invalid_bag(
                "manifest",
                format!("duplicate entry for '{path}'"),
            ));
        }
        self.entries.push(ManifestEntry {
            path,
            hash: hash.into().to_lowercase(),
        });
        Ok(())
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the leading `from` directory of every path with `to`.
    ///
    /// Both are directory prefixes without trailing slash; an empty string
    /// means the root. Every entry must start with `from`.
    pub fn rebase(&self, from: &str, to: &str) -> Result<Self> {
        let from = from.trim_end_matches('/');
        let to = to.trim_end_matches('/');
        let mut rebased = Self::new(self.algorithm);
        for entry in &self.entries {
            let rest = if from.is_empty() {
                Some(entry.path.as_str())
            } else {
                entry
                    .path
                    .strip_prefix(from)
                    .and_then(|r| r.strip_prefix('/'))
            };
            let rest = rest.ok_or_else(|| {
                CliError::invalid_bag(
                    "manifest",
                    format!("entry '{}' is not under '{from}/'", entry.path),
                )
            })?;
            let path = if to.is_empty() {
                rest.to_string()
            } else {
                format!("{to}/{rest}")
            };
            rebased.push(path, entry.hash.clone())?;
        }
        Ok(rebased)
    }

    /// Compare this manifest against the files under `actual_root`
    pub fn diff(&self, actual_root: impl AsRef<Path>) -> Result<DiffReport> {
        self.diff_filtered(actual_root, |_| true)
    }

    /// Like [`Manifest::diff`], but only files passing `include` can be extra.
    ///
    /// Each expected entry is checked in order: absent files are `missing`,
    /// present files are hashed and reported as `changed` on mismatch. A
    /// present file is covered either way and is never also reported as
    /// extra. An unreadable file aborts the whole diff.
    pub fn diff_filtered(
        &self,
        actual_root: impl AsRef<Path>,
        include: impl Fn(&str) -> bool,
    ) -> Result<DiffReport> {
        let actual_root = actual_root.as_ref();
        let mut uncovered: BTreeSet<String> = if actual_root.is_dir() {
            list_files(actual_root)?
                .into_iter()
                .map(|(relative, _)| relative)
                .filter(|relative| include(relative))
                .collect()
        } else {
            BTreeSet::new()
        };

        let mut report = DiffReport::default();
        for entry in &self.entries {
            let full = actual_root.join(&entry.path);
            if !full.is_file() {
                report.missing.push(entry.path.clone());
                continue;
            }
            uncovered.remove(&entry.path);
            let actual = compute_file_checksum(&full, self.algorithm)?;
            if !actual.eq_ignore_ascii_case(&entry.hash) {
                report.changed.push(entry.path.clone());
            }
        }
        report.extra = uncovered.into_iter().collect();

        info!(
            root = %actual_root.display(),
            expected = self.entries.len(),
            missing = report.missing.len(),
            changed = report.changed.len(),
            extra = report.extra.len(),
            "Manifest comparison finished"
        );
        Ok(report)
    }
}

/// Escape a path for a manifest line
fn encode_path(path: &str) -> String {
    path.replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Undo [`encode_path`]; other `%` sequences are kept literally
fn decode_path(path: &str) -> String {
    let mut decoded = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(pos) = rest.find('%') {
        decoded.push_str(&rest[..pos]);
        let escape = rest.get(pos..pos + 3).unwrap_or("");
        let replacement = match escape.to_ascii_uppercase().as_str() {
            "%25" => Some('%'),
            "%0D" => Some('\r'),
            "%0A" => Some('\n'),
            _ => None,
        };
        match replacement {
            Some(c) => {
                decoded.push(c);
                rest = &rest[pos + 3..];
            },
            None => {
                decoded.push('%');
                rest = &rest[pos + 1..];
            },
        }
    }
    decoded.push_str(rest);
    decoded
}

/// Every regular file under `root` as `(relative path, full path)`, sorted
pub(crate) fn list_files(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        files.push((relative_path(root, entry.path()), entry.into_path()));
    }
    Ok(files)
}

/// `path` relative to `root`, `/`-separated
pub(crate) fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
