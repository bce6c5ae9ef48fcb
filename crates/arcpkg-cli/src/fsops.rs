//! Filesystem housekeeping: retried tree removal, empty-dir pruning and
//! junk-file cleaning.

use crate::error::{CliError, Result};
use crate::retry::{retry, RetryPolicy};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Operating-system artifacts that never belong in a package (compared
/// case-insensitively)
pub const JUNK_FILES: [&str; 3] = ["thumbs.db", "desktop.ini", ".ds_store"];

pub fn is_junk(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    JUNK_FILES.contains(&lower.as_str())
}

/// Deletes a directory tree. A trait so tests can simulate locked files.
pub trait Remover: Send + Sync {
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct StdRemover;

impl Remover for StdRemover {
    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }
}

/// Remove `path` and everything under it, retrying per `policy`.
///
/// Returns the number of attempts used, or `Ok(0)` when the path was
/// already gone. On exhaustion the error lists what is still on disk.
pub fn remove_tree(path: &Path, policy: &RetryPolicy, remover: &dyn Remover) -> Result<u32> {
    if !path.exists() {
        debug!(path = %path.display(), "Nothing to remove");
        return Ok(0);
    }

    let outcome = retry(
        policy,
        |_| match remover.remove_dir_all(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        },
        |attempt, e| {
            warn!(attempt, path = %path.display(), error = %e, "Removal attempt failed");
        },
    );

    match outcome {
        Ok(done) => {
            info!(path = %path.display(), attempts = done.attempts, "Removed");
            Ok(done.attempts)
        },
        Err(exhausted) => {
            let remaining = describe_contents(path);
            for entry in &remaining {
                warn!(path = %entry, "Still present after removal attempts");
            }
            Err(CliError::RemovalFailed {
                path: path.display().to_string(),
                attempts: exhausted.attempts,
                remaining,
            })
        },
    }
}

/// Remove `dir` only if it exists and is empty
pub fn prune_empty_dir(dir: &Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    if fs::read_dir(dir)?.next().is_some() {
        return Ok(false);
    }
    fs::remove_dir(dir)?;
    info!(path = %dir.display(), "Removed empty directory");
    Ok(true)
}

/// Everything still under `dir`, as display paths. Best effort.
pub fn describe_contents(dir: &Path) -> Vec<String> {
    WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.path().display().to_string())
        .collect()
}

/// Delete junk files anywhere under `root`. Directories are never touched,
/// and running it twice is a no-op the second time.
pub fn clean_tree(root: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    if !root.is_dir() {
        return Ok(removed);
    }
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if is_junk(&entry.file_name().to_string_lossy()) {
            fs::remove_file(entry.path())?;
            debug!(path = %entry.path().display(), "Removed junk file");
            removed.push(entry.into_path());
        }
    }
    if !removed.is_empty() {
        info!(root = %root.display(), count = removed.len(), "Cleaned junk files");
    }
    Ok(removed)
}
