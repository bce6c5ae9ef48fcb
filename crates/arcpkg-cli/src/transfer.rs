//! Bulk directory copies with bounded retries
//!
//! [`Transfer`] is the seam between retry logic and the actual copy
//! mechanism: [`NativeTransfer`] copies with the standard library,
//! [`RsyncTransfer`] shells out to `rsync -arv --partial`. Both resume a
//! half-finished copy without re-copying files that already arrived intact.

use crate::error::{CliError, Result};
use crate::retry::{retry, RetryPolicy};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const PARTIAL_SUFFIX: &str = ".arcpkg-partial";

/// What a successful copy attempt reported
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOutput {
    pub stdout: String,
    pub stderr: String,
    pub files_copied: u64,
    pub files_skipped: u64,
    /// Symlinks and other non-regular entries that were not copied
    pub entries_skipped: Vec<String>,
}

/// A failed copy attempt, with whatever diagnostics the backend captured
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransferFailure {
    pub message: String,
    pub stdout: String,
    pub stderr: String,
}

impl TransferFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

impl From<std::io::Error> for TransferFailure {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<walkdir::Error> for TransferFailure {
    fn from(e: walkdir::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// One attempt at copying the contents of `source` into `destination`
pub trait Transfer: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Copy the contents of `source` into `destination`, creating it if
    /// needed. Must be safe to call again after a partial failure.
    fn copy(&self, source: &Path, destination: &Path) -> std::result::Result<TransferOutput, TransferFailure>;
}

/// Copies with `std::fs`; resumable by size + modification time
#[derive(Debug, Clone, Default)]
pub struct NativeTransfer;

impl Transfer for NativeTransfer {
    fn name(&self) -> &str {
        "native"
    }

    fn copy(&self, source: &Path, destination: &Path) -> std::result::Result<TransferOutput, TransferFailure> {
        if !source.is_dir() {
            return Err(TransferFailure::new(format!(
                "source '{}' is not a directory",
                source.display()
            )));
        }
        fs::create_dir_all(destination)?;

        let mut output = TransferOutput::default();
        let mut log = String::new();
        for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let target = destination.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if !entry.file_type().is_file() {
                warn!(
                    path = %entry.path().display(),
                    "Skipping entry that is not a regular file"
                );
                output.entries_skipped.push(relative.display().to_string());
                continue;
            }
            if is_up_to_date(entry.path(), &target)? {
                output.files_skipped += 1;
                continue;
            }
            copy_via_partial(entry.path(), &target)?;
            output.files_copied += 1;
            log.push_str(&relative.display().to_string());
            log.push('\n');
        }
        log.push_str(&format!(
            "copied {} files, {} already up to date\n",
            output.files_copied, output.files_skipped
        ));
        output.stdout = log;
        Ok(output)
    }
}

/// Copies by running `rsync -arv --partial source/ destination/`
#[derive(Debug, Clone)]
pub struct RsyncTransfer {
    binary: PathBuf,
}

impl RsyncTransfer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for RsyncTransfer {
    fn default() -> Self {
        Self::new("rsync")
    }
}

impl Transfer for RsyncTransfer {
    fn name(&self) -> &str {
        "rsync"
    }

    fn copy(&self, source: &Path, destination: &Path) -> std::result::Result<TransferOutput, TransferFailure> {
        fs::create_dir_all(destination)?;
        let args = [
            "-arv".to_string(),
            "--partial".to_string(),
            with_trailing_slash(source),
            with_trailing_slash(destination),
        ];
        info!(command = %format!("{} {}", self.binary.display(), args.join(" ")), "Running copy");

        let result = Command::new(&self.binary).args(&args).output().map_err(|e| {
            TransferFailure::new(format!("failed to start {}: {e}", self.binary.display()))
        })?;
        let stdout = String::from_utf8_lossy(&result.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&result.stderr).into_owned();

        if result.status.success() {
            Ok(TransferOutput {
                stdout,
                stderr,
                ..TransferOutput::default()
            })
        } else {
            Err(TransferFailure {
                message: format!("rsync exited with {}", result.status),
                stdout,
                stderr,
            })
        }
    }
}

/// Summary of a completed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub attempts: u32,
    pub output: TransferOutput,
}

/// Retries a [`Transfer`] up to the policy's attempt budget
pub struct ResilientTransfer {
    backend: Box<dyn Transfer>,
    policy: RetryPolicy,
}

impl ResilientTransfer {
    pub fn new(backend: Box<dyn Transfer>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Copy `source` into `destination`, retrying failed attempts.
    ///
    /// Exhausting the budget is fatal: the caller must not go on to
    /// reconcile or delete anything.
    pub fn copy(&self, source: &Path, destination: &Path) -> Result<TransferReport> {
        let backend = self.backend.name();
        let outcome = retry(
            &self.policy,
            |attempt| {
                info!(
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    at = %Local::now().to_rfc3339(),
                    backend,
                    from = %source.display(),
                    to = %destination.display(),
                    "Copy attempt"
                );
                self.backend.copy(source, destination)
            },
            |attempt, failure| {
                warn!(
                    attempt,
                    at = %Local::now().to_rfc3339(),
                    error = %failure.message,
                    stdout = %failure.stdout,
                    stderr = %failure.stderr,
                    "Copy failed"
                );
            },
        );

        match outcome {
            Ok(done) => {
                info!(
                    attempts = done.attempts,
                    at = %Local::now().to_rfc3339(),
                    files_copied = done.value.files_copied,
                    files_skipped = done.value.files_skipped,
                    "Copy completed"
                );
                debug!(stdout = %done.value.stdout, stderr = %done.value.stderr, "Copy output");
                Ok(TransferReport {
                    attempts: done.attempts,
                    output: done.value,
                })
            },
            Err(exhausted) => Err(CliError::Transfer {
                from: source.display().to_string(),
                to: destination.display().to_string(),
                attempts: exhausted.attempts,
                last_error: exhausted.error.message,
            }),
        }
    }
}

fn with_trailing_slash(path: &Path) -> String {
    let mut s = path.display().to_string();
    if !s.ends_with('/') {
        s.push('/');
    }
    s
}

fn is_up_to_date(source: &Path, target: &Path) -> std::io::Result<bool> {
    let Ok(target_meta) = fs::metadata(target) else {
        return Ok(false);
    };
    let source_meta = fs::metadata(source)?;
    Ok(target_meta.is_file()
        && target_meta.len() == source_meta.len()
        && target_meta.modified().ok() == source_meta.modified().ok())
}

/// Copy into a sibling partial file, stamp the source mtime, then rename so
/// the target name only ever holds complete files.
fn copy_via_partial(source: &Path, target: &Path) -> std::io::Result<()> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = target.with_file_name(format!(".{file_name}{PARTIAL_SUFFIX}"));

    fs::copy(source, &partial)?;
    let modified = fs::metadata(source)?.modified()?;
    fs::File::options()
        .write(true)
        .open(&partial)?
        .set_modified(modified)?;
    fs::rename(&partial, target)
}

/// Copy a single file into `dir`, keeping its name, permissions and mtime
pub fn copy_file_into(source: &Path, dir: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let name = source.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("'{}' has no file name", source.display()),
        )
    })?;
    let target = dir.join(name);
    copy_via_partial(source, &target)?;
    Ok(target)
}
