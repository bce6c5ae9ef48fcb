//! Append-only CSV record of package sizes
//!
//! Several `arcpkg` processes may append at once, so every append holds an
//! exclusive advisory lock for the duration of the write.

use crate::error::Result;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const HEADER: [&str; 7] = [
    "Date",
    "Collection ID",
    "Type",
    "Package",
    "Files",
    "Extent",
    "Extent (MB)",
];

/// One row of the extent log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtentEvent {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Collection ID")]
    pub collection_id: String,
    #[serde(rename = "Type")]
    pub bag_type: String,
    #[serde(rename = "Package")]
    pub bag_id: String,
    #[serde(rename = "Files")]
    pub files: u64,
    #[serde(rename = "Extent")]
    pub extent: String,
    #[serde(rename = "Extent (MB)")]
    pub megabytes: u64,
}

#[derive(Debug, Clone)]
pub struct ExtentLog {
    path: PathBuf,
}

impl ExtentLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `events` as one uninterrupted group of rows
    pub fn append(&self, events: &[ExtentEvent]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&self.path)?;

        file.lock_exclusive()?;
        let written = write_rows(&file, events);
        let unlocked = FileExt::unlock(&file);
        written?;
        unlocked?;

        info!(path = %self.path.display(), rows = events.len(), "Appended to extent log");
        Ok(())
    }

    /// All rows, oldest first. A missing log reads as empty.
    pub fn read_all(&self) -> Result<Vec<ExtentEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let rows = reader
            .deserialize()
            .collect::<std::result::Result<Vec<ExtentEvent>, _>>()?;
        Ok(rows)
    }
}

fn write_rows(file: &File, events: &[ExtentEvent]) -> Result<()> {
    let needs_header = file.metadata()?.len() == 0;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if needs_header {
        debug!("Writing extent log header");
        writer.write_record(HEADER)?;
    }
    for event in events {
        writer.serialize(event)?;
    }
    writer.flush()?;
    let mut inner = writer.into_inner().map_err(|e| e.into_error())?;
    inner.flush()?;
    Ok(())
}
