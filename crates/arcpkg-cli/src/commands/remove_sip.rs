//! `arcpkg remove-sip` command implementation
//!
//! The explicit SIP removal step that follows an update-mode run.

use crate::config::Config;
use crate::error::Result;
use crate::fsops::{self, StdRemover};
use crate::package::SubmissionPackage;
use arcpkg_common::PackageId;
use colored::Colorize;

pub fn run(config: &Config, package: &str) -> Result<()> {
    let id = PackageId::parse(package)?;
    let layout = config.layout();
    let sip = SubmissionPackage::load(layout.sip_dir(&id))?;

    let attempts = sip.safe_remove(&layout, &config.removal_policy(), &StdRemover)?;
    fsops::prune_empty_dir(&layout.sip_collection(&id))?;

    println!(
        "{} Removed SIP {} ({} attempt{})",
        "✓".green(),
        package.bold(),
        attempts,
        if attempts == 1 { "" } else { "s" }
    );
    Ok(())
}
