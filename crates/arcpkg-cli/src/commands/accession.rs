//! `arcpkg accession` command implementation
//!
//! Creates a SIP and backlog working copy from a folder of new files.

use crate::config::Config;
use crate::error::Result;
use crate::extent_log::ExtentLog;
use crate::package::SubmissionPackage;
use crate::progress::with_spinner;
use colored::Colorize;
use std::path::Path;

pub fn run(config: &Config, collection: &str, source: &Path) -> Result<()> {
    let layout = config.layout();
    let transfer = config.resilient_transfer();
    let extent_log = config.extent_log.clone().map(ExtentLog::new);

    let (sip, report) = with_spinner(&format!("Accessioning {}", source.display()), || {
        let mut sip =
            SubmissionPackage::create(&layout, collection, &config.sip_profile, config.algorithm)?;
        let report = sip.accession(source, &layout, &transfer)?;
        sip.finalize(extent_log.as_ref())?;
        Ok::<_, crate::error::CliError>((sip, report))
    })?;

    println!("{} SIP {}", "✓".green(), sip.id().package_id().bold());
    println!("  Path:    {}", sip.path().display());
    println!("  Backlog: {}", layout.backlog_dir(sip.id()).display());
    println!("  Items:   {}", report.items);
    if let Ok(extent) = sip.base().size() {
        println!("  Extent:  {extent} ({} files)", extent.file_count);
    }
    Ok(())
}
