//! `arcpkg package` command implementation
//!
//! Runs the packaging pipeline for one backlog package.

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{PackagingPipeline, PipelineOptions, PipelineStage};
use crate::progress::with_spinner;
use colored::Colorize;

pub fn run(config: &Config, package: &str, update: bool, no_derivatives: bool) -> Result<()> {
    let pipeline = PackagingPipeline::new(config);
    let options = PipelineOptions {
        update,
        no_derivatives,
    };
    let report = with_spinner(&format!("Packaging {package}"), || {
        pipeline.run(package, options)
    })?;

    println!("{} AIP {}", "✓".green(), report.package.bold());
    println!("  Path:   {}", report.aip_path.display());
    println!("  Extent: {} ({} files)", report.extent, report.files);

    match report.outcome {
        PipelineStage::RetainedForManualRemoval => {
            println!();
            println!(
                "{} Update mode: the SIP was not checked against these masters and was kept.",
                "!".yellow()
            );
            println!("  Remove it once satisfied: arcpkg remove-sip {}", report.package);
        },
        _ => {
            println!("  AIP masters conform to SIP manifest; SIP and backlog removed.");
        },
    }
    if !report.backlog_collection_remaining.is_empty() {
        println!(
            "  Kept backlog collection directory ({} entries remain)",
            report.backlog_collection_remaining.len()
        );
    }
    Ok(())
}
