//! `arcpkg status` command implementation
//!
//! Shows which copies of a package exist and what lifecycle state that implies.

use crate::config::Config;
use crate::error::Result;
use crate::lifecycle::LifecycleProbe;
use crate::package::SubmissionPackage;
use arcpkg_common::PackageId;
use colored::Colorize;
use std::path::PathBuf;

pub fn run(config: &Config, package: &str, verify: bool, json: bool) -> Result<()> {
    let id = PackageId::parse(package)?;
    let probe = LifecycleProbe::probe(&config.layout(), &id, verify)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&probe)?);
        return Ok(());
    }

    println!("{} {}", "Package:".cyan().bold(), probe.package);
    println!("{:<9} {}", "State:", probe.state.to_string().bold());
    println!("{:<9} {}", "Backlog:", location(&probe.backlog));
    println!("{:<9} {}", "SIP:", location(&probe.sip));
    println!("{:<9} {}", "AIP:", location(&probe.aip));
    match probe.aip_valid {
        Some(true) => println!("{:<9} {}", "Fixity:", "valid".green()),
        Some(false) => println!("{:<9} {}", "Fixity:", "INVALID".red()),
        None => {},
    }
    match probe.sip_conforms {
        Some(true) => println!("{:<9} {}", "SIP match:", "masters conform".green()),
        Some(false) => println!("{:<9} {}", "SIP match:", "MISMATCH".red()),
        None => {},
    }

    if let Some(sip_dir) = &probe.sip {
        let inventory = match SubmissionPackage::load(sip_dir).and_then(|sip| sip.inventory()) {
            Ok(inventory) => inventory,
            Err(e) => {
                println!("{:<9} {}", "SIP:", format!("unreadable: {e}").red());
                return Ok(());
            },
        };
        let total: u64 = inventory.iter().map(|item| item.bytes).sum();
        println!();
        println!(
            "{} {} files, {} bytes",
            "SIP inventory:".cyan().bold(),
            inventory.len(),
            total
        );
        for item in &inventory {
            println!("  {:>12}  {}", item.bytes, item.path);
        }
    }
    Ok(())
}

fn location(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "-".dimmed().to_string(),
    }
}
