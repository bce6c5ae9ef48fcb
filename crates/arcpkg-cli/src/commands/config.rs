//! `arcpkg config` command implementation

use crate::config::Config;
use crate::error::Result;
use colored::Colorize;

/// Show the effective configuration as TOML
pub fn show(config: &Config) -> Result<()> {
    println!("{}", "# Effective arcpkg configuration".cyan().bold());
    print!("{}", config.to_toml()?);
    if config.extent_log.is_none() {
        println!("# extent log disabled");
    }
    println!();
    println!("{}", "# Environment Variables:".cyan());
    for (var, what) in [
        ("ARCPKG_CONFIG", "TOML config file"),
        ("ARCPKG_BACKLOG_ROOT", "Processing backlog root"),
        ("ARCPKG_SIP_ROOT", "SIP root"),
        ("ARCPKG_AIP_ROOT", "AIP root"),
        ("ARCPKG_LOG_DIR", "Run log directory"),
        ("ARCPKG_EXTENT_LOG", "Extent log CSV (off to disable)"),
        ("ARCPKG_ALGORITHM", "md5, sha256 or sha512"),
        ("ARCPKG_TRANSFER", "native or rsync"),
    ] {
        println!("#   {var:<20} {what}");
    }
    Ok(())
}
