//! `arcpkg validate` command implementation

use crate::bag::Bag;
use crate::error::{CliError, Result};
use colored::Colorize;
use serde_json::json;
use std::path::Path;

/// Validate the bag at `path`; an invalid bag is an error
pub fn run(path: &Path, json: bool) -> Result<()> {
    let bag = Bag::open(path)?;
    let validation = bag.validate()?;

    if json {
        let body = json!({
            "path": path.display().to_string(),
            "valid": validation.is_ok(),
            "payload": &validation.payload,
            "tags": &validation.tags,
            "payload_oxum_mismatch": validation
                .oxum_mismatch
                .map(|(declared, actual)| json!({ "declared": declared.to_string(), "actual": actual.to_string() })),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else if validation.is_ok() {
        println!("{} {} is valid", "✓".green(), path.display());
    } else {
        println!("{} {} is invalid", "✗".red(), path.display());
        print!("{}", validation.describe());
    }

    if validation.is_ok() {
        Ok(())
    } else {
        Err(CliError::invalid_bag(path, "bag failed validation"))
    }
}
