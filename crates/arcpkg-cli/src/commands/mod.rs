//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod accession;
pub mod config;
pub mod package;
pub mod remove_sip;
pub mod status;
pub mod validate;
