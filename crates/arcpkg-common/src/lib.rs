//! arcpkg Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the archival packaging tools.
//!
//! # Overview
//!
//! This crate provides functionality used by every arcpkg workspace member:
//!
//! - **Error Handling**: [`ArcpkgError`] and the [`Result`] alias
//! - **Checksums**: streaming file hashing for fixity checks
//! - **Logging**: `tracing` subscriber setup shared by all binaries
//! - **Types**: package identity, payload size descriptors, hash algorithms
//!
//! # Example
//!
//! ```no_run
//! use arcpkg_common::checksum::compute_file_checksum;
//! use arcpkg_common::types::ChecksumAlgorithm;
//!
//! fn fixity(path: &str) -> arcpkg_common::Result<()> {
//!     let hash = compute_file_checksum(path, ChecksumAlgorithm::Sha256)?;
//!     println!("{hash}  {path}");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{ArcpkgError, Result};
pub use types::{BagType, ChecksumAlgorithm, Extent, PackageId, PayloadOxum};
