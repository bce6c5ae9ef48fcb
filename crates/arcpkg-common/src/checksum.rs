//! Checksum utilities for fixity verification
//!
//! Files are always streamed through the hasher in [`CHUNK_SIZE`] blocks so
//! multi-gigabyte masters never have to fit in memory.

use crate::error::{ArcpkgError, Result};
use crate::types::ChecksumAlgorithm;
use sha2::{Digest, Sha256, Sha512};
use std::io::Read;
use std::path::Path;

/// Read buffer used while hashing
pub const CHUNK_SIZE: usize = 512 * 1024;

/// Compute checksum for a file
pub fn compute_file_checksum(
    path: impl AsRef<Path>,
    algorithm: ChecksumAlgorithm,
) -> Result<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| ArcpkgError::file_read(path, e))?;
    compute_checksum(&mut file, algorithm).map_err(|e| match e {
        ArcpkgError::Io(source) => ArcpkgError::file_read(path, source),
        other => other,
    })
}

/// Compute checksum for any readable source
pub fn compute_checksum<R: Read>(reader: &mut R, algorithm: ChecksumAlgorithm) -> Result<String> {
    match algorithm {
        ChecksumAlgorithm::Md5 => {
            let mut context = md5::Context::new();
            stream(reader, |chunk| context.consume(chunk))?;
            Ok(format!("{:x}", context.compute()))
        },
        ChecksumAlgorithm::Sha256 => digest::<Sha256, R>(reader),
        ChecksumAlgorithm::Sha512 => digest::<Sha512, R>(reader),
    }
}

/// Verify checksum for a file
pub fn verify_file_checksum(
    path: impl AsRef<Path>,
    expected: &str,
    algorithm: ChecksumAlgorithm,
) -> Result<()> {
    let path = path.as_ref();
    let actual = compute_file_checksum(path, algorithm)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(ArcpkgError::ChecksumMismatch {
            path: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}

fn digest<D: Digest, R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = D::new();
    stream(reader, |chunk| hasher.update(chunk))?;
    Ok(hex::encode(hasher.finalize()))
}

fn stream<R: Read>(reader: &mut R, mut sink: impl FnMut(&[u8])) -> Result<()> {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        sink(&buffer[..bytes_read]);
    }
}
