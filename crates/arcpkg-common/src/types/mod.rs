//! Common types used across arcpkg

mod extent;
mod identity;

pub use extent::{Extent, PayloadOxum};
pub use identity::{short_id, BagType, PackageId};

use crate::error::ArcpkgError;
use serde::{Deserialize, Serialize};

/// Checksum algorithm type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Md5,
    #[default]
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    /// Every supported algorithm, weakest first
    pub const ALL: [ChecksumAlgorithm; 3] = [Self::Md5, Self::Sha256, Self::Sha512];

    /// Payload manifest file name for this algorithm (`manifest-sha256.txt`)
    pub fn manifest_file_name(self) -> String {
        format!("manifest-{}.txt", self)
    }

    /// Tag manifest file name for this algorithm (`tagmanifest-sha256.txt`)
    pub fn tag_manifest_file_name(self) -> String {
        format!("tagmanifest-{}.txt", self)
    }
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumAlgorithm::Md5 => write!(f, "md5"),
            ChecksumAlgorithm::Sha256 => write!(f, "sha256"),
            ChecksumAlgorithm::Sha512 => write!(f, "sha512"),
        }
    }
}

impl std::str::FromStr for ChecksumAlgorithm {
    type Err = ArcpkgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            "sha512" => Ok(ChecksumAlgorithm::Sha512),
            _ => Err(ArcpkgError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("SHA256".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha256);
        assert_eq!(" md5 ".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Md5);
        assert_eq!("sha512".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha512);
        assert!(matches!(
            "crc32".parse::<ChecksumAlgorithm>(),
            Err(ArcpkgError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_manifest_file_names() {
        assert_eq!(ChecksumAlgorithm::Sha256.manifest_file_name(), "manifest-sha256.txt");
        assert_eq!(ChecksumAlgorithm::Md5.tag_manifest_file_name(), "tagmanifest-md5.txt");
    }
}
