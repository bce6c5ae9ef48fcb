//! Error types shared by the arcpkg crates

use thiserror::Error;

/// Result type alias for shared arcpkg operations
pub type Result<T> = std::result::Result<T, ArcpkgError>;

/// Main error type for the shared layer
#[derive(Error, Debug)]
pub enum ArcpkgError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Hash algorithm '{0}' is not supported (expected md5, sha256 or sha512)")]
    UnsupportedAlgorithm(String),

    #[error("Checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid package identifier: {0}")]
    InvalidPackageId(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ArcpkgError {
    /// Wrap an I/O error raised while reading `path`
    pub fn file_read(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
