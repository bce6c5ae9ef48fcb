//! Payload size descriptors

use crate::error::{ArcpkgError, Result};
use serde::{Deserialize, Serialize};

const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
const MEBIBYTE: u64 = 1024 * 1024;

/// BagIt `Payload-Oxum`: total payload bytes and file count, `bytes.count`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PayloadOxum {
    pub total_bytes: u64,
    pub file_count: u64,
}

impl PayloadOxum {
    pub fn new(total_bytes: u64, file_count: u64) -> Self {
        Self {
            total_bytes,
            file_count,
        }
    }

    /// Human-readable extent of this payload
    pub fn extent(&self) -> Extent {
        Extent::from_bytes(self.total_bytes, self.file_count)
    }
}

impl std::fmt::Display for PayloadOxum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.total_bytes, self.file_count)
    }
}

impl std::str::FromStr for PayloadOxum {
    type Err = ArcpkgError;

    fn from_str(s: &str) -> Result<Self> {
        let (bytes, count) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| ArcpkgError::parse(format!("Payload-Oxum '{s}' is not 'bytes.count'")))?;
        let parse = |part: &str| {
            part.parse::<u64>()
                .map_err(|e| ArcpkgError::parse(format!("Payload-Oxum '{s}': {e}")))
        };
        Ok(Self::new(parse(bytes)?, parse(count)?))
    }
}

/// Size of a package scaled to the largest fitting binary unit
#[derive(Debug, Clone, PartialEq)]
pub struct Extent {
    pub magnitude: f64,
    pub unit: &'static str,
    pub file_count: u64,
    total_bytes: u64,
}

impl Extent {
    pub fn from_bytes(total_bytes: u64, file_count: u64) -> Self {
        let mut magnitude = total_bytes as f64;
        let mut unit_idx = 0;

        while magnitude >= 1024.0 && unit_idx < UNITS.len() - 1 {
            magnitude /= 1024.0;
            unit_idx += 1;
        }

        Self {
            magnitude: (magnitude * 100.0).round() / 100.0,
            unit: UNITS[unit_idx],
            file_count,
            total_bytes,
        }
    }

    /// Magnitude with two decimals, trailing zeros stripped (`1.5`, `12`, `3.07`)
    pub fn magnitude_label(&self) -> String {
        let fixed = format!("{:.2}", self.magnitude);
        fixed.trim_end_matches('0').trim_end_matches('.').to_string()
    }

    /// Whole mebibytes, truncated
    pub fn megabytes(&self) -> u64 {
        self.total_bytes / MEBIBYTE
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.magnitude_label(), self.unit)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extent_labels() {
        assert_eq!(Extent::from_bytes(0, 0).to_string(), "0 B");
        assert_eq!(Extent::from_bytes(512, 1).to_string(), "512 B");
        assert_eq!(Extent::from_bytes(1024, 1).to_string(), "1 KB");
        assert_eq!(Extent::from_bytes(1536, 2).to_string(), "1.5 KB");
        assert_eq!(Extent::from_bytes(3_221_225_472, 9).to_string(), "3 GB");
        assert_eq!(Extent::from_bytes(1_288_490_189, 9).to_string(), "1.2 GB");
    }

    #[test]
    fn test_extent_megabytes_truncate() {
        let extent = Extent::from_bytes(5 * MEBIBYTE + 1023, 4);
        assert_eq!(extent.megabytes(), 5);
        assert_eq!(extent.file_count, 4);
    }

    #[test]
    fn test_payload_oxum_parse() {
        let oxum: PayloadOxum = "2048.3".parse().unwrap();
        assert_eq!(oxum, PayloadOxum::new(2048, 3));
        assert_eq!(oxum.to_string(), "2048.3");
        assert!("2048".parse::<PayloadOxum>().is_err());
        assert!("a.3".parse::<PayloadOxum>().is_err());
    }

    proptest! {
        #[test]
        fn prop_magnitude_below_1024_unless_petabytes(bytes in any::<u64>()) {
            let extent = Extent::from_bytes(bytes, 1);
            prop_assert!(extent.magnitude <= 1024.0 || extent.unit == "PB");
            let label = extent.magnitude_label();
            prop_assert!(!label.ends_with('.'));
            prop_assert!(!label.contains('.') || !label.ends_with('0'));
        }
    }
}
