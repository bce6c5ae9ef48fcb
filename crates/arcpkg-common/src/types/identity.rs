//! Package identity

use crate::error::{ArcpkgError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alphabet used for generated package suffixes (no 0/1/I/O/l)
const SHORT_ID_ALPHABET: &[u8; 57] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Length of a rendered 128-bit id in base 57
const SHORT_ID_LEN: usize = 22;

/// Generate a short, filesystem-safe unique id from a random v4 UUID
pub fn short_id() -> String {
    encode_short_id(Uuid::new_v4().as_u128())
}

fn encode_short_id(mut value: u128) -> String {
    let base = SHORT_ID_ALPHABET.len() as u128;
    let mut digits = Vec::with_capacity(SHORT_ID_LEN);
    while value > 0 {
        digits.push(SHORT_ID_ALPHABET[(value % base) as usize]);
        value /= base;
    }
    digits.resize(SHORT_ID_LEN, SHORT_ID_ALPHABET[0]);
    digits.reverse();
    digits.into_iter().map(char::from).collect()
}

/// Which side of the preservation lifecycle a bag belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BagType {
    #[serde(rename = "SIP")]
    Sip,
    #[serde(rename = "AIP")]
    Aip,
}

impl std::fmt::Display for BagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BagType::Sip => write!(f, "SIP"),
            BagType::Aip => write!(f, "AIP"),
        }
    }
}

impl std::str::FromStr for BagType {
    type Err = ArcpkgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "SIP" => Ok(BagType::Sip),
            "AIP" => Ok(BagType::Aip),
            other => Err(ArcpkgError::parse(format!("unknown Bag-Type '{other}'"))),
        }
    }
}

/// Collection id plus package id
///
/// The collection id is always the leading segment of the package id, cut at
/// the first `_` or, failing that, the first `-` (`apap101_Xy3...` belongs to
/// collection `apap101`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId {
    collection_id: String,
    package_id: String,
}

impl PackageId {
    /// Parse a package id, deriving its collection
    pub fn parse(package_id: &str) -> Result<Self> {
        let package_id = package_id.trim();
        validate_segment(package_id)?;
        let collection_id = derive_collection(package_id);
        if collection_id.is_empty() {
            return Err(ArcpkgError::InvalidPackageId(format!(
                "'{package_id}' does not start with a collection identifier"
            )));
        }
        Ok(Self {
            collection_id: collection_id.to_string(),
            package_id: package_id.to_string(),
        })
    }

    /// Build an id from both parts, checking that they agree
    pub fn new(collection_id: &str, package_id: &str) -> Result<Self> {
        let id = Self::parse(package_id)?;
        if id.collection_id != collection_id {
            return Err(ArcpkgError::InvalidPackageId(format!(
                "package '{package_id}' does not belong to collection '{collection_id}'"
            )));
        }
        Ok(id)
    }

    /// Allocate a fresh `{collection}_{short-id}` package id
    pub fn generate(collection_id: &str) -> Result<Self> {
        validate_segment(collection_id)?;
        if collection_id.contains(['_', '-']) {
            return Err(ArcpkgError::InvalidPackageId(format!(
                "collection '{collection_id}' may not contain '_' or '-'"
            )));
        }
        Self::new(collection_id, &format!("{collection_id}_{}", short_id()))
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.package_id)
    }
}

fn derive_collection(package_id: &str) -> &str {
    let head = package_id.split('_').next().unwrap_or(package_id);
    head.split('-').next().unwrap_or(head)
}

fn validate_segment(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ArcpkgError::InvalidPackageId("identifier is empty".to_string()));
    }
    if value == "." || value == ".." || value.contains(['/', '\\']) || value.chars().any(char::is_whitespace) {
        return Err(ArcpkgError::InvalidPackageId(format!(
            "'{value}' is not usable as a directory name"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_collection_is_derived_from_package() {
        let id = PackageId::parse("apap101_nRvDoTgrJW5rbLzfWF7zRT").unwrap();
        assert_eq!(id.collection_id(), "apap101");
        assert_eq!(id.package_id(), "apap101_nRvDoTgrJW5rbLzfWF7zRT");

        let id = PackageId::parse("ua395-2019").unwrap();
        assert_eq!(id.collection_id(), "ua395");

        let id = PackageId::parse("ger017_a-b").unwrap();
        assert_eq!(id.collection_id(), "ger017");
    }

    #[test]
    fn test_rejects_unsafe_ids() {
        assert!(PackageId::parse("").is_err());
        assert!(PackageId::parse("_abc").is_err());
        assert!(PackageId::parse("../etc").is_err());
        assert!(PackageId::parse("a b").is_err());
    }

    #[test]
    fn test_new_checks_collection_agreement() {
        assert!(PackageId::new("apap101", "apap101_x").is_ok());
        assert!(PackageId::new("apap102", "apap101_x").is_err());
    }

    #[test]
    fn test_generate_is_unique_and_scoped() {
        let a = PackageId::generate("mss077").unwrap();
        let b = PackageId::generate("mss077").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.collection_id(), "mss077");
        assert_eq!(a.package_id().len(), "mss077_".len() + SHORT_ID_LEN);
        assert!(PackageId::generate("bad_col").is_err());
    }

    #[test]
    fn test_encode_short_id_bounds() {
        assert_eq!(encode_short_id(0), "2".repeat(SHORT_ID_LEN));
        assert_eq!(encode_short_id(u128::MAX).len(), SHORT_ID_LEN);
    }

    #[test]
    fn test_bag_type_round_trip() {
        assert_eq!("SIP".parse::<BagType>().unwrap(), BagType::Sip);
        assert_eq!(BagType::Aip.to_string(), "AIP");
        assert!("DIP".parse::<BagType>().is_err());
    }

    proptest! {
        #[test]
        fn prop_collection_is_prefix(col in "[a-z]{2,6}[0-9]{0,4}", rest in "[A-Za-z0-9]{1,22}") {
            let id = PackageId::parse(&format!("{col}_{rest}")).unwrap();
            prop_assert_eq!(id.collection_id(), col.as_str());
            prop_assert!(id.package_id().starts_with(id.collection_id()));
        }
    }
}
