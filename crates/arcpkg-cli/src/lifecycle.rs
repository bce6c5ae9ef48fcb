//! Where a package is in its SIP → AIP lifecycle, reconstructed from which
//! copies exist on disk.

use crate::config::Layout;
use crate::error::{CliError, Result};
use crate::package::ArchivalPackage;
use arcpkg_common::PackageId;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No copy of the package exists anywhere
    Missing,
    /// SIP and/or backlog exist, no AIP yet
    Created,
    /// AIP built; SIP and backlog both still present
    Packaged,
    /// AIP built from the backlog in update mode; SIP awaits manual removal
    RetainedForManualSipRemoval,
    /// SIP removed; backlog still present
    SipRemoved,
    /// Only the AIP remains
    BacklogRemoved,
    /// AIP fails its own fixity check, or its masters do not match the
    /// SIP manifest while SIP and backlog are still present
    ValidationFailed,
}

impl LifecycleState {
    /// Whether the pipeline has nothing further to do automatically
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::BacklogRemoved | Self::RetainedForManualSipRemoval | Self::ValidationFailed
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Missing => "missing",
            Self::Created => "created",
            Self::Packaged => "packaged",
            Self::RetainedForManualSipRemoval => "retained for manual SIP removal",
            Self::SipRemoved => "SIP removed",
            Self::BacklogRemoved => "backlog removed",
            Self::ValidationFailed => "validation failed",
        };
        f.write_str(label)
    }
}

/// Filesystem facts behind a [`LifecycleState`]
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleProbe {
    pub package: String,
    pub state: LifecycleState,
    pub backlog: Option<PathBuf>,
    pub sip: Option<PathBuf>,
    pub aip: Option<PathBuf>,
    /// `None` unless the AIP was verified
    pub aip_valid: Option<bool>,
    /// Whether the AIP masters match the SIP manifest; only checked when
    /// verifying a valid AIP whose SIP and backlog are both still present
    pub sip_conforms: Option<bool>,
}

impl LifecycleProbe {
    /// Inspect the three package locations. With `verify`, an existing AIP
    /// is fully validated, which reads every payload file. If SIP and
    /// backlog are both still there, the AIP masters are also reconciled
    /// against the SIP manifest so a failed packaging run shows up.
    pub fn probe(layout: &Layout, id: &PackageId, verify: bool) -> Result<Self> {
        let present = |p: PathBuf| p.is_dir().then_some(p);
        let backlog = present(layout.backlog_dir(id));
        let sip = present(layout.sip_dir(id));
        let aip = present(layout.aip_dir(id));

        let opened = match (&aip, verify) {
            (Some(path), true) => Some(ArchivalPackage::open(path).ok()),
            _ => None,
        };
        let aip_valid = match &opened {
            Some(Some(package)) => Some(package.base().validate()?),
            Some(None) => Some(false),
            None => None,
        };
        let sip_conforms = match (&opened, aip_valid) {
            (Some(Some(package)), Some(true)) if sip.is_some() && backlog.is_some() => {
                Some(conforms_to_sip(package)?)
            },
            _ => None,
        };

        let state = classify(
            backlog.is_some(),
            sip.is_some(),
            aip.is_some(),
            aip_valid.map(|valid| valid && sip_conforms != Some(false)),
        );
        debug!(package = %id, %state, "Probed lifecycle");
        Ok(Self {
            package: id.package_id().to_string(),
            state,
            backlog,
            sip,
            aip,
            aip_valid,
            sip_conforms,
        })
    }
}

/// Reconcile against the SIP manifest preserved in the AIP. A missing or
/// unreadable manifest counts as not conforming.
fn conforms_to_sip(aip: &ArchivalPackage) -> Result<bool> {
    let algorithm = aip.base().bag().primary_algorithm();
    let report = match aip.sip_provenance_manifest(algorithm) {
        Ok(manifest) => aip.reconcile_against_sip(&manifest)?,
        Err(CliError::Structural { .. } | CliError::InvalidBag { .. }) => return Ok(false),
        Err(e) => return Err(e),
    };
    if !report.is_ok() {
        debug!(package = %aip.id(), diagnosis = %report.describe(), "AIP does not match SIP");
    }
    Ok(report.is_ok())
}

fn classify(backlog: bool, sip: bool, aip: bool, aip_valid: Option<bool>) -> LifecycleState {
    if !aip {
        return if backlog || sip {
            LifecycleState::Created
        } else {
            LifecycleState::Missing
        };
    }
    if aip_valid == Some(false) {
        return LifecycleState::ValidationFailed;
    }
    match (sip, backlog) {
        (true, true) => LifecycleState::Packaged,
        (true, false) => LifecycleState::RetainedForManualSipRemoval,
        (false, true) => LifecycleState::SipRemoved,
        (false, false) => LifecycleState::BacklogRemoved,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::bag::{Bag, BagInfo};
    use arcpkg_common::ChecksumAlgorithm;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_classify_table() {
        use LifecycleState::*;
        assert_eq!(classify(false, false, false, None), Missing);
        assert_eq!(classify(true, true, false, None), Created);
        assert_eq!(classify(true, false, false, None), Created);
        assert_eq!(classify(true, true, true, None), Packaged);
        assert_eq!(classify(false, true, true, Some(true)), RetainedForManualSipRemoval);
        assert_eq!(classify(true, false, true, None), SipRemoved);
        assert_eq!(classify(false, false, true, Some(true)), BacklogRemoved);
        assert_eq!(classify(true, true, true, Some(false)), ValidationFailed);
    }

    #[test]
    fn test_verify_detects_tampered_aip() {
        let temp = TempDir::new().unwrap();
        let layout = Layout {
            backlog_root: temp.path().join("backlog"),
            sip_root: temp.path().join("SIP"),
            aip_root: temp.path().join("AIP"),
        };
        let id = PackageId::parse("ua435_pkg").unwrap();
        let aip_dir = layout.aip_dir(&id);
        fs::create_dir_all(&aip_dir).unwrap();
        fs::write(aip_dir.join("a.tif"), "a").unwrap();
        Bag::create(&aip_dir, BagInfo::new(), ChecksumAlgorithm::Sha256).unwrap();

        let probe = LifecycleProbe::probe(&layout, &id, true).unwrap();
        assert_eq!(probe.state, LifecycleState::BacklogRemoved);
        assert!(probe.state.is_terminal());
        assert_eq!(probe.aip_valid, Some(true));

        fs::write(aip_dir.join("data/a.tif"), "changed").unwrap();
        let probe = LifecycleProbe::probe(&layout, &id, true).unwrap();
        assert_eq!(probe.state, LifecycleState::ValidationFailed);

        let unverified = LifecycleProbe::probe(&layout, &id, false).unwrap();
        assert_eq!(unverified.aip_valid, None);
        assert_eq!(unverified.state, LifecycleState::BacklogRemoved);
    }
}
