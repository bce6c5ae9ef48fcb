//! Configuration management for the arcpkg CLI
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `ARCPKG_*` environment variables.

use crate::error::{CliError, Result};
use crate::retry::RetryPolicy;
use crate::transfer::{NativeTransfer, ResilientTransfer, RsyncTransfer, Transfer};
use arcpkg_common::{ChecksumAlgorithm, PackageId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_BACKLOG_ROOT: &str = "/backlog";
pub const DEFAULT_SIP_ROOT: &str = "/Archives/SIP";
pub const DEFAULT_AIP_ROOT: &str = "/Archives/AIP";
pub const DEFAULT_LOG_DIR: &str = "/logs";
pub const DEFAULT_EXTENT_LOG: &str = "/Archives/extent-log.csv";
pub const DEFAULT_SIP_PROFILE: &str =
    "https://archives.albany.edu/static/bagitprofiles/sip-profile-v0.2.json";
pub const DEFAULT_AIP_PROFILE: &str =
    "https://archives.albany.edu/static/bagitprofiles/aip-profile-v0.1.json";

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "ARCPKG_CONFIG";

/// Copy mechanism used for bulk transfers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferBackend {
    #[default]
    Native,
    Rsync,
}

impl std::str::FromStr for TransferBackend {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "rsync" => Ok(Self::Rsync),
            other => Err(CliError::config(format!(
                "unknown transfer backend '{other}' (expected native or rsync)"
            ))),
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Live processing directories, `{backlog_root}/{collection}/{package}`
    pub backlog_root: PathBuf,
    pub sip_root: PathBuf,
    pub aip_root: PathBuf,

    /// Run logs; matching files are copied into each AIP
    pub log_dir: PathBuf,

    /// Extent log CSV; `None` disables it
    pub extent_log: Option<PathBuf>,

    pub algorithm: ChecksumAlgorithm,
    pub transfer: TransferBackend,
    pub transfer_attempts: u32,
    pub transfer_retry_delay_ms: u64,
    pub removal_attempts: u32,
    pub removal_retry_delay_ms: u64,

    pub sip_profile: String,
    pub aip_profile: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backlog_root: PathBuf::from(DEFAULT_BACKLOG_ROOT),
            sip_root: PathBuf::from(DEFAULT_SIP_ROOT),
            aip_root: PathBuf::from(DEFAULT_AIP_ROOT),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            extent_log: Some(PathBuf::from(DEFAULT_EXTENT_LOG)),
            algorithm: ChecksumAlgorithm::Sha256,
            transfer: TransferBackend::Native,
            transfer_attempts: 5,
            transfer_retry_delay_ms: 0,
            removal_attempts: 5,
            removal_retry_delay_ms: 1000,
            sip_profile: DEFAULT_SIP_PROFILE.to_string(),
            aip_profile: DEFAULT_AIP_PROFILE.to_string(),
        }
    }
}

impl Config {
    /// Defaults, then `file` (or `$ARCPKG_CONFIG`), then environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file = file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        let config = config.merge_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CliError::config(format!("cannot read config file '{}': {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(toml::from_str(&text)?)
    }

    /// Override fields from `ARCPKG_*` environment variables
    pub fn merge_env(mut self) -> Result<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(v) = var("ARCPKG_BACKLOG_ROOT") {
            self.backlog_root = PathBuf::from(v);
        }
        if let Some(v) = var("ARCPKG_SIP_ROOT") {
            self.sip_root = PathBuf::from(v);
        }
        if let Some(v) = var("ARCPKG_AIP_ROOT") {
            self.aip_root = PathBuf::from(v);
        }
        if let Some(v) = var("ARCPKG_LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ARCPKG_EXTENT_LOG") {
            self.extent_log = match v.as_str() {
                "none" | "off" => None,
                _ => Some(PathBuf::from(v)),
            };
        }
        if let Some(v) = var("ARCPKG_ALGORITHM") {
            self.algorithm = v.parse()?;
        }
        if let Some(v) = var("ARCPKG_TRANSFER") {
            self.transfer = v.parse()?;
        }
        Ok(self)
    }

    /// Reject settings that would make the pipeline unsafe to start
    pub fn validate(&self) -> Result<()> {
        if self.transfer_attempts == 0 {
            return Err(CliError::config("transfer_attempts must be at least 1"));
        }
        if self.removal_attempts == 0 {
            return Err(CliError::config("removal_attempts must be at least 1"));
        }
        for (name, root) in [
            ("backlog_root", &self.backlog_root),
            ("sip_root", &self.sip_root),
            ("aip_root", &self.aip_root),
        ] {
            if root.as_os_str().is_empty() {
                return Err(CliError::config(format!("{name} is empty")));
            }
        }
        Ok(())
    }

    pub fn layout(&self) -> Layout {
        Layout {
            backlog_root: self.backlog_root.clone(),
            sip_root: self.sip_root.clone(),
            aip_root: self.aip_root.clone(),
        }
    }

    pub fn transfer_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.transfer_attempts,
            Duration::from_millis(self.transfer_retry_delay_ms),
        )
    }

    pub fn removal_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.removal_attempts,
            Duration::from_millis(self.removal_retry_delay_ms),
        )
    }

    /// Configured copy backend wrapped in the transfer retry policy
    pub fn resilient_transfer(&self) -> ResilientTransfer {
        let backend: Box<dyn Transfer> = match self.transfer {
            TransferBackend::Native => Box::new(NativeTransfer),
            TransferBackend::Rsync => Box::new(RsyncTransfer::default()),
        };
        ResilientTransfer::new(backend, self.transfer_policy())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Where each copy of a package lives on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub backlog_root: PathBuf,
    pub sip_root: PathBuf,
    pub aip_root: PathBuf,
}

impl Layout {
    pub fn backlog_collection(&self, id: &PackageId) -> PathBuf {
        self.backlog_root.join(id.collection_id())
    }

    pub fn backlog_dir(&self, id: &PackageId) -> PathBuf {
        self.backlog_collection(id).join(id.package_id())
    }

    pub fn sip_collection(&self, id: &PackageId) -> PathBuf {
        self.sip_root.join(id.collection_id())
    }

    pub fn sip_dir(&self, id: &PackageId) -> PathBuf {
        self.sip_collection(id).join(id.package_id())
    }

    pub fn aip_collection(&self, id: &PackageId) -> PathBuf {
        self.aip_root.join(id.collection_id())
    }

    pub fn aip_dir(&self, id: &PackageId) -> PathBuf {
        self.aip_collection(id).join(id.package_id())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_VARS: [&str; 8] = [
        CONFIG_ENV,
        "ARCPKG_BACKLOG_ROOT",
        "ARCPKG_SIP_ROOT",
        "ARCPKG_AIP_ROOT",
        "ARCPKG_LOG_DIR",
        "ARCPKG_EXTENT_LOG",
        "ARCPKG_ALGORITHM",
        "ARCPKG_TRANSFER",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::load(None).unwrap();
        assert_eq!(config.backlog_root, PathBuf::from("/backlog"));
        assert_eq!(config.sip_root, PathBuf::from("/Archives/SIP"));
        assert_eq!(config.algorithm, ChecksumAlgorithm::Sha256);
        assert_eq!(config.transfer_policy(), RetryPolicy::transfer_default());
        assert_eq!(config.removal_policy(), RetryPolicy::removal_default());
    }

    #[test]
    #[serial]
    fn test_file_then_env_layering() {
        clear_env();
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("arcpkg.toml");
        std::fs::write(
            &file,
            "sip_root = \"/srv/sip\"\naip_root = \"/srv/aip\"\nalgorithm = \"sha512\"\ntransfer = \"rsync\"\n",
        )
        .unwrap();
        std::env::set_var("ARCPKG_AIP_ROOT", "/mnt/aip");
        std::env::set_var("ARCPKG_EXTENT_LOG", "off");

        let config = Config::load(Some(&file)).unwrap();
        clear_env();

        assert_eq!(config.sip_root, PathBuf::from("/srv/sip"));
        assert_eq!(config.aip_root, PathBuf::from("/mnt/aip"));
        assert_eq!(config.backlog_root, PathBuf::from("/backlog"));
        assert_eq!(config.algorithm, ChecksumAlgorithm::Sha512);
        assert_eq!(config.transfer, TransferBackend::Rsync);
        assert_eq!(config.extent_log, None);
    }

    #[test]
    #[serial]
    fn test_unsupported_algorithm_rejected() {
        clear_env();
        std::env::set_var("ARCPKG_ALGORITHM", "crc32");
        let result = Config::load(None);
        clear_env();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = Config {
            transfer_attempts: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CliError::Config(_))));
    }

    #[test]
    fn test_layout_paths() {
        let layout = Config {
            backlog_root: PathBuf::from("/b"),
            sip_root: PathBuf::from("/s"),
            aip_root: PathBuf::from("/a"),
            ..Config::default()
        }
        .layout();
        let id = PackageId::parse("ua435_Xy7").unwrap();

        assert_eq!(layout.backlog_dir(&id), PathBuf::from("/b/ua435/ua435_Xy7"));
        assert_eq!(layout.sip_collection(&id), PathBuf::from("/s/ua435"));
        assert_eq!(layout.aip_dir(&id), PathBuf::from("/a/ua435/ua435_Xy7"));
    }

    #[test]
    fn test_toml_round_trip_keeps_values() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        assert!(text.contains("sip_root = \"/Archives/SIP\""));
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
