use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::context::{InstallContext, OsType};
use crate::installer::SkipReason;

/// Defaults for the optional zstandard install
pub mod defaults {
    use crate::context::OsType;

    /// Hosts with two cores or fewer have no prebuilt wheels and take too long to build
    pub const MIN_CORE_COUNT: usize = 3;

    /// pip requirement string for the Python binding
    pub const PIP_PACKAGE: &str = "zstandard>=0.21.0,<0.23.0";

    pub const PYTHON: &str = "python3";

    pub const PIP_TIMEOUT_SECS: u64 = 60;

    /// Platforms with neither prebuilt binaries nor a build toolchain
    pub const EXCLUDED_PLATFORMS: &[OsType] = &[OsType::K1, OsType::SonicPad];
}

pub const ENV_MIN_CORES: &str = "ZSTD_SETUP_MIN_CORES";
pub const ENV_PIP_TIMEOUT: &str = "ZSTD_SETUP_PIP_TIMEOUT";
pub const ENV_PYTHON: &str = "ZSTD_SETUP_PYTHON";

/// Configuration for the optional zstandard installer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    /// Minimum number of logical cores required to attempt the install
    pub min_core_count: usize,
    /// Requirement passed to `pip install`
    pub pip_package: String,
    /// Python interpreter used to run `-m pip`
    pub python: PathBuf,
    /// Upper bound on the pip invocation, in seconds
    pub pip_timeout_secs: u64,
    /// Platforms on which the install is never attempted
    pub excluded_platforms: Vec<OsType>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            min_core_count: defaults::MIN_CORE_COUNT,
            pip_package: defaults::PIP_PACKAGE.to_string(),
            python: PathBuf::from(defaults::PYTHON),
            pip_timeout_secs: defaults::PIP_TIMEOUT_SECS,
            excluded_platforms: defaults::EXCLUDED_PLATFORMS.to_vec(),
        }
    }
}

impl InstallerConfig {
    /// Load configuration from a JSON file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: InstallerConfig = serde_json::from_str(&data)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Apply `ZSTD_SETUP_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using the given variable lookup
    ///
    /// Values that don't parse are ignored, leaving the current setting in place.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MIN_CORES) {
            match value.trim().parse::<usize>() {
                Ok(n) => self.min_core_count = n,
                Err(_) => log::warn!("Ignoring invalid {}={:?}", ENV_MIN_CORES, value),
            }
        }

        if let Some(value) = lookup(ENV_PIP_TIMEOUT) {
            match value.trim().parse::<u64>() {
                Ok(secs) => self.pip_timeout_secs = secs,
                Err(_) => log::warn!("Ignoring invalid {}={:?}", ENV_PIP_TIMEOUT, value),
            }
        }

        if let Some(value) = lookup(ENV_PYTHON) {
            let value = value.trim();
            if value.is_empty() {
                log::warn!("Ignoring empty {}", ENV_PYTHON);
            } else {
                self.python = PathBuf::from(value);
            }
        }
    }

    /// Timeout for the pip invocation, never shorter than one second
    pub fn pip_timeout(&self) -> Duration {
        Duration::from_secs(self.pip_timeout_secs.max(1))
    }

    pub fn is_excluded(&self, os_type: OsType) -> bool {
        self.excluded_platforms.contains(&os_type)
    }

    /// Why `context` is not eligible for the install, if it isn't
    pub fn skip_reason(&self, context: &InstallContext) -> Option<SkipReason> {
        if self.is_excluded(context.os_type) {
            return Some(SkipReason::ExcludedPlatform {
                os_type: context.os_type,
            });
        }

        if context.cpu_count < self.min_core_count {
            return Some(SkipReason::TooFewCores {
                found: context.cpu_count,
                required: self.min_core_count,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = InstallerConfig::default();
        assert_eq!(config.min_core_count, 3);
        assert_eq!(config.pip_timeout(), Duration::from_secs(60));
        assert_eq!(config.python, PathBuf::from("python3"));
        assert!(config.pip_package.starts_with("zstandard"));
        assert!(config.is_excluded(OsType::K1));
        assert!(config.is_excluded(OsType::SonicPad));
        assert!(!config.is_excluded(OsType::Debian));
        assert!(!config.is_excluded(OsType::Linux));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("zstd-setup.json");
        fs::write(&path, r#"{ "min_core_count": 8, "excluded_platforms": ["k1"] }"#)?;

        let config = InstallerConfig::load(&path)?;
        assert_eq!(config.min_core_count, 8);
        assert_eq!(config.excluded_platforms, vec![OsType::K1]);
        assert_eq!(config.pip_timeout_secs, 60);
        assert_eq!(config.pip_package, defaults::PIP_PACKAGE);
        Ok(())
    }

    #[test]
    fn test_load_rejects_unknown_keys() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("zstd-setup.json");
        fs::write(&path, r#"{ "min_cores": 8 }"#)?;

        assert!(InstallerConfig::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let err = InstallerConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = InstallerConfig::default();
        config.apply_overrides_from(lookup_from(&[
            (ENV_MIN_CORES, "2"),
            (ENV_PIP_TIMEOUT, " 120 "),
            (ENV_PYTHON, "/opt/venv/bin/python"),
        ]));

        assert_eq!(config.min_core_count, 2);
        assert_eq!(config.pip_timeout(), Duration::from_secs(120));
        assert_eq!(config.python, PathBuf::from("/opt/venv/bin/python"));
    }

    #[test]
    fn test_invalid_env_overrides_are_ignored() {
        let mut config = InstallerConfig::default();
        config.apply_overrides_from(lookup_from(&[
            (ENV_MIN_CORES, "lots"),
            (ENV_PIP_TIMEOUT, "-5"),
            (ENV_PYTHON, "   "),
        ]));

        assert_eq!(config, InstallerConfig::default());
    }

    #[test]
    fn test_skip_reason_checks_platform_before_cores() {
        let config = InstallerConfig::default();
        assert_eq!(
            config.skip_reason(&InstallContext::new(OsType::SonicPad, 1)),
            Some(SkipReason::ExcludedPlatform {
                os_type: OsType::SonicPad
            })
        );
        assert_eq!(
            config.skip_reason(&InstallContext::new(OsType::Debian, 2)),
            Some(SkipReason::TooFewCores {
                found: 2,
                required: 3
            })
        );
        assert_eq!(config.skip_reason(&InstallContext::new(OsType::Debian, 3)), None);
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let config = InstallerConfig {
            pip_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.pip_timeout(), Duration::from_secs(1));
    }
}
