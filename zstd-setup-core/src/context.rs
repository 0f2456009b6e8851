//! Host description consumed by the installer
//!
//! The installer only needs two facts about the machine it runs on: which
//! operating system family it is, and how many logical CPU cores it has.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

lazy_static::lazy_static! {
    static ref OS_RELEASE_FIELD: Regex =
        Regex::new(r#"(?m)^([A-Z_]+)=\s*"?([^"\n]*)"?\s*$"#).unwrap();
}

const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Creality K1 firmware keeps its writable data under this directory
const K1_DATA_DIR: &str = "/usr/data";

/// Operating system classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    /// Debian and derivatives (Ubuntu, Raspberry Pi OS, ...)
    Debian,
    /// Creality K1 / K1 Max printer firmware
    K1,
    /// Creality Sonic Pad
    SonicPad,
    /// Any other Linux distribution
    Linux,
    /// Not Linux at all
    Other,
}

impl OsType {
    pub fn name(&self) -> &'static str {
        match self {
            OsType::Debian => "debian",
            OsType::K1 => "k1",
            OsType::SonicPad => "sonicpad",
            OsType::Linux => "linux",
            OsType::Other => "other",
        }
    }

    /// Detect the OS type of the running host
    pub fn detect() -> Self {
        if !cfg!(target_os = "linux") {
            return OsType::Other;
        }

        match std::fs::read_to_string(OS_RELEASE_PATH) {
            Ok(os_release) => classify(&os_release, Path::new(K1_DATA_DIR).is_dir()),
            Err(e) => {
                log::debug!("Could not read {}: {}", OS_RELEASE_PATH, e);
                OsType::Linux
            }
        }
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OsType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debian" => Ok(OsType::Debian),
            "k1" => Ok(OsType::K1),
            "sonicpad" | "sonic-pad" => Ok(OsType::SonicPad),
            "linux" => Ok(OsType::Linux),
            "other" => Ok(OsType::Other),
            other => Err(format!(
                "unknown OS type '{}' (expected debian, k1, sonicpad, linux or other)",
                other
            )),
        }
    }
}

/// Classify a Linux host from its `/etc/os-release` contents
///
/// First match wins: Sonic Pad, then K1, then Debian family, then generic Linux.
pub fn classify(os_release: &str, has_usr_data: bool) -> OsType {
    let mut id = String::new();
    let mut id_like = String::new();
    let mut name = String::new();

    for caps in OS_RELEASE_FIELD.captures_iter(os_release) {
        let value = caps[2].trim().to_lowercase();
        match &caps[1] {
            "ID" => id = value,
            "ID_LIKE" => id_like = value,
            "NAME" => name = value,
            _ => {}
        }
    }

    if id == "tina" || id.contains("sonic") || name.contains("sonic") {
        return OsType::SonicPad;
    }

    if id == "buildroot" && has_usr_data {
        return OsType::K1;
    }

    let debian_family = ["debian", "ubuntu", "raspbian"];
    if debian_family.contains(&id.as_str())
        || id_like
            .split_whitespace()
            .any(|like| debian_family.contains(&like))
    {
        return OsType::Debian;
    }

    OsType::Linux
}

/// Number of logical CPU cores, falling back to 1 when it can't be determined
pub fn logical_cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Everything the installer needs to know about the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallContext {
    pub os_type: OsType,
    pub cpu_count: usize,
}

impl InstallContext {
    pub fn new(os_type: OsType, cpu_count: usize) -> Self {
        Self { os_type, cpu_count }
    }

    /// Build a context from the running host
    pub fn detect() -> Self {
        Self::new(OsType::detect(), logical_cpu_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBIAN_OS_RELEASE: &str = r#"PRETTY_NAME="Debian GNU/Linux 12 (bookworm)"
NAME="Debian GNU/Linux"
VERSION_ID="12"
ID=debian
HOME_URL="https://www.debian.org/"
"#;

    #[test]
    fn test_classify_debian() {
        assert_eq!(classify(DEBIAN_OS_RELEASE, false), OsType::Debian);
    }

    #[test]
    fn test_classify_debian_derivative_via_id_like() {
        let raspi = "ID=raspbian\nID_LIKE=debian\n";
        assert_eq!(classify(raspi, false), OsType::Debian);

        let mint = "NAME=\"Linux Mint\"\nID=linuxmint\nID_LIKE=\"ubuntu debian\"\n";
        assert_eq!(classify(mint, false), OsType::Debian);
    }

    #[test]
    fn test_classify_k1_needs_data_dir() {
        let buildroot = "NAME=Buildroot\nID=buildroot\nVERSION_ID=2020.02.1\n";
        assert_eq!(classify(buildroot, true), OsType::K1);
        assert_eq!(classify(buildroot, false), OsType::Linux);
    }

    #[test]
    fn test_classify_sonic_pad() {
        assert_eq!(classify("ID=tina\n", false), OsType::SonicPad);
        assert_eq!(
            classify("NAME=\"Sonic Pad OS\"\nID=openwrt\n", false),
            OsType::SonicPad
        );
    }

    #[test]
    fn test_classify_unknown_is_generic_linux() {
        assert_eq!(classify("ID=fedora\nID_LIKE=\"rhel centos\"\n", false), OsType::Linux);
        assert_eq!(classify("", false), OsType::Linux);
    }

    #[test]
    fn test_os_type_parse_roundtrips_names() {
        for os in [
            OsType::Debian,
            OsType::K1,
            OsType::SonicPad,
            OsType::Linux,
            OsType::Other,
        ] {
            assert_eq!(os.name().parse::<OsType>().unwrap(), os);
        }
        assert_eq!("Sonic-Pad".parse::<OsType>().unwrap(), OsType::SonicPad);
        assert!("windows".parse::<OsType>().is_err());
    }

    #[test]
    fn test_os_type_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&OsType::SonicPad).unwrap();
        assert_eq!(json, "\"sonicpad\"");
        let parsed: OsType = serde_json::from_str("\"k1\"").unwrap();
        assert_eq!(parsed, OsType::K1);
    }

    #[test]
    fn test_logical_cpu_count_is_positive() {
        assert!(logical_cpu_count() >= 1);
    }
}
