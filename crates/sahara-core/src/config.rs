//! Emulator configuration, stored as TOML.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::identity::DeviceIdentity;

/// Configuration for an emulated EDL device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    /// Directory extracted loaders are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Identity reported in command mode.
    pub identity: DeviceIdentity,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            identity: DeviceIdentity::default(),
        }
    }
}

impl EmulatorConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EmulatorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
output_dir = "loaders"

[identity]
oem_pk_hash = "c0c66e278fe81226585252b851370eabf8d4192f0f335576c3028190d49d14d4"
hw_id = "B93D702AE1F00500"
serial = 0x8d3e01ed
sbl_version = 2
"#;

    #[test]
    fn test_parse_sample() {
        let config: EmulatorConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("loaders"));
        assert_eq!(
            config.identity.hw_id,
            [0xB9, 0x3D, 0x70, 0x2A, 0xE1, 0xF0, 0x05, 0x00]
        );
        assert_eq!(config.identity.oem_pk_hash[0], 0xC0);
        assert_eq!(config.identity.oem_pk_hash[31], 0xD4);
        assert_eq!(config.identity.serial, 0x8D3E01ED);
        assert_eq!(config.identity.sbl_version, 2);
    }

    #[test]
    fn test_output_dir_defaults() {
        let without_dir = SAMPLE.replace("output_dir = \"loaders\"", "");
        let config: EmulatorConfig = toml::from_str(&without_dir).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("."));
    }

    #[test]
    fn test_rejects_short_hash() {
        let bad = SAMPLE.replace("c0c66e27", "");
        assert!(toml::from_str::<EmulatorConfig>(&bad).is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emulator.toml");
        let config: EmulatorConfig = toml::from_str(SAMPLE).unwrap();
        config.save_to_file(&path).unwrap();
        assert_eq!(EmulatorConfig::load_from_file(&path).unwrap(), config);
    }
}
