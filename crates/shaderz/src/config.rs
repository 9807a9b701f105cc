//! `config.toml`: defaults the command-line flags override.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use renderer::Quality;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QualitySetting {
    Low,
    Medium,
    #[default]
    High,
}

impl From<QualitySetting> for Quality {
    fn from(setting: QualitySetting) -> Self {
        match setting {
            QualitySetting::Low => Quality::Low,
            QualitySetting::Medium => Quality::Medium,
            QualitySetting::High => Quality::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 960,
            height: 540,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub quality: QualitySetting,
    pub reduced_motion: bool,
    /// Release GPU resources while the preview window is hidden.
    pub release_when_hidden: bool,
    pub window: WindowConfig,
    /// Catalog roots searched after `--catalog` flags.
    pub catalog_roots: Vec<PathBuf>,
}

impl AppConfig {
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file at {}", path.display()))?;
            let config: Self = toml::from_str(&contents)
                .with_context(|| format!("failed to parse config file at {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&temp.path().join("config.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(Quality::from(config.quality), Quality::High);
    }

    #[test]
    fn sparse_file_keeps_remaining_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "quality = \"low\"\ncatalog_roots = [\"/srv/shaders\"]\n\n[window]\nwidth = 1280\n",
        )
        .unwrap();

        let config = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(config.quality, QualitySetting::Low);
        assert!(!config.reduced_motion);
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 540);
        assert_eq!(config.catalog_roots, vec![PathBuf::from("/srv/shaders")]);
    }

    #[test]
    fn malformed_file_names_its_path() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "quality = \"ultra\"").unwrap();
        let err = AppConfig::load_or_default(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }
}
