//! Directory discovery. Every directory can be pinned through an environment
//! variable, which is how the integration tests sandbox the binary.
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "SHADERZ_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "SHADERZ_DATA_DIR";
pub const ENV_SHARE_DIR: &str = "SHADERZ_SHARE_DIR";
/// Extra catalog roots, separated like `PATH`.
pub const ENV_CATALOG_DIR: &str = "SHADERZ_CATALOG_DIR";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
    share_dir: PathBuf,
    env_catalogs: Vec<PathBuf>,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        Self::from_lookup(|key| env::var_os(key))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Result<Self> {
        let dirs = ProjectDirs::from("dev", "Shaderz", "shaderz")
            .ok_or_else(|| anyhow!("no home directory; set {ENV_CONFIG_DIR} and {ENV_DATA_DIR}"))?;
        let pinned = |key: &str| lookup(key).filter(|value| !value.is_empty()).map(PathBuf::from);

        let env_catalogs = lookup(ENV_CATALOG_DIR)
            .map(|value| {
                env::split_paths(&value)
                    .filter(|path| !path.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            config_dir: pinned(ENV_CONFIG_DIR).unwrap_or_else(|| dirs.config_dir().to_path_buf()),
            data_dir: pinned(ENV_DATA_DIR).unwrap_or_else(|| dirs.data_dir().to_path_buf()),
            share_dir: pinned(ENV_SHARE_DIR).unwrap_or_else(|| system_share_dir(&dirs)),
            env_catalogs,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn share_dir(&self) -> &Path {
        &self.share_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn bundled_catalog_dir(&self) -> PathBuf {
        self.share_dir.join("catalog")
    }

    /// Search order: `extra` (flags, then config), `SHADERZ_CATALOG_DIR`,
    /// `<config>/shaders`, `<data>/shaders`, bundled catalog.
    pub fn catalog_roots(&self, extra: &[PathBuf]) -> Vec<PathBuf> {
        extra
            .iter()
            .chain(&self.env_catalogs)
            .cloned()
            .chain([
                self.config_dir.join("shaders"),
                self.data_dir.join("shaders"),
                self.bundled_catalog_dir(),
            ])
            .collect()
    }
}

#[cfg(target_family = "unix")]
fn system_share_dir(_: &ProjectDirs) -> PathBuf {
    PathBuf::from("/usr/share/shaderz")
}

#[cfg(not(target_family = "unix"))]
fn system_share_dir(dirs: &ProjectDirs) -> PathBuf {
    dirs.data_dir().to_path_buf()
}
