//! Copies catalog shaders into a project.
//!
//! Shader files land in `<components>/shaders/<name>/`, where `<components>`
//! is the first existing directory among `src/components`, `app/components`,
//! and `components`. When none exists one is created next to `src/` or `app/`,
//! but only with explicit confirmation. Video assets go to `public/videos/`;
//! an optional asset that is not on disk is skipped with a warning.
use std::fs;
use std::path::{Path, PathBuf};

use catalog::{PackError, ShaderPack};
use thiserror::Error;
use tracing::{debug, info, warn};

const COMPONENT_DIRS: [&str; 3] = ["src/components", "app/components", "components"];

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("no components directory found; {} would be created (pass --yes to confirm). Installation cancelled.", .0.display())]
    Cancelled(PathBuf),

    #[error(transparent)]
    Pack(#[from] PackError),

    #[error("failed to create {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Create the components directory without asking.
    pub create_missing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledShader {
    pub name: String,
    pub title: String,
    /// Installed files, relative to the project.
    pub files: Vec<PathBuf>,
    pub asset: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Components directory relative to the project.
    pub components: PathBuf,
    pub created_components: bool,
    pub installed: Vec<InstalledShader>,
}

/// First existing components directory under `project`.
pub fn detect_components_dir(project: &Path) -> Option<PathBuf> {
    COMPONENT_DIRS
        .iter()
        .map(PathBuf::from)
        .find(|candidate| project.join(candidate).is_dir())
}

/// Where a components directory is created when none exists.
pub fn default_components_dir(project: &Path) -> PathBuf {
    if project.join("src").is_dir() {
        PathBuf::from("src/components")
    } else if project.join("app").is_dir() {
        PathBuf::from("app/components")
    } else {
        PathBuf::from("components")
    }
}

/// Installs `packs` into `project`. Every pack is checked for missing files
/// before anything is copied.
pub fn install(
    project: &Path,
    packs: &[ShaderPack],
    options: InstallOptions,
) -> Result<InstallReport, InstallError> {
    for pack in packs {
        pack.ensure_files()?;
    }

    let (components, created_components) = match detect_components_dir(project) {
        Some(existing) => (existing, false),
        None => {
            let proposed = default_components_dir(project);
            if !options.create_missing {
                return Err(InstallError::Cancelled(proposed.join("shaders")));
            }
            info!(dir = %proposed.display(), "creating components directory");
            (proposed, true)
        }
    };

    let mut installed = Vec::with_capacity(packs.len());
    for pack in packs {
        let target_dir = components.join("shaders").join(pack.name());
        create_dir(&project.join(&target_dir))?;

        let mut files = Vec::new();
        for relative in pack.install_files() {
            let destination = target_dir.join(&relative);
            copy_file(&pack.root().join(&relative), &project.join(&destination))?;
            files.push(destination);
        }

        let asset = match (&pack.manifest().asset, pack.asset_path()) {
            (Some(_), Some(source)) if pack.asset_skipped() => {
                warn!(
                    shader = pack.name(),
                    asset = %source.display(),
                    "optional asset not found; installing without it"
                );
                None
            }
            (Some(spec), Some(source)) => {
                let file_name = source.file_name().map(PathBuf::from).unwrap_or_default();
                let destination = Path::new("public").join(spec.kind.public_dir()).join(file_name);
                copy_file(&source, &project.join(&destination))?;
                Some(destination)
            }
            _ => None,
        };

        debug!(shader = pack.name(), files = files.len(), "installed shader");
        installed.push(InstalledShader {
            name: pack.name().to_string(),
            title: pack.manifest().display_title().to_string(),
            files,
            asset,
        });
    }

    Ok(InstallReport {
        components,
        created_components,
        installed,
    })
}

fn create_dir(path: &Path) -> Result<(), InstallError> {
    fs::create_dir_all(path).map_err(|source| InstallError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn copy_file(from: &Path, to: &Path) -> Result<(), InstallError> {
    if let Some(parent) = to.parent() {
        create_dir(parent)?;
    }
    fs::copy(from, to).map_err(|source| InstallError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;
    Ok(())
}
