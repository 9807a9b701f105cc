//! One catalog entry on disk: a directory holding `shader.toml`, the GLSL it
//! names, and any installable extras.
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::manifest::ShaderManifest;

pub const MANIFEST_FILE: &str = "shader.toml";

#[derive(Debug, Error)]
pub enum PackError {
    #[error("manifest not found at {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error("failed to parse {}: {source}", .path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("shader pack {} is invalid: {}", .root.display(), .issues.join("; "))]
    Invalid { root: PathBuf, issues: Vec<String> },

    #[error("shader '{name}' not found; searched {roots:?}")]
    NotFound { name: String, roots: Vec<PathBuf> },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// GLSL text of a pack, read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSources {
    pub fragment: String,
    pub vertex: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ShaderPack {
    root: PathBuf,
    manifest: ShaderManifest,
}

impl ShaderPack {
    /// Reads and validates `shader.toml` under `root`.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, PackError> {
        let root = root.as_ref().to_path_buf();
        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(PackError::ManifestMissing(manifest_path));
        }

        let raw = fs::read_to_string(&manifest_path)?;
        let manifest: ShaderManifest =
            toml::from_str(&raw).map_err(|source| PackError::ManifestParse {
                path: manifest_path,
                source,
            })?;
        let issues = manifest.validate();
        if !issues.is_empty() {
            return Err(PackError::Invalid { root, issues });
        }

        Ok(Self { root, manifest })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &ShaderManifest {
        &self.manifest
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn fragment_path(&self) -> PathBuf {
        self.root.join(&self.manifest.fragment)
    }

    pub fn vertex_path(&self) -> Option<PathBuf> {
        self.manifest.vertex.as_ref().map(|path| self.root.join(path))
    }

    pub fn asset_path(&self) -> Option<PathBuf> {
        self.manifest
            .asset
            .as_ref()
            .map(|asset| self.root.join(&asset.path))
    }

    pub fn read_sources(&self) -> Result<PackSources, PackError> {
        let fragment = fs::read_to_string(self.fragment_path())?;
        let vertex = match self.vertex_path() {
            Some(path) => Some(fs::read_to_string(path)?),
            None => None,
        };
        Ok(PackSources { fragment, vertex })
    }

    /// Files the installer copies, relative to the pack root: sources first,
    /// then extras, without duplicates.
    pub fn install_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.manifest.fragment.clone()];
        files.extend(self.manifest.vertex.clone());
        for extra in &self.manifest.files {
            if !files.contains(extra) {
                files.push(extra.clone());
            }
        }
        files
    }

    /// True when the manifest declares an optional asset that is not on disk.
    pub fn asset_skipped(&self) -> bool {
        match (&self.manifest.asset, self.asset_path()) {
            (Some(asset), Some(path)) => asset.optional && !path.is_file(),
            _ => false,
        }
    }

    /// Confirms every installable file and any required asset exist, so later
    /// failures point at shader code instead of a missing file.
    pub fn ensure_files(&self) -> Result<(), PackError> {
        let mut candidates: Vec<PathBuf> = self
            .install_files()
            .iter()
            .map(|relative| self.root.join(relative))
            .collect();
        if !self.asset_skipped() {
            candidates.extend(self.asset_path());
        }

        let missing: Vec<String> = candidates
            .into_iter()
            .filter(|path| !path.is_file())
            .map(|path| format!("missing file: {}", path.display()))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PackError::Invalid {
                root: self.root.clone(),
                issues: missing,
            })
        }
    }
}
