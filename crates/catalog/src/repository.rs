//! Search across several catalog roots.
//!
//! Roots are consulted in order and the first root that provides a name wins,
//! so a user's data directory can shadow the bundled catalog. Entries that fail
//! to load are still reported by [`Catalog::entries`] so `check` can show them.
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::pack::{PackError, ShaderPack, MANIFEST_FILE};

/// A directory that looks like a catalog entry, loaded or not.
#[derive(Debug)]
pub struct CatalogEntry {
    pub dir: PathBuf,
    pub pack: Result<ShaderPack, PackError>,
}

impl CatalogEntry {
    /// Manifest name when the entry loaded, directory name otherwise.
    pub fn name(&self) -> String {
        match &self.pack {
            Ok(pack) => pack.name().to_string(),
            Err(_) => self
                .dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    roots: Vec<PathBuf>,
}

impl Catalog {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Every entry across all roots, shadowed names removed, sorted by name.
    pub fn entries(&self) -> Result<Vec<CatalogEntry>, PackError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for root in &self.roots {
            if !root.is_dir() {
                debug!(root = %root.display(), "catalog root missing; skipping");
                continue;
            }
            for dir in entry_dirs(root)? {
                let entry = CatalogEntry {
                    pack: ShaderPack::load(&dir),
                    dir,
                };
                let name = entry.name();
                if !seen.insert(name.clone()) {
                    debug!(%name, dir = %entry.dir.display(), "shadowed by an earlier root");
                    continue;
                }
                entries.push(entry);
            }
        }
        entries.sort_by_key(CatalogEntry::name);
        Ok(entries)
    }

    /// Loadable packs only; broken entries are logged and left out.
    pub fn list(&self) -> Result<Vec<ShaderPack>, PackError> {
        let mut packs = Vec::new();
        for entry in self.entries()? {
            match entry.pack {
                Ok(pack) => packs.push(pack),
                Err(err) => {
                    warn!(dir = %entry.dir.display(), error = %err, "skipping broken shader pack")
                }
            }
        }
        Ok(packs)
    }

    /// Finds a pack by name, or loads it directly when `name` is a path to a
    /// pack directory.
    pub fn resolve(&self, name: &str) -> Result<ShaderPack, PackError> {
        let direct = Path::new(name);
        if direct.join(MANIFEST_FILE).is_file() {
            debug!(path = %direct.display(), "loading shader pack by path");
            return ShaderPack::load(direct);
        }

        // Per root, a directory named `name` beats a manifest name; either
        // beats anything in a later root.
        for root in &self.roots {
            if !root.is_dir() {
                continue;
            }
            let candidate = root.join(name);
            if candidate.join(MANIFEST_FILE).is_file() {
                debug!(candidate = %candidate.display(), "resolved shader pack");
                return ShaderPack::load(candidate);
            }
            for dir in entry_dirs(root)? {
                if let Ok(pack) = ShaderPack::load(&dir) {
                    if pack.name() == name {
                        debug!(dir = %dir.display(), "resolved shader pack by manifest name");
                        return Ok(pack);
                    }
                }
            }
        }

        Err(PackError::NotFound {
            name: name.to_string(),
            roots: self.roots.clone(),
        })
    }
}

fn entry_dirs(root: &Path) -> Result<Vec<PathBuf>, PackError> {
    let mut dirs = Vec::new();
    for item in fs::read_dir(root)? {
        let path = item?.path();
        if path.is_dir() && path.join(MANIFEST_FILE).is_file() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_pack(dir: &Path, name: &str, title: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(
            dir.join(MANIFEST_FILE),
            format!("name = \"{name}\"\ntitle = \"{title}\"\nfragment = \"main.frag\"\n"),
        )
        .unwrap();
        fs::write(dir.join("main.frag"), "void main() {}").unwrap();
    }

    #[test]
    fn first_root_shadows_later_ones() {
        let temp = tempfile::tempdir().unwrap();
        let user = temp.path().join("user");
        let bundled = temp.path().join("bundled");
        create_pack(&user.join("plasma"), "plasma", "My Plasma");
        create_pack(&bundled.join("plasma"), "plasma", "Plasma");
        create_pack(&bundled.join("aurora"), "aurora", "Aurora");

        let catalog = Catalog::new(vec![user, bundled, temp.path().join("absent")]);
        let packs = catalog.list().expect("list packs");
        let names: Vec<&str> = packs.iter().map(ShaderPack::name).collect();
        assert_eq!(names, ["aurora", "plasma"]);
        assert_eq!(packs[1].manifest().display_title(), "My Plasma");

        let resolved = catalog.resolve("plasma").expect("resolve");
        assert_eq!(resolved.manifest().display_title(), "My Plasma");
    }

    #[test]
    fn resolves_by_manifest_name_and_path() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("shaders");
        create_pack(&root.join("waves-v2"), "gradient-waves", "Gradient Waves");

        let catalog = Catalog::new(vec![root.clone()]);
        let pack = catalog.resolve("gradient-waves").expect("by manifest name");
        assert_eq!(pack.root(), root.join("waves-v2"));

        let by_path = root.join("waves-v2");
        let pack = catalog
            .resolve(by_path.to_str().unwrap())
            .expect("by path");
        assert_eq!(pack.name(), "gradient-waves");

        let err = catalog.resolve("neon-fluid").unwrap_err();
        assert!(matches!(err, PackError::NotFound { ref name, .. } if name == "neon-fluid"));
    }

    #[test]
    fn earlier_root_manifest_name_beats_later_directory_name() {
        let temp = tempfile::tempdir().unwrap();
        let user = temp.path().join("user");
        let bundled = temp.path().join("bundled");
        create_pack(&user.join("my-plasma"), "plasma", "My Plasma");
        create_pack(&bundled.join("plasma"), "plasma", "Plasma");

        let catalog = Catalog::new(vec![user.clone(), bundled]);
        let pack = catalog.resolve("plasma").expect("resolve");
        assert_eq!(pack.root(), user.join("my-plasma"));
        assert_eq!(pack.manifest().display_title(), "My Plasma");

        let listed = catalog.list().expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].root(), pack.root());
    }

    #[test]
    fn broken_entries_are_listed_but_not_loaded() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("shaders");
        create_pack(&root.join("plasma"), "plasma", "Plasma");
        fs::create_dir_all(root.join("broken")).unwrap();
        fs::write(root.join("broken").join(MANIFEST_FILE), "fragment = 3").unwrap();

        let catalog = Catalog::new(vec![root]);
        let entries = catalog.entries().expect("entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name(), "broken");
        assert!(entries[0].pack.is_err());
        assert_eq!(catalog.list().expect("list").len(), 1);
    }
}
