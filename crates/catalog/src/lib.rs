//! Shader catalog: directories of `shader.toml` manifests plus GLSL sources.
//!
//! - `manifest` defines the schema and its validation.
//! - `pack` loads one entry and knows which files it installs.
//! - `repository` searches ordered roots, the first root winning on a name.
//!
//! The crate does not depend on the renderer; the `shaderz` binary turns
//! manifests into runtime uniform descriptors.
mod manifest;
mod pack;
mod repository;

pub use manifest::{
    parse_hex_color, AssetKind, AssetSpec, DefaultValue, ShaderManifest, UniformKind,
    UniformRole, UniformSpec,
};
pub use pack::{PackError, PackSources, ShaderPack, MANIFEST_FILE};
pub use repository::{Catalog, CatalogEntry};
