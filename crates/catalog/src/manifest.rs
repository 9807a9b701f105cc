//! Schema of `shader.toml`, the manifest every catalog entry carries.
//!
//! A manifest names the shader, points at its GLSL sources, declares the
//! uniforms the runtime should feed it, and lists the files the installer
//! copies into a project. Uniform kinds and roles mirror the renderer's
//! contract but stay plain data here so the catalog can be read without a GPU
//! stack.
//!
//! `ShaderManifest::validate` returns human-readable issues instead of failing
//! on the first one, so a broken entry reports everything wrong with it at once.
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ShaderManifest {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Fragment source, relative to the entry directory.
    pub fragment: PathBuf,
    /// Optional vertex source; the runtime's unit quad is used otherwise.
    #[serde(default)]
    pub vertex: Option<PathBuf>,
    /// `vec2` uniform fed with the pointer position.
    #[serde(default)]
    pub pointer: Option<String>,
    /// Extra files copied alongside the sources on install.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub asset: Option<AssetSpec>,
    #[serde(default)]
    pub uniforms: Vec<UniformSpec>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct UniformSpec {
    pub name: String,
    pub kind: UniformKind,
    /// Element capacity; arrays only.
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default)]
    pub role: UniformRole,
    /// Array counted by a `length` uniform.
    #[serde(default)]
    pub length_of: Option<String>,
    #[serde(default)]
    pub default: Option<DefaultValue>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "vec2")]
    Vec2,
    #[serde(rename = "vec3")]
    Vec3,
    #[serde(rename = "vec3[]")]
    Vec3Array,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "bool")]
    Bool,
}

impl UniformKind {
    pub fn glsl_name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec3Array => "vec3[]",
            Self::Int => "int",
            Self::Bool => "bool",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UniformRole {
    /// Supplied by the caller, optionally with a manifest default.
    #[default]
    Value,
    Time,
    Resolution,
    Quality,
    ReducedMotion,
    /// Element count of the array named by `length_of`.
    Length,
}

impl UniformRole {
    /// Kind a runtime-driven role must be declared with.
    pub fn required_kind(self) -> Option<UniformKind> {
        match self {
            Self::Value => None,
            Self::Time => Some(UniformKind::Float),
            Self::Resolution => Some(UniformKind::Vec2),
            Self::Quality | Self::Length => Some(UniformKind::Int),
            Self::ReducedMotion => Some(UniformKind::Bool),
        }
    }
}

/// Initial value for a caller-supplied uniform.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum DefaultValue {
    Bool(bool),
    Number(f64),
    /// `#RRGGBB` for a `vec3`.
    Color(String),
    Vector(Vec<f64>),
    /// `#RRGGBB` entries for a `vec3[]`.
    Palette(Vec<String>),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct AssetSpec {
    pub path: PathBuf,
    pub kind: AssetKind,
    /// A missing optional asset is skipped on install instead of failing it.
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Video,
}

impl AssetKind {
    /// Directory under the project's `public/` the asset is copied into.
    pub fn public_dir(self) -> &'static str {
        match self {
            Self::Video => "videos",
        }
    }
}

/// Parses `#RRGGBB` (leading `#` optional) into channels in `[0, 1]`.
pub fn parse_hex_color(text: &str) -> Result<[f32; 3], String> {
    let digits = text.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(format!("'{text}' is not a #RRGGBB colour"));
    }
    let mut channels = [0.0; 3];
    for (index, channel) in channels.iter_mut().enumerate() {
        let byte = u8::from_str_radix(&digits[index * 2..index * 2 + 2], 16)
            .map_err(|err| format!("'{text}': {err}"))?;
        *channel = f32::from(byte) / 255.0;
    }
    Ok(channels)
}

impl ShaderManifest {
    /// Title for display, falling back to the name.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformSpec> {
        self.uniforms.iter().find(|uniform| uniform.name == name)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
        {
            issues.push(format!(
                "shader name '{}' must use lowercase letters, digits, and '-'",
                self.name
            ));
        }

        let mut relative_paths: Vec<&Path> = vec![self.fragment.as_path()];
        relative_paths.extend(self.vertex.as_deref());
        relative_paths.extend(self.files.iter().map(PathBuf::as_path));
        relative_paths.extend(self.asset.as_ref().map(|asset| asset.path.as_path()));
        for path in relative_paths {
            if !is_contained(path) {
                issues.push(format!(
                    "path '{}' must stay inside the shader directory",
                    path.display()
                ));
            }
        }

        let mut seen = HashSet::new();
        for uniform in &self.uniforms {
            if !seen.insert(uniform.name.as_str()) {
                issues.push(format!("uniform '{}' is declared twice", uniform.name));
            }
            self.validate_uniform(uniform, &mut issues);
        }

        if let Some(pointer) = &self.pointer {
            match self.uniform(pointer) {
                None => issues.push(format!("pointer uniform '{pointer}' is not declared")),
                Some(uniform) if uniform.kind != UniformKind::Vec2 => issues.push(format!(
                    "pointer uniform '{pointer}' must be vec2, found {}",
                    uniform.kind.glsl_name()
                )),
                Some(uniform) if uniform.role != UniformRole::Value => issues.push(format!(
                    "pointer uniform '{pointer}' cannot be runtime-driven"
                )),
                Some(_) => {}
            }
        }
        issues
    }

    fn validate_uniform(&self, uniform: &UniformSpec, issues: &mut Vec<String>) {
        let name = &uniform.name;
        match (uniform.kind, uniform.capacity) {
            (UniformKind::Vec3Array, None) => {
                issues.push(format!("array uniform '{name}' needs a capacity"))
            }
            (UniformKind::Vec3Array, Some(0)) => {
                issues.push(format!("array uniform '{name}' has zero capacity"))
            }
            (UniformKind::Vec3Array, Some(_)) => {}
            (kind, Some(_)) => issues.push(format!(
                "uniform '{name}' is {} and cannot have a capacity",
                kind.glsl_name()
            )),
            (_, None) => {}
        }

        if let Some(required) = uniform.role.required_kind() {
            if uniform.kind != required {
                issues.push(format!(
                    "uniform '{name}' must be {} for its role",
                    required.glsl_name()
                ));
            }
        }

        match (&uniform.role, &uniform.length_of) {
            (UniformRole::Length, None) => {
                issues.push(format!("length uniform '{name}' needs length_of"))
            }
            (UniformRole::Length, Some(target)) => {
                let counts_array = self
                    .uniform(target)
                    .is_some_and(|candidate| candidate.kind == UniformKind::Vec3Array);
                if !counts_array {
                    issues.push(format!(
                        "length uniform '{name}' counts '{target}', which is not a declared array"
                    ));
                }
            }
            (_, Some(_)) => issues.push(format!(
                "uniform '{name}' sets length_of without role = \"length\""
            )),
            (_, None) => {}
        }

        let Some(default) = &uniform.default else {
            return;
        };
        if uniform.role != UniformRole::Value {
            issues.push(format!(
                "uniform '{name}' is runtime-driven and cannot have a default"
            ));
            return;
        }
        match (uniform.kind, default) {
            (UniformKind::Float | UniformKind::Int, DefaultValue::Number(_))
            | (UniformKind::Bool, DefaultValue::Bool(_)) => {}
            (UniformKind::Vec2, DefaultValue::Vector(items)) if items.len() == 2 => {}
            (UniformKind::Vec3, DefaultValue::Vector(items)) if items.len() == 3 => {}
            (UniformKind::Vec3, DefaultValue::Color(hex)) => {
                if let Err(err) = parse_hex_color(hex) {
                    issues.push(format!("uniform '{name}': {err}"));
                }
            }
            (UniformKind::Vec3Array, DefaultValue::Palette(colors)) => {
                for hex in colors {
                    if let Err(err) = parse_hex_color(hex) {
                        issues.push(format!("uniform '{name}': {err}"));
                    }
                }
                if let Some(capacity) = uniform.capacity {
                    if colors.len() > capacity {
                        issues.push(format!(
                            "uniform '{name}' defaults to {} colours but holds {capacity}",
                            colors.len()
                        ));
                    }
                }
            }
            (kind, _) => issues.push(format!(
                "default for uniform '{name}' does not fit {}",
                kind.glsl_name()
            )),
        }
    }
}

fn is_contained(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    const AURORA: &str = r##"
name = "aurora"
title = "Aurora"
fragment = "aurora.frag"
pointer = "uMouse"

[[uniforms]]
name = "uTime"
kind = "float"
role = "time"

[[uniforms]]
name = "uMouse"
kind = "vec2"

[[uniforms]]
name = "uPalette"
kind = "vec3[]"
capacity = 5
default = ["#0B3D2E", "#1DE9B6", "#7C4DFF"]

[[uniforms]]
name = "uPaletteSize"
kind = "int"
role = "length"
length_of = "uPalette"

[[uniforms]]
name = "uIntensity"
kind = "float"
default = 1
"##;

    fn parse(text: &str) -> ShaderManifest {
        toml::from_str(text).expect("manifest parses")
    }

    #[test]
    fn valid_manifest_has_no_issues() {
        let manifest = parse(AURORA);
        assert!(manifest.validate().is_empty(), "{:?}", manifest.validate());
        assert_eq!(manifest.display_title(), "Aurora");
        assert_eq!(
            manifest.uniform("uIntensity").and_then(|u| u.default.clone()),
            Some(DefaultValue::Number(1.0))
        );
        assert_eq!(
            manifest.uniform("uPaletteSize").map(|u| u.role),
            Some(UniformRole::Length)
        );
    }

    #[test]
    fn reports_every_problem_at_once() {
        let text = AURORA
            .replace("name = \"aurora\"", "name = \"Aurora Borealis\"")
            .replace("length_of = \"uPalette\"", "length_of = \"uMouse\"")
            .replace("#7C4DFF", "#7C4DF")
            .replace("pointer = \"uMouse\"", "pointer = \"uCursor\"");
        let issues = parse(&text).validate();

        assert!(issues.iter().any(|issue| issue.contains("lowercase")));
        assert!(issues.iter().any(|issue| issue.contains("not a declared array")));
        assert!(issues.iter().any(|issue| issue.contains("#RRGGBB")));
        assert!(issues.iter().any(|issue| issue.contains("uCursor")));
    }

    #[test]
    fn capacity_only_applies_to_arrays() {
        let text = AURORA.replace(
            "name = \"uMouse\"\nkind = \"vec2\"",
            "name = \"uMouse\"\nkind = \"vec2\"\ncapacity = 2",
        );
        let issues = parse(&text).validate();
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert!(issues[0].contains("cannot have a capacity"));
    }

    #[test]
    fn duplicate_names_and_escaping_paths_are_rejected() {
        let mut manifest = parse(AURORA);
        manifest.uniforms.push(manifest.uniforms[0].clone());
        manifest.files.push(PathBuf::from("../outside.txt"));
        let issues = manifest.validate();
        assert!(issues.iter().any(|issue| issue.contains("declared twice")));
        assert!(issues.iter().any(|issue| issue.contains("outside.txt")));
    }

    #[test]
    fn hex_colours_scale_to_unit_range() {
        assert_eq!(parse_hex_color("#FF0080").unwrap(), [1.0, 0.0, 128.0 / 255.0]);
        assert_eq!(parse_hex_color("000000").unwrap(), [0.0; 3]);
        assert!(parse_hex_color("#12345").is_err());
        assert!(parse_hex_color("#GG0000").is_err());
    }
}
