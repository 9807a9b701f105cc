//! Translation of WebGL-dialect shader text into Vulkan-flavoured GLSL 450.
//!
//! Catalog shaders are written the way a browser canvas expects them: loose
//! `uniform` declarations, `attribute`/`varying`, `gl_FragColor`, and
//! `precision` statements. wgpu wants explicit locations and a uniform block,
//! so every declared uniform is gathered into one std140 block at set 0,
//! binding 0. The block always starts with `shaderz_viewport`, which the
//! backend fills with the drawing-buffer size so `gl_FragCoord` can be
//! remapped to a bottom-left origin.
//!
//! Stripped lines are replaced by blank lines and the user text starts at
//! `#line 1`, so diagnostics point at the author's own line numbers.
use std::fmt::Write as _;

use wgpu::naga;

use crate::backend::ShaderStage;
use crate::compile::{identifiers, references_identifier};
use crate::types::{UniformDescriptor, UniformKind};

/// Byte size of the leading viewport `vec4`.
const VIEWPORT_BYTES: u32 = 16;

const PRECISION_QUALIFIERS: [&str; 3] = ["lowp", "mediump", "highp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockEntry {
    pub name: String,
    pub kind: UniformKind,
    pub offset: u32,
}

/// std140 placement of every declared uniform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockLayout {
    entries: Vec<BlockEntry>,
    size: u32,
}

impl BlockLayout {
    pub fn new(uniforms: &[UniformDescriptor]) -> Self {
        let mut offset = VIEWPORT_BYTES;
        let mut entries = Vec::with_capacity(uniforms.len());
        for descriptor in uniforms {
            let (align, size) = std140_extent(descriptor.kind);
            offset = align_up(offset, align);
            entries.push(BlockEntry {
                name: descriptor.name.clone(),
                kind: descriptor.kind,
                offset,
            });
            offset += size;
        }
        Self {
            entries,
            size: align_up(offset, 16),
        }
    }

    /// Total block size in bytes, a multiple of 16.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn entry(&self, name: &str) -> Option<&BlockEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    fn declaration(&self) -> String {
        let mut block = String::from(
            "layout(std140, set = 0, binding = 0) uniform ShaderzUniforms {\n    vec4 shaderz_viewport;\n",
        );
        let mut flags = String::new();
        for entry in &self.entries {
            let _ = match entry.kind {
                UniformKind::Scalar => writeln!(block, "    float {};", entry.name),
                UniformKind::Vec2 => writeln!(block, "    vec2 {};", entry.name),
                UniformKind::Vec3 => writeln!(block, "    vec3 {};", entry.name),
                UniformKind::Vec3Array { capacity } => {
                    writeln!(block, "    vec3 {}[{capacity}];", entry.name)
                }
                UniformKind::Int => writeln!(block, "    int {};", entry.name),
                UniformKind::Bool => {
                    let _ = writeln!(
                        flags,
                        "#define {name} (shaderz_flag_{name} != 0)",
                        name = entry.name
                    );
                    writeln!(block, "    int shaderz_flag_{};", entry.name)
                }
            };
        }
        block.push_str("};\n");
        block.push_str(&flags);
        block
    }
}

/// Base alignment and size of `kind` under std140.
fn std140_extent(kind: UniformKind) -> (u32, u32) {
    match kind {
        UniformKind::Scalar | UniformKind::Int | UniformKind::Bool => (4, 4),
        UniformKind::Vec2 => (8, 8),
        UniformKind::Vec3 => (16, 12),
        UniformKind::Vec3Array { capacity } => (16, 16 * capacity as u32),
    }
}

fn align_up(offset: u32, align: u32) -> u32 {
    offset.div_ceil(align) * align
}

/// Result of translating one stage.
#[derive(Debug, Clone)]
pub(crate) struct Translation {
    pub text: String,
    /// Varying names in declaration order.
    pub varyings: Vec<String>,
    /// Declared uniforms the author's text actually uses.
    pub referenced: Vec<String>,
}

/// Translates `source` for `stage`.
///
/// Fragment varyings take the location their name has in `vertex_varyings`
/// when given; a name the vertex stage does not write is an error. Without the
/// table locations follow declaration order, which is enough to validate a
/// stage on its own.
pub(crate) fn translate(
    stage: ShaderStage,
    source: &str,
    layout: &BlockLayout,
    vertex_varyings: Option<&[String]>,
) -> Result<Translation, String> {
    let mut body = String::with_capacity(source.len() + 64);
    let mut varyings = Vec::new();
    let mut attributes = 0u32;

    for (index, line) in source.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim_start();
        let translated = if trimmed.starts_with("#version") || trimmed.starts_with("precision ") {
            String::new()
        } else if let Some(rest) = trimmed.strip_prefix("uniform ") {
            let name = declared_name(rest).unwrap_or_default();
            if layout.entry(name).is_none() {
                return Err(format!(
                    "ERROR: 0:{line_no}: uniform '{name}' has no declared descriptor"
                ));
            }
            String::new()
        } else if let Some(rest) = trimmed.strip_prefix("attribute ") {
            if stage != ShaderStage::Vertex {
                return Err(format!(
                    "ERROR: 0:{line_no}: 'attribute' is only valid in vertex shaders"
                ));
            }
            let location = attributes;
            attributes += 1;
            format!("layout(location = {location}) in {rest}")
        } else if let Some(rest) = trimmed.strip_prefix("varying ") {
            let name = declared_name(rest)
                .ok_or_else(|| format!("ERROR: 0:{line_no}: malformed varying declaration"))?
                .to_string();
            let location = match (stage, vertex_varyings) {
                (ShaderStage::Fragment, Some(table)) => table
                    .iter()
                    .position(|candidate| *candidate == name)
                    .ok_or_else(|| {
                        format!("varying '{name}' is not written by the vertex shader")
                    })?,
                _ => varyings.len(),
            };
            let direction = match stage {
                ShaderStage::Vertex => "out",
                ShaderStage::Fragment => "in",
            };
            varyings.push(name);
            format!("layout(location = {location}) {direction} {rest}")
        } else {
            line.to_string()
        };
        body.push_str(&translated);
        body.push('\n');
    }

    let referenced = layout
        .entries()
        .iter()
        .filter(|entry| references_identifier(&body, &entry.name))
        .map(|entry| entry.name.clone())
        .collect();

    let mut text = String::with_capacity(body.len() + 1024);
    text.push_str("#version 450\n");
    text.push_str(&layout.declaration());
    match stage {
        ShaderStage::Vertex => {
            text.push_str("#line 1\n");
            text.push_str(&body);
        }
        ShaderStage::Fragment => {
            text.push_str(FRAGMENT_HEADER);
            text.push_str("#line 1\n");
            text.push_str(&body);
            text.push_str(FRAGMENT_FOOTER);
        }
    }

    Ok(Translation {
        text,
        varyings,
        referenced,
    })
}

/// Name declared by `type name[...]` after the storage keyword.
fn declared_name(rest: &str) -> Option<&str> {
    identifiers(rest)
        .filter(|ident| !PRECISION_QUALIFIERS.contains(ident))
        .nth(1)
}

const FRAGMENT_HEADER: &str = r"layout(location = 0) out vec4 shaderz_frag_color;
vec4 shaderz_frag_coord;
#define gl_FragColor shaderz_frag_color
#define gl_FragCoord shaderz_frag_coord
#define main shaderz_entry
";

const FRAGMENT_FOOTER: &str = r"#undef main
#undef gl_FragCoord
void main() {
    shaderz_frag_coord = vec4(gl_FragCoord.x, shaderz_viewport.y - gl_FragCoord.y, gl_FragCoord.z, gl_FragCoord.w);
    shaderz_entry();
}
";

pub(crate) fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

/// Parses and validates translated text, returning the rendered diagnostic on
/// failure.
pub(crate) fn validate(stage: ShaderStage, text: &str) -> Result<naga::Module, String> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(naga_stage(stage));
    let module = frontend
        .parse(&options, text)
        .map_err(|errors| errors.emit_to_string(text))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|error| error.emit_to_string(text))?;
    Ok(module)
}
