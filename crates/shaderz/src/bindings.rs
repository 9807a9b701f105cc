//! Catalog manifests to runtime types.
use anyhow::{anyhow, Context, Result};
use catalog::{DefaultValue, ShaderManifest, ShaderPack, UniformSpec};
use renderer::{
    default_uniforms, validate_descriptors, PreviewShader, ShaderSource, UniformDescriptor,
    UniformKind, UniformRole, UniformValue, DEFAULT_VERTEX_SHADER,
};

/// Runtime descriptors for a manifest. A manifest without uniforms gets the
/// minimal `time`/`resolution` pair.
pub fn descriptors(manifest: &ShaderManifest) -> Vec<UniformDescriptor> {
    if manifest.uniforms.is_empty() {
        return default_uniforms();
    }
    manifest.uniforms.iter().map(descriptor).collect()
}

fn descriptor(spec: &UniformSpec) -> UniformDescriptor {
    let kind = match spec.kind {
        catalog::UniformKind::Float => UniformKind::Scalar,
        catalog::UniformKind::Vec2 => UniformKind::Vec2,
        catalog::UniformKind::Vec3 => UniformKind::Vec3,
        catalog::UniformKind::Vec3Array => UniformKind::Vec3Array {
            capacity: spec.capacity.unwrap_or(1),
        },
        catalog::UniformKind::Int => UniformKind::Int,
        catalog::UniformKind::Bool => UniformKind::Bool,
    };
    let role = match spec.role {
        catalog::UniformRole::Value => UniformRole::Value,
        catalog::UniformRole::Time => UniformRole::Time,
        catalog::UniformRole::Resolution => UniformRole::Resolution,
        catalog::UniformRole::Quality => UniformRole::Quality,
        catalog::UniformRole::ReducedMotion => UniformRole::ReducedMotion,
        catalog::UniformRole::Length => {
            UniformRole::LengthOf(spec.length_of.clone().unwrap_or_default())
        }
    };
    UniformDescriptor::new(spec.name.clone(), kind, role)
}

/// Manifest defaults as an initial uniform update.
pub fn initial_values(manifest: &ShaderManifest) -> Result<Vec<(String, UniformValue)>> {
    let mut values = Vec::new();
    for spec in &manifest.uniforms {
        let Some(default) = &spec.default else {
            continue;
        };
        let value = default_value(spec, default)
            .with_context(|| format!("invalid default for uniform '{}'", spec.name))?;
        values.push((spec.name.clone(), value));
    }
    Ok(values)
}

fn default_value(spec: &UniformSpec, default: &DefaultValue) -> Result<UniformValue> {
    use catalog::UniformKind as Kind;

    let value = match (spec.kind, default) {
        (Kind::Float, DefaultValue::Number(number)) => UniformValue::Scalar(*number as f32),
        (Kind::Int, DefaultValue::Number(number)) => UniformValue::Int(*number as i32),
        (Kind::Bool, DefaultValue::Bool(flag)) => UniformValue::Bool(*flag),
        (Kind::Vec2, DefaultValue::Vector(items)) if items.len() == 2 => {
            UniformValue::Vec2([items[0] as f32, items[1] as f32])
        }
        (Kind::Vec3, DefaultValue::Vector(items)) if items.len() == 3 => {
            UniformValue::Vec3([items[0] as f32, items[1] as f32, items[2] as f32])
        }
        (Kind::Vec3, DefaultValue::Color(hex)) => {
            UniformValue::Vec3(catalog::parse_hex_color(hex).map_err(|err| anyhow!(err))?)
        }
        (Kind::Vec3Array, DefaultValue::Palette(colors)) => UniformValue::Vec3Array(
            colors
                .iter()
                .map(|hex| catalog::parse_hex_color(hex))
                .collect::<Result<_, _>>()
                .map_err(|err| anyhow!(err))?,
        ),
        (kind, _) => return Err(anyhow!("value does not fit {}", kind.glsl_name())),
    };
    Ok(value)
}

/// Reads the pack's GLSL, substituting the runtime's unit quad when no vertex
/// shader is shipped.
pub fn shader_source(pack: &ShaderPack) -> Result<ShaderSource> {
    let sources = pack
        .read_sources()
        .with_context(|| format!("failed to read sources for '{}'", pack.name()))?;
    Ok(ShaderSource::new(
        sources
            .vertex
            .unwrap_or_else(|| DEFAULT_VERTEX_SHADER.to_string()),
        sources.fragment,
    ))
}

/// Everything the preview window needs to show `pack`.
pub fn preview_shader(pack: &ShaderPack) -> Result<PreviewShader> {
    let manifest = pack.manifest();
    let uniforms = descriptors(manifest);
    validate_descriptors(&uniforms)
        .with_context(|| format!("shader '{}' declares unusable uniforms", pack.name()))?;
    Ok(PreviewShader {
        name: pack.name().to_string(),
        source: shader_source(pack)?,
        uniforms,
        values: initial_values(manifest)?,
        pointer: manifest.pointer.clone(),
    })
}
