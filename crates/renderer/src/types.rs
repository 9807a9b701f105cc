use std::fmt;

use crate::compile::DEFAULT_VERTEX_SHADER;

/// Vertex and fragment text for one program.
///
/// Sources are immutable once handed to the runtime; replacing them wholesale
/// through [`ShaderSurface::update_shader_source`](crate::ShaderSurface::update_shader_source)
/// triggers a full recompile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSource {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// Pairs `fragment` with the runtime's unit-quad vertex shader.
    pub fn fragment_only(fragment: impl Into<String>) -> Self {
        Self::new(DEFAULT_VERTEX_SHADER, fragment)
    }
}

/// GLSL type of a declared uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Scalar,
    Vec2,
    Vec3,
    /// Fixed-capacity `vec3[capacity]`; the logical length travels in a
    /// companion `LengthOf` uniform.
    Vec3Array { capacity: usize },
    Int,
    Bool,
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformKind::Scalar => f.write_str("float"),
            UniformKind::Vec2 => f.write_str("vec2"),
            UniformKind::Vec3 => f.write_str("vec3"),
            UniformKind::Vec3Array { capacity } => write!(f, "vec3[{capacity}]"),
            UniformKind::Int => f.write_str("int"),
            UniformKind::Bool => f.write_str("bool"),
        }
    }
}

/// Where the value of a uniform comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UniformRole {
    /// Seconds since the clock started, or zero under reduced motion.
    Time,
    /// Drawing-buffer size in device pixels.
    Resolution,
    /// Quality tier level (0 = low, 1 = medium, 2 = high).
    Quality,
    /// Mirrors [`RuntimeOptions::reduced_motion`].
    ReducedMotion,
    /// Element count of the named array uniform.
    LengthOf(String),
    /// Supplied by the caller through `update_uniform_values`.
    #[default]
    Value,
}

impl UniformRole {
    /// Derived roles are owned by the runtime and cannot be written by callers.
    pub fn is_derived(&self) -> bool {
        !matches!(self, UniformRole::Value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDescriptor {
    pub name: String,
    pub kind: UniformKind,
    pub role: UniformRole,
}

impl UniformDescriptor {
    pub fn new(name: impl Into<String>, kind: UniformKind, role: UniformRole) -> Self {
        Self {
            name: name.into(),
            kind,
            role,
        }
    }

    pub fn value(name: impl Into<String>, kind: UniformKind) -> Self {
        Self::new(name, kind, UniformRole::Value)
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, UniformKind::Scalar, UniformRole::Time)
    }

    pub fn resolution(name: impl Into<String>) -> Self {
        Self::new(name, UniformKind::Vec2, UniformRole::Resolution)
    }

    pub fn quality(name: impl Into<String>) -> Self {
        Self::new(name, UniformKind::Int, UniformRole::Quality)
    }

    pub fn reduced_motion(name: impl Into<String>) -> Self {
        Self::new(name, UniformKind::Bool, UniformRole::ReducedMotion)
    }

    pub fn length_of(name: impl Into<String>, array: impl Into<String>) -> Self {
        Self::new(name, UniformKind::Int, UniformRole::LengthOf(array.into()))
    }
}

/// The minimal uniform contract every catalog shader satisfies: `time` and
/// `resolution`.
pub fn default_uniforms() -> Vec<UniformDescriptor> {
    vec![
        UniformDescriptor::time("time"),
        UniformDescriptor::resolution("resolution"),
    ]
}

/// Owned uniform value as stored in the runtime's value set.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Scalar(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec3Array(Vec<[f32; 3]>),
    Int(i32),
    Bool(bool),
}

impl UniformValue {
    /// Zero value for a declared kind; arrays start out empty.
    pub fn zero(kind: UniformKind) -> Self {
        match kind {
            UniformKind::Scalar => UniformValue::Scalar(0.0),
            UniformKind::Vec2 => UniformValue::Vec2([0.0; 2]),
            UniformKind::Vec3 => UniformValue::Vec3([0.0; 3]),
            UniformKind::Vec3Array { .. } => UniformValue::Vec3Array(Vec::new()),
            UniformKind::Int => UniformValue::Int(0),
            UniformKind::Bool => UniformValue::Bool(false),
        }
    }

    /// Arrays of any length match an array kind; capacity is enforced at bind time.
    pub fn matches_kind(&self, kind: UniformKind) -> bool {
        matches!(
            (self, kind),
            (UniformValue::Scalar(_), UniformKind::Scalar)
                | (UniformValue::Vec2(_), UniformKind::Vec2)
                | (UniformValue::Vec3(_), UniformKind::Vec3)
                | (UniformValue::Vec3Array(_), UniformKind::Vec3Array { .. })
                | (UniformValue::Int(_), UniformKind::Int)
                | (UniformValue::Bool(_), UniformKind::Bool)
        )
    }

    pub fn as_data(&self) -> UniformData<'_> {
        match self {
            UniformValue::Scalar(v) => UniformData::Scalar(*v),
            UniformValue::Vec2(v) => UniformData::Vec2(*v),
            UniformValue::Vec3(v) => UniformData::Vec3(*v),
            UniformValue::Vec3Array(v) => UniformData::Vec3Array(v.as_slice()),
            UniformValue::Int(v) => UniformData::Int(*v),
            UniformValue::Bool(v) => UniformData::Bool(*v),
        }
    }
}

/// Borrowed view handed to [`GpuBackend::set_uniform`](crate::GpuBackend::set_uniform).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformData<'a> {
    Scalar(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec3Array(&'a [[f32; 3]]),
    Int(i32),
    Bool(bool),
}

/// Rendering quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    Low,
    Medium,
    #[default]
    High,
}

impl Quality {
    /// Ceiling applied to the device pixel ratio when sizing the drawing buffer.
    pub fn pixel_ratio_cap(self) -> f64 {
        match self {
            Quality::Low => 1.0,
            Quality::Medium => 1.5,
            Quality::High => 2.0,
        }
    }

    /// Level exposed to shaders through `Quality` uniforms.
    pub fn level(self) -> i32 {
        match self {
            Quality::Low => 0,
            Quality::Medium => 1,
            Quality::High => 2,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Low => f.write_str("low"),
            Quality::Medium => f.write_str("medium"),
            Quality::High => f.write_str("high"),
        }
    }
}

/// Construction options for a [`ShaderSurface`](crate::ShaderSurface).
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Pixel-ratio ceiling and shader quality level.
    pub quality: Quality,
    /// Pins time to zero and feeds `ReducedMotion` uniforms.
    pub reduced_motion: bool,
    /// Colour the drawing buffer is cleared to before every draw.
    pub clear_color: [f32; 4],
    /// Whether the host surface starts out visible.
    pub visible: bool,
    /// Release every GPU handle while hidden instead of merely pausing; the
    /// instance rebuilds itself when it becomes visible again.
    pub release_when_hidden: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            quality: Quality::High,
            reduced_motion: false,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            visible: true,
            release_when_hidden: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_tiers_map_to_caps_and_levels() {
        assert_eq!(Quality::Low.pixel_ratio_cap(), 1.0);
        assert_eq!(Quality::Medium.pixel_ratio_cap(), 1.5);
        assert_eq!(Quality::High.pixel_ratio_cap(), 2.0);
        assert_eq!(
            [Quality::Low, Quality::Medium, Quality::High].map(Quality::level),
            [0, 1, 2]
        );
    }

    #[test]
    fn array_values_match_any_capacity() {
        let palette = UniformValue::Vec3Array(vec![[1.0, 0.0, 0.0]; 7]);
        assert!(palette.matches_kind(UniformKind::Vec3Array { capacity: 5 }));
        assert!(!palette.matches_kind(UniformKind::Vec3));
        assert!(!UniformValue::Int(3).matches_kind(UniformKind::Bool));
    }

    #[test]
    fn only_value_role_is_caller_writable() {
        assert!(!UniformRole::Value.is_derived());
        assert!(UniformRole::Time.is_derived());
        assert!(UniformRole::LengthOf("palette".into()).is_derived());
    }
}
