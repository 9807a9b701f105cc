//! Uniform value storage and the per-frame binder.
//!
//! `UniformValues` is the only state `update_uniform_values` touches; `bind`
//! reads it together with the runtime-derived `FrameInputs` and pushes every
//! present location of the current program.
use thiserror::Error;

use crate::backend::GpuBackend;
use crate::compile::CompiledProgram;
use crate::types::{Quality, UniformData, UniformDescriptor, UniformKind, UniformRole, UniformValue};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UniformError {
    #[error("uniform '{0}' is not declared")]
    Unknown(String),
    #[error("uniform '{name}' expects a {expected} value")]
    KindMismatch { name: String, expected: UniformKind },
    #[error("uniform '{0}' is driven by the runtime and cannot be set")]
    Derived(String),
    #[error("invalid uniform declaration: {0}")]
    InvalidDescriptor(String),
}

/// Checks that a descriptor set is internally consistent.
pub fn validate_descriptors(descriptors: &[UniformDescriptor]) -> Result<(), UniformError> {
    for (index, descriptor) in descriptors.iter().enumerate() {
        if descriptors[..index]
            .iter()
            .any(|earlier| earlier.name == descriptor.name)
        {
            return Err(UniformError::InvalidDescriptor(format!(
                "'{}' declared twice",
                descriptor.name
            )));
        }

        let expected = match &descriptor.role {
            UniformRole::Time => Some(UniformKind::Scalar),
            UniformRole::Resolution => Some(UniformKind::Vec2),
            UniformRole::Quality | UniformRole::LengthOf(_) => Some(UniformKind::Int),
            UniformRole::ReducedMotion => Some(UniformKind::Bool),
            UniformRole::Value => None,
        };
        if let Some(expected) = expected {
            if descriptor.kind != expected {
                return Err(UniformError::InvalidDescriptor(format!(
                    "'{}' must be {expected} for its role, found {}",
                    descriptor.name, descriptor.kind
                )));
            }
        }

        if let UniformKind::Vec3Array { capacity: 0 } = descriptor.kind {
            return Err(UniformError::InvalidDescriptor(format!(
                "'{}' has zero capacity",
                descriptor.name
            )));
        }

        if let UniformRole::LengthOf(array) = &descriptor.role {
            let target = descriptors.iter().find(|candidate| &candidate.name == array);
            if !matches!(
                target.map(|candidate| candidate.kind),
                Some(UniformKind::Vec3Array { .. })
            ) {
                return Err(UniformError::InvalidDescriptor(format!(
                    "'{}' counts '{array}', which is not a declared array",
                    descriptor.name
                )));
            }
        }
    }
    Ok(())
}

/// Current caller-supplied values, index-aligned with the declared set.
#[derive(Debug, Clone)]
pub struct UniformValues {
    descriptors: Vec<UniformDescriptor>,
    values: Vec<UniformValue>,
}

impl UniformValues {
    /// Starts every uniform at its zero value.
    pub fn new(descriptors: Vec<UniformDescriptor>) -> Self {
        let values = descriptors
            .iter()
            .map(|descriptor| UniformValue::zero(descriptor.kind))
            .collect();
        Self {
            descriptors,
            values,
        }
    }

    pub fn descriptors(&self) -> &[UniformDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.index_of(name).map(|index| &self.values[index])
    }

    /// Merges a partial update and returns how many values actually changed.
    ///
    /// The whole update is rejected, leaving every value untouched, when any
    /// entry names an unknown or runtime-derived uniform or has the wrong kind.
    pub fn apply<I, K>(&mut self, partial: I) -> Result<usize, UniformError>
    where
        I: IntoIterator<Item = (K, UniformValue)>,
        K: AsRef<str>,
    {
        let mut staged = Vec::new();
        for (name, value) in partial {
            let name = name.as_ref();
            let index = self
                .index_of(name)
                .ok_or_else(|| UniformError::Unknown(name.to_string()))?;
            let descriptor = &self.descriptors[index];
            if descriptor.role.is_derived() {
                return Err(UniformError::Derived(name.to_string()));
            }
            if !value.matches_kind(descriptor.kind) {
                return Err(UniformError::KindMismatch {
                    name: name.to_string(),
                    expected: descriptor.kind,
                });
            }
            staged.push((index, value));
        }

        let mut changed = 0;
        for (index, value) in staged {
            if self.values[index] != value {
                self.values[index] = value;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Logical length of an array uniform, clamped to its capacity.
    fn bound_length(&self, array: &str) -> i32 {
        let Some(index) = self.index_of(array) else {
            return 0;
        };
        match (&self.values[index], self.descriptors[index].kind) {
            (UniformValue::Vec3Array(items), UniformKind::Vec3Array { capacity }) => {
                items.len().min(capacity) as i32
            }
            _ => 0,
        }
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.descriptors
            .iter()
            .position(|descriptor| descriptor.name == name)
    }
}

/// Runtime-owned inputs for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    /// Seconds on the instance clock.
    pub elapsed: f32,
    /// Drawing-buffer size in device pixels.
    pub resolution: [f32; 2],
    pub quality: Quality,
    pub reduced_motion: bool,
}

/// Pushes every declared uniform whose location is present in `program`.
pub fn bind<B: GpuBackend>(
    backend: &mut B,
    program: &CompiledProgram<B>,
    values: &UniformValues,
    frame: &FrameInputs,
) {
    for (index, descriptor) in values.descriptors.iter().enumerate() {
        let Some(location) = program.location(&descriptor.name) else {
            continue;
        };
        let data = match &descriptor.role {
            UniformRole::Time => {
                UniformData::Scalar(if frame.reduced_motion { 0.0 } else { frame.elapsed })
            }
            UniformRole::Resolution => UniformData::Vec2(frame.resolution),
            UniformRole::Quality => UniformData::Int(frame.quality.level()),
            UniformRole::ReducedMotion => UniformData::Bool(frame.reduced_motion),
            UniformRole::LengthOf(array) => UniformData::Int(values.bound_length(array)),
            UniformRole::Value => match (&values.values[index], descriptor.kind) {
                (UniformValue::Vec3Array(items), UniformKind::Vec3Array { capacity }) => {
                    UniformData::Vec3Array(&items[..items.len().min(capacity)])
                }
                (value, _) => value.as_data(),
            },
        };
        backend.set_uniform(program.handle(), location, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile_program;
    use crate::headless::HeadlessBackend;
    use crate::types::ShaderSource;

    const AURORA_LIKE: &str = r"
        uniform float uTime;
        uniform vec2 uResolution;
        uniform vec3 uPalette[5];
        uniform int uPaletteSize;
        uniform bool uReducedMotion;
        void main() {
            vec3 c = uPalette[uPaletteSize - 1] * uTime;
            gl_FragColor = vec4(c / uResolution.x, uReducedMotion ? 0.0 : 1.0);
        }
    ";

    fn aurora_descriptors() -> Vec<UniformDescriptor> {
        vec![
            UniformDescriptor::time("uTime"),
            UniformDescriptor::resolution("uResolution"),
            UniformDescriptor::value("uPalette", UniformKind::Vec3Array { capacity: 5 }),
            UniformDescriptor::length_of("uPaletteSize", "uPalette"),
            UniformDescriptor::reduced_motion("uReducedMotion"),
            UniformDescriptor::value("uIntensity", UniformKind::Scalar),
        ]
    }

    fn frame(elapsed: f32, reduced_motion: bool) -> FrameInputs {
        FrameInputs {
            elapsed,
            resolution: [640.0, 480.0],
            quality: Quality::Medium,
            reduced_motion,
        }
    }

    #[test]
    fn short_palette_sets_count_and_leaves_tail_slots() {
        let mut backend = HeadlessBackend::detached();
        let descriptors = aurora_descriptors();
        let program = compile_program(
            &mut backend,
            &ShaderSource::fragment_only(AURORA_LIKE),
            &descriptors,
        )
        .expect("compiles");
        let mut values = UniformValues::new(descriptors);
        let palette = vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        values
            .apply([("uPalette", UniformValue::Vec3Array(palette.clone()))])
            .unwrap();

        bind(&mut backend, &program, &values, &frame(1.0, false));

        let ledger = backend.ledger();
        assert_eq!(ledger.uniform("uPaletteSize"), Some(UniformValue::Int(3)));
        let Some(UniformValue::Vec3Array(slots)) = ledger.uniform("uPalette") else {
            panic!("palette not written");
        };
        assert_eq!(slots.len(), 5);
        assert_eq!(&slots[..3], palette.as_slice());
        assert_eq!(slots[3], [0.0; 3]);
        assert_eq!(slots[4], [0.0; 3]);
        assert_eq!(ledger.oversized_array_writes(), 0);
    }

    #[test]
    fn long_palette_is_clamped_to_capacity() {
        let mut backend = HeadlessBackend::detached();
        let descriptors = aurora_descriptors();
        let program = compile_program(
            &mut backend,
            &ShaderSource::fragment_only(AURORA_LIKE),
            &descriptors,
        )
        .expect("compiles");
        let mut values = UniformValues::new(descriptors);
        values
            .apply([("uPalette", UniformValue::Vec3Array(vec![[0.5; 3]; 8]))])
            .unwrap();

        bind(&mut backend, &program, &values, &frame(1.0, false));

        assert_eq!(backend.ledger().uniform("uPaletteSize"), Some(UniformValue::Int(5)));
        assert_eq!(backend.ledger().oversized_array_writes(), 0);
    }

    #[test]
    fn reduced_motion_pins_time_to_zero() {
        let mut backend = HeadlessBackend::detached();
        let descriptors = aurora_descriptors();
        let program = compile_program(
            &mut backend,
            &ShaderSource::fragment_only(AURORA_LIKE),
            &descriptors,
        )
        .expect("compiles");
        let values = UniformValues::new(descriptors);

        bind(&mut backend, &program, &values, &frame(12.5, false));
        assert_eq!(backend.ledger().uniform("uTime"), Some(UniformValue::Scalar(12.5)));

        bind(&mut backend, &program, &values, &frame(13.0, true));
        assert_eq!(backend.ledger().uniform("uTime"), Some(UniformValue::Scalar(0.0)));
        assert_eq!(
            backend.ledger().uniform("uReducedMotion"),
            Some(UniformValue::Bool(true))
        );
    }

    #[test]
    fn absent_locations_are_skipped() {
        let mut backend = HeadlessBackend::detached();
        let descriptors = aurora_descriptors();
        let program = compile_program(
            &mut backend,
            &ShaderSource::fragment_only(AURORA_LIKE),
            &descriptors,
        )
        .expect("compiles");
        let mut values = UniformValues::new(descriptors);
        values
            .apply([("uIntensity", UniformValue::Scalar(1.2))])
            .unwrap();

        bind(&mut backend, &program, &values, &frame(0.0, false));
        assert_eq!(backend.ledger().uniform("uIntensity"), None);
        assert_eq!(backend.ledger().stale_writes(), 0);
    }

    #[test]
    fn apply_is_all_or_nothing() {
        let mut values = UniformValues::new(aurora_descriptors());
        let err = values
            .apply([
                ("uIntensity", UniformValue::Scalar(2.0)),
                ("uTime", UniformValue::Scalar(4.0)),
            ])
            .unwrap_err();
        assert_eq!(err, UniformError::Derived("uTime".into()));
        assert_eq!(values.get("uIntensity"), Some(&UniformValue::Scalar(0.0)));

        let err = values
            .apply([("uIntensity", UniformValue::Int(2))])
            .unwrap_err();
        assert!(matches!(err, UniformError::KindMismatch { .. }));
        assert!(matches!(
            values.apply([("missing", UniformValue::Int(2))]),
            Err(UniformError::Unknown(_))
        ));
    }

    #[test]
    fn apply_counts_only_changed_values() {
        let mut values = UniformValues::new(aurora_descriptors());
        let changed = values
            .apply([
                ("uIntensity", UniformValue::Scalar(0.0)),
                ("uPalette", UniformValue::Vec3Array(vec![[1.0; 3]])),
            ])
            .unwrap();
        assert_eq!(changed, 1);
    }

    #[test]
    fn descriptor_validation_catches_role_and_target_errors() {
        assert!(validate_descriptors(&aurora_descriptors()).is_ok());
        assert!(validate_descriptors(&[UniformDescriptor::new(
            "time",
            UniformKind::Int,
            UniformRole::Time
        )])
        .is_err());
        assert!(validate_descriptors(&[UniformDescriptor::length_of("count", "palette")]).is_err());
        assert!(validate_descriptors(&[
            UniformDescriptor::time("time"),
            UniformDescriptor::time("time")
        ])
        .is_err());
    }
}
