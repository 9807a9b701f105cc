use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{GpuBackend, ShaderStage};
use crate::types::{ShaderSource, UniformDescriptor};

/// Unit-quad vertex shader supplied when a source only carries fragment text.
///
/// Written in the same WebGL dialect as catalog fragments; `vUv` runs from
/// (0, 0) at the bottom-left corner to (1, 1) at the top-right.
pub const DEFAULT_VERTEX_SHADER: &str = r"attribute vec2 position;
varying vec2 vUv;

void main() {
    vUv = position * 0.5 + 0.5;
    gl_Position = vec4(position, 0.0, 1.0);
}
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStage {
    Vertex,
    Fragment,
    Link,
}

impl From<ShaderStage> for CompileStage {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => CompileStage::Vertex,
            ShaderStage::Fragment => CompileStage::Fragment,
        }
    }
}

impl fmt::Display for CompileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileStage::Vertex => f.write_str("vertex"),
            CompileStage::Fragment => f.write_str("fragment"),
            CompileStage::Link => f.write_str("link"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} stage failed: {log}")]
pub struct CompileError {
    pub stage: CompileStage,
    pub log: String,
}

impl CompileError {
    pub fn new(stage: CompileStage, log: impl Into<String>) -> Self {
        Self {
            stage,
            log: log.into(),
        }
    }
}

/// A linked program plus the location of every declared uniform.
///
/// Individual shader objects are deleted as soon as the link finishes, so the
/// program handle is the only GPU object this value owns. It must be returned
/// to the backend through [`CompiledProgram::release`].
pub struct CompiledProgram<B: GpuBackend> {
    program: B::Program,
    locations: Vec<(String, Option<B::Location>)>,
}

impl<B: GpuBackend> CompiledProgram<B> {
    pub fn handle(&self) -> &B::Program {
        &self.program
    }

    /// Location of `name`, or `None` when it is undeclared or unused.
    pub fn location(&self, name: &str) -> Option<B::Location> {
        self.locations
            .iter()
            .find(|(candidate, _)| candidate == name)
            .and_then(|(_, location)| *location)
    }

    /// Whether `name` has an entry in the location map, present or absent.
    pub fn declares(&self, name: &str) -> bool {
        self.locations.iter().any(|(candidate, _)| candidate == name)
    }

    pub fn locations(&self) -> impl Iterator<Item = (&str, Option<B::Location>)> + '_ {
        self.locations
            .iter()
            .map(|(name, location)| (name.as_str(), *location))
    }

    pub fn release(self, backend: &mut B) {
        backend.delete_program(self.program);
    }
}

/// Compiles, links, and resolves uniform locations for `source`.
///
/// Both stages are compiled before either result is inspected. On any failure
/// every handle created so far is deleted before the error is returned.
pub fn compile_program<B: GpuBackend>(
    backend: &mut B,
    source: &ShaderSource,
    uniforms: &[UniformDescriptor],
) -> Result<CompiledProgram<B>, CompileError> {
    let vertex = compile_stage(backend, ShaderStage::Vertex, &source.vertex, uniforms);
    let fragment = compile_stage(backend, ShaderStage::Fragment, &source.fragment, uniforms);

    let (vertex, fragment) = match (vertex, fragment) {
        (Ok(vertex), Ok(fragment)) => (vertex, fragment),
        (Err(err), Ok(fragment)) => {
            backend.delete_shader(fragment);
            return Err(err);
        }
        (Ok(vertex), Err(err)) => {
            backend.delete_shader(vertex);
            return Err(err);
        }
        (Err(err), Err(_)) => return Err(err),
    };

    let Some(program) = backend.create_program() else {
        backend.delete_shader(vertex);
        backend.delete_shader(fragment);
        return Err(CompileError::new(
            CompileStage::Link,
            "failed to allocate program object",
        ));
    };

    backend.attach_shader(&program, &vertex);
    backend.attach_shader(&program, &fragment);
    let linked = backend.link_program(&program);
    backend.delete_shader(vertex);
    backend.delete_shader(fragment);

    if let Err(log) = linked {
        backend.delete_program(program);
        warn!(%log, "shader program failed to link");
        return Err(CompileError::new(CompileStage::Link, log));
    }

    let locations: Vec<_> = uniforms
        .iter()
        .map(|descriptor| {
            (
                descriptor.name.clone(),
                backend.uniform_location(&program, &descriptor.name),
            )
        })
        .collect();

    let absent: Vec<&str> = locations
        .iter()
        .filter(|(_, location)| location.is_none())
        .map(|(name, _)| name.as_str())
        .collect();
    if !absent.is_empty() {
        debug!(?absent, "declared uniforms not referenced by program");
    }

    Ok(CompiledProgram { program, locations })
}

fn compile_stage<B: GpuBackend>(
    backend: &mut B,
    stage: ShaderStage,
    text: &str,
    uniforms: &[UniformDescriptor],
) -> Result<B::Shader, CompileError> {
    let shader = backend.create_shader(stage).ok_or_else(|| {
        CompileError::new(stage.into(), format!("failed to allocate {stage} shader object"))
    })?;

    match backend.compile_shader(&shader, text, uniforms) {
        Ok(()) => Ok(shader),
        Err(log) => {
            backend.delete_shader(shader);
            warn!(%stage, %log, "shader compilation failed");
            Err(CompileError::new(stage.into(), log))
        }
    }
}

/// Whether `text` mentions `name` as a whole identifier outside comments.
pub fn references_identifier(text: &str, name: &str) -> bool {
    identifiers(text).any(|ident| ident == name)
}

/// Iterates over identifier tokens, skipping `//` and `/* */` comments.
pub(crate) fn identifiers(text: &str) -> impl Iterator<Item = &str> + '_ {
    let bytes = text.as_bytes();
    let mut index = 0;
    std::iter::from_fn(move || {
        while index < bytes.len() {
            let byte = bytes[index];
            if byte == b'/' && bytes.get(index + 1) == Some(&b'/') {
                while index < bytes.len() && bytes[index] != b'\n' {
                    index += 1;
                }
            } else if byte == b'/' && bytes.get(index + 1) == Some(&b'*') {
                index += 2;
                while index < bytes.len()
                    && !(bytes[index] == b'*' && bytes.get(index + 1) == Some(&b'/'))
                {
                    index += 1;
                }
                index = (index + 2).min(bytes.len());
            } else if byte.is_ascii_alphabetic() || byte == b'_' {
                let start = index;
                while index < bytes.len()
                    && (bytes[index].is_ascii_alphanumeric() || bytes[index] == b'_')
                {
                    index += 1;
                }
                return Some(&text[start..index]);
            } else if byte.is_ascii_digit() {
                while index < bytes.len()
                    && (bytes[index].is_ascii_alphanumeric() || bytes[index] == b'.')
                {
                    index += 1;
                }
            } else {
                index += 1;
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;
    use crate::types::{default_uniforms, UniformKind};

    const VALID_FRAGMENT: &str = r"
        precision highp float;
        uniform float time;
        uniform vec2 resolution;
        void main() {
            vec2 uv = gl_FragCoord.xy / resolution;
            gl_FragColor = vec4(uv, sin(time), 1.0);
        }
    ";

    #[test]
    fn every_declared_uniform_gets_a_location_entry() {
        let mut backend = HeadlessBackend::detached();
        let mut uniforms = default_uniforms();
        uniforms.push(UniformDescriptor::value("intensity", UniformKind::Scalar));

        let program = compile_program(
            &mut backend,
            &ShaderSource::fragment_only(VALID_FRAGMENT),
            &uniforms,
        )
        .expect("valid shader compiles");

        for descriptor in &uniforms {
            assert!(program.declares(&descriptor.name), "{}", descriptor.name);
        }
        assert!(program.location("time").is_some());
        assert!(program.location("intensity").is_none());
        program.release(&mut backend);
        assert_eq!(backend.ledger().live_handles(), 0);
    }

    #[test]
    fn fragment_syntax_error_reports_stage_and_leaks_nothing() {
        let mut backend = HeadlessBackend::detached();
        let before = backend.ledger().live_handles();

        let err = compile_program(
            &mut backend,
            &ShaderSource::fragment_only("void main() { gl_FragColor = vec4(1.0); "),
            &default_uniforms(),
        )
        .err()
        .expect("unbalanced braces fail");

        assert_eq!(err.stage, CompileStage::Fragment);
        assert!(!err.log.is_empty());
        assert_eq!(backend.ledger().live_handles(), before);
    }

    #[test]
    fn vertex_failure_deletes_compiled_fragment() {
        let mut backend = HeadlessBackend::detached();
        let source = ShaderSource::new("void notmain() {}", VALID_FRAGMENT);

        let err = compile_program(&mut backend, &source, &default_uniforms())
            .err()
            .expect("vertex without main fails");

        assert_eq!(err.stage, CompileStage::Vertex);
        assert_eq!(backend.ledger().live_handles(), 0);
    }

    #[test]
    fn link_failure_deletes_program_and_shaders() {
        let mut backend = HeadlessBackend::detached();
        backend.ledger().fail_next_link("varying mismatch");

        let err = compile_program(
            &mut backend,
            &ShaderSource::fragment_only(VALID_FRAGMENT),
            &default_uniforms(),
        )
        .err()
        .expect("forced link failure");

        assert_eq!(err, CompileError::new(CompileStage::Link, "varying mismatch"));
        assert_eq!(backend.ledger().live_handles(), 0);
    }

    #[test]
    fn identifier_scan_ignores_comments_and_substrings() {
        let text = "// time\nfloat timer = 1.0; /* resolution */ vec2 r = uResolution;";
        assert!(!references_identifier(text, "time"));
        assert!(!references_identifier(text, "resolution"));
        assert!(references_identifier(text, "timer"));
        assert!(references_identifier(text, "uResolution"));
        assert!(!references_identifier("float x = 1e5;", "e5"));
    }
}
