//! wgpu implementation of the backend seam.
//!
//! - `context` owns the wgpu instance, device, and swapchain for a window and
//!   watches for device loss.
//! - `glsl` rewrites WebGL-dialect sources into GLSL 450 with one std140
//!   uniform block, and validates them through naga.
//! - `present` keeps the offscreen drawing buffer sized to `SurfaceSize` and
//!   scales it onto the swapchain.
//! - `backend` maps the GL-style object model onto pipelines and buffers.

mod backend;
mod context;
mod glsl;
mod present;

pub use backend::{WgpuBackend, WgpuBuffer, WgpuLocation, WgpuProgram, WgpuShader};

use crate::backend::ShaderStage;
use crate::compile::{CompileError, CompileStage};
use crate::types::{ShaderSource, UniformDescriptor};

/// Runs every stage of program creation that does not need a device: both
/// stages are translated and validated, then linked against each other.
///
/// Errors carry the same stage and log a [`WgpuBackend`] would report.
pub fn check_program(
    source: &ShaderSource,
    uniforms: &[UniformDescriptor],
) -> Result<(), CompileError> {
    let layout = glsl::BlockLayout::new(uniforms);

    let vertex = glsl::translate(ShaderStage::Vertex, &source.vertex, &layout, None)
        .and_then(|translation| {
            glsl::validate(ShaderStage::Vertex, &translation.text)?;
            Ok(translation)
        })
        .map_err(|log| CompileError::new(CompileStage::Vertex, log))?;

    glsl::translate(ShaderStage::Fragment, &source.fragment, &layout, None)
        .and_then(|translation| glsl::validate(ShaderStage::Fragment, &translation.text))
        .map_err(|log| CompileError::new(CompileStage::Fragment, log))?;

    glsl::translate(
        ShaderStage::Fragment,
        &source.fragment,
        &layout,
        Some(vertex.varyings.as_slice()),
    )
    .map_err(|log| CompileError::new(CompileStage::Link, log))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::default_uniforms;

    const FRAGMENT: &str = r"precision mediump float;
uniform float time;
uniform vec2 resolution;
varying vec2 vUv;
void main() {
    gl_FragColor = vec4(vUv, 0.5 + 0.5 * sin(time), 1.0);
}
";

    #[test]
    fn valid_program_passes_offline_checks() {
        check_program(&ShaderSource::fragment_only(FRAGMENT), &default_uniforms())
            .expect("program checks out");
    }

    #[test]
    fn unwritten_varying_fails_at_link() {
        let fragment = FRAGMENT.replace("vUv", "vPosition");
        let err = check_program(&ShaderSource::fragment_only(fragment), &default_uniforms())
            .unwrap_err();
        assert_eq!(err.stage, CompileStage::Link);
        assert!(err.log.contains("vPosition"));
    }

    #[test]
    fn broken_fragment_fails_in_fragment_stage() {
        let fragment = FRAGMENT.replace("sin(time)", "sin(time");
        let err = check_program(&ShaderSource::fragment_only(fragment), &default_uniforms())
            .unwrap_err();
        assert_eq!(err.stage, CompileStage::Fragment);
    }
}
