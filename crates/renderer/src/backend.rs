//! Seams between the runtime and the outside world.
//!
//! Types:
//!
//! - `GpuBackend` is the GL-shaped command surface every runtime stage is
//!   written against. Handles are opaque associated types so a backend can use
//!   real GPU objects (`gpu::WgpuBackend`) or plain counters
//!   (`headless::HeadlessBackend`).
//! - `HostSurface` is whatever owns the pixels: it reports its box and pixel
//!   ratio, yields a backend, schedules ticks, and supplies the clock.
//! - `DrawError` separates fatal context loss from a merely dropped frame.
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::sizer::SurfaceSize;
use crate::types::{UniformData, UniformDescriptor};

/// Programmable pipeline stage of a shader object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrawError {
    /// Every handle created through the backend is now invalid.
    #[error("GPU context lost: {0}")]
    ContextLost(String),
    /// The frame was dropped; the context is still usable.
    #[error("frame skipped: {0}")]
    Skipped(String),
}

pub trait GpuBackend {
    type Shader;
    type Program;
    type Buffer;
    type Location: Copy + fmt::Debug;

    /// Returns `None` when the context cannot allocate (typically after loss).
    fn create_shader(&mut self, stage: ShaderStage) -> Option<Self::Shader>;

    /// Compiles `text` into `shader`, returning the engine log on failure.
    ///
    /// `uniforms` is the instance's declared set; backends that synthesize
    /// uniform blocks need it, GL-style backends may ignore it.
    fn compile_shader(
        &mut self,
        shader: &Self::Shader,
        text: &str,
        uniforms: &[UniformDescriptor],
    ) -> Result<(), String>;

    fn delete_shader(&mut self, shader: Self::Shader);

    fn create_program(&mut self) -> Option<Self::Program>;

    fn attach_shader(&mut self, program: &Self::Program, shader: &Self::Shader);

    fn link_program(&mut self, program: &Self::Program) -> Result<(), String>;

    fn delete_program(&mut self, program: Self::Program);

    /// `None` means the linked program does not use `name`.
    fn uniform_location(&self, program: &Self::Program, name: &str) -> Option<Self::Location>;

    fn set_uniform(
        &mut self,
        program: &Self::Program,
        location: Self::Location,
        value: UniformData<'_>,
    );

    /// Allocates the four-vertex unit quad `(-1,-1) (1,-1) (-1,1) (1,1)`.
    fn create_quad_buffer(&mut self) -> Option<Self::Buffer>;

    fn delete_buffer(&mut self, buffer: Self::Buffer);

    /// Resizes the drawing buffer and updates the viewport to match.
    fn resize_surface(&mut self, size: SurfaceSize);

    /// Clears to `clear`, then draws `quad` as a triangle strip with `program`.
    fn draw(
        &mut self,
        program: &Self::Program,
        quad: &Self::Buffer,
        clear: [f32; 4],
    ) -> Result<(), DrawError>;
}

pub trait HostSurface {
    type Backend: GpuBackend;

    /// Host box in logical pixels.
    fn pixel_box(&self) -> (f64, f64);

    fn device_pixel_ratio(&self) -> f64;

    /// Produces a fresh drawing context. The error string explains why the
    /// host cannot render at all.
    fn acquire_context(&mut self) -> Result<Self::Backend, String>;

    /// Asks the host to call [`ShaderSurface::tick`](crate::ShaderSurface::tick)
    /// once on its next frame.
    fn request_tick(&mut self);

    /// Withdraws a pending tick request.
    fn cancel_tick(&mut self);

    /// Monotonic host clock.
    fn now(&self) -> Duration;
}
