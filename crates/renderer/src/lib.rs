//! Shader surface runtime.
//!
//! A [`ShaderSurface`] turns a GLSL program plus a set of named uniforms into
//! a continuously animated surface. It owns the graphics context it acquires
//! and releases every GPU object it created when destroyed.
//!
//! ```text
//!   caller ── create / update_* / set_* / resize / destroy
//!     │
//!     ▼
//!   ShaderSurface ──▶ FrameDriver (Idle │ Running │ Suspended │ Lost │ Destroyed)
//!     │                    │ request_tick / cancel_tick
//!     │                    ▼
//!     │               HostSurface (window, headless harness)
//!     │
//!     ├─▶ compile_program ─▶ GpuBackend (wgpu, headless ledger)
//!     └─▶ uniforms::bind ──▶ GpuBackend::set_uniform
//! ```
//!
//! The two seams are traits so the same lifecycle runs against a native wgpu
//! window ([`WindowHost`]) and the in-memory [`HeadlessHost`] the tests use.

mod backend;
mod compile;
mod driver;
pub mod gpu;
mod headless;
mod lifecycle;
mod sizer;
mod types;
mod uniforms;
mod window;

pub use backend::{DrawError, GpuBackend, HostSurface, ShaderStage};
pub use compile::{
    compile_program, references_identifier, CompileError, CompileStage, CompiledProgram,
    DEFAULT_VERTEX_SHADER,
};
pub use driver::{ClockState, DriverState, FrameDriver, LoopConditions};
pub use gpu::{check_program, WgpuBackend};
pub use headless::{
    HeadlessBackend, HeadlessBuffer, HeadlessHost, HeadlessLocation, HeadlessProgram,
    HeadlessShader, Ledger, ManualClock,
};
pub use lifecycle::{RuntimeError, ShaderSurface, TickOutcome};
pub use sizer::{compute_size, SurfaceSize};
pub use types::{
    default_uniforms, Quality, RuntimeOptions, ShaderSource, UniformData, UniformDescriptor,
    UniformKind, UniformRole, UniformValue,
};
pub use uniforms::{bind, validate_descriptors, FrameInputs, UniformError, UniformValues};
pub use window::{run_preview, PreviewConfig, PreviewShader, WindowHost};
