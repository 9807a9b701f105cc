//! The shader surface: one host, one drawing context, at most one program.
//!
//! Creation runs context → size → quad → compile → bind → driver. Teardown
//! always cancels the pending tick before any GPU handle is deleted, and is
//! safe to repeat. A lost context drops every handle without deleting it, since
//! the backend has already invalidated them; `rebuild` starts over from a fresh
//! context while keeping the source, the uniform values, and the clock.
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{DrawError, GpuBackend, HostSurface};
use crate::compile::{compile_program, CompileError, CompiledProgram};
use crate::driver::{DriverState, FrameDriver, LoopConditions};
use crate::sizer::{compute_size, SurfaceSize};
use crate::types::{Quality, RuntimeOptions, ShaderSource, UniformDescriptor, UniformValue};
use crate::uniforms::{bind, validate_descriptors, FrameInputs, UniformError, UniformValues};

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The host could not produce a drawing context. Callers are expected to
    /// show a static fallback instead.
    #[error("no GPU support: {0}")]
    NoGpuSupport(String),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Uniform(#[from] UniformError),
    #[error("shader surface has been destroyed")]
    Destroyed,
}

/// What a call to [`ShaderSurface::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No tick was pending or the loop is not running.
    Inactive,
    Drawn,
    /// The backend dropped the frame; the next tick is already requested.
    Skipped,
    /// The context is gone. Nothing is scheduled until [`ShaderSurface::rebuild`].
    ContextLost,
}

struct GpuResources<B: GpuBackend> {
    backend: B,
    quad: B::Buffer,
    program: Option<CompiledProgram<B>>,
}

impl<B: GpuBackend> GpuResources<B> {
    /// Deletes every handle, then drops the context.
    fn release(mut self) {
        if let Some(program) = self.program.take() {
            program.release(&mut self.backend);
        }
        self.backend.delete_buffer(self.quad);
    }
}

pub struct ShaderSurface<H: HostSurface> {
    host: H,
    gpu: Option<GpuResources<H::Backend>>,
    source: ShaderSource,
    values: UniformValues,
    options: RuntimeOptions,
    size: SurfaceSize,
    driver: FrameDriver,
    last_error: Option<CompileError>,
    ready_hook: Option<Box<dyn FnOnce()>>,
    ready: bool,
}

impl<H: HostSurface> ShaderSurface<H> {
    /// Builds a running surface on `host`.
    ///
    /// A compile failure does not fail creation: the surface comes up `Idle`
    /// with the error available from [`last_compile_error`](Self::last_compile_error).
    pub fn create(
        host: H,
        source: ShaderSource,
        descriptors: Vec<UniformDescriptor>,
        options: RuntimeOptions,
    ) -> Result<Self, RuntimeError> {
        validate_descriptors(&descriptors)?;

        let now = host.now();
        let (width, height) = host.pixel_box();
        let size = compute_size(
            width,
            height,
            host.device_pixel_ratio(),
            options.quality.pixel_ratio_cap(),
        );
        let mut surface = Self {
            host,
            gpu: None,
            source,
            values: UniformValues::new(descriptors),
            options,
            size,
            driver: FrameDriver::new(now),
            last_error: None,
            ready_hook: None,
            ready: false,
        };

        surface.install()?;
        surface.sync();
        info!(
            width = surface.size.width,
            height = surface.size.height,
            state = ?surface.driver.state(),
            "shader surface created"
        );
        Ok(surface)
    }

    /// Cancels the pending tick, deletes every GPU handle, and releases the
    /// context. Calling it again does nothing.
    pub fn destroy(&mut self) {
        if self.driver.state() == DriverState::Destroyed {
            return;
        }
        self.driver.cancel(&mut self.host);
        if let Some(gpu) = self.gpu.take() {
            gpu.release();
        }
        self.driver.mark_destroyed(self.host.now());
        self.ready_hook = None;
        debug!("shader surface destroyed");
    }

    /// Replaces the shader source, deleting the old program before compiling
    /// the new one.
    ///
    /// On failure the surface drops to `Idle` and the error is returned as well
    /// as kept for [`last_compile_error`](Self::last_compile_error). When no
    /// context is resident the source is stored and compiled on the next
    /// rebuild.
    pub fn update_shader_source(&mut self, source: ShaderSource) -> Result<(), RuntimeError> {
        self.ensure_alive()?;
        self.source = source;

        let result = match self.gpu.as_mut() {
            Some(gpu) => {
                if let Some(old) = gpu.program.take() {
                    old.release(&mut gpu.backend);
                }
                match compile_program(&mut gpu.backend, &self.source, self.values.descriptors()) {
                    Ok(program) => {
                        gpu.program = Some(program);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            None => Ok(()),
        };

        self.last_error = result.as_ref().err().cloned();
        self.sync();
        result.map_err(RuntimeError::from)
    }

    /// Merges `partial` into the current values. Returns how many changed.
    ///
    /// Never recompiles or reallocates; the next tick binds the new values.
    pub fn update_uniform_values<I, K>(&mut self, partial: I) -> Result<usize, RuntimeError>
    where
        I: IntoIterator<Item = (K, UniformValue)>,
        K: AsRef<str>,
    {
        self.ensure_alive()?;
        Ok(self.values.apply(partial)?)
    }

    /// Re-reads the host box and pixel ratio and applies the new size before
    /// the next draw.
    pub fn resize(&mut self) -> SurfaceSize {
        let size = self.measure();
        if size != self.size {
            debug!(width = size.width, height = size.height, "surface resized");
            self.size = size;
            if let Some(gpu) = self.gpu.as_mut() {
                gpu.backend.resize_surface(size);
            }
        }
        self.size
    }

    /// Suspends or resumes the loop. With `release_when_hidden`, hiding also
    /// releases every GPU handle and showing again rebuilds them.
    pub fn set_visible(&mut self, visible: bool) -> Result<(), RuntimeError> {
        self.ensure_alive()?;
        if self.options.visible == visible {
            return Ok(());
        }
        let releases = self.options.release_when_hidden && self.driver.state() != DriverState::Lost;

        if visible {
            // Stay hidden when the context cannot be reacquired, so a later
            // call retries.
            if releases && self.gpu.is_none() {
                self.install()?;
            }
            self.options.visible = true;
        } else {
            self.options.visible = false;
            if releases {
                // Freeze the clock while the program is still attached.
                self.sync();
                if let Some(gpu) = self.gpu.take() {
                    debug!("releasing GPU resources while hidden");
                    gpu.release();
                }
            }
        }
        self.sync();
        Ok(())
    }

    /// Starts or pauses the clock. A paused clock suspends the loop.
    pub fn set_playing(&mut self, playing: bool) {
        self.driver.set_running(playing);
        self.sync();
    }

    pub fn set_quality(&mut self, quality: Quality) {
        self.options.quality = quality;
        self.resize();
    }

    pub fn set_reduced_motion(&mut self, reduced_motion: bool) {
        self.options.reduced_motion = reduced_motion;
    }

    /// Runs one frame if a tick is pending: bind, clear, draw, reschedule.
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.host.now();
        let Some(elapsed) = self.driver.begin_tick(now) else {
            return TickOutcome::Inactive;
        };
        let frame = self.frame_inputs(elapsed);

        let drawn = match self.gpu.as_mut() {
            Some(GpuResources {
                backend,
                quad,
                program: Some(program),
            }) => {
                bind(backend, program, &self.values, &frame);
                backend.draw(program.handle(), quad, self.options.clear_color)
            }
            _ => {
                // Running requires a resident program; resync rather than
                // leave the loop parked on a tick that never draws.
                warn!(state = ?self.driver.state(), "tick reached a surface without a program");
                self.sync();
                return TickOutcome::Inactive;
            }
        };

        match drawn {
            Ok(()) => {
                self.driver.record_frame();
                self.driver.schedule(&mut self.host);
                if !self.ready {
                    self.ready = true;
                    if let Some(hook) = self.ready_hook.take() {
                        hook();
                    }
                }
                TickOutcome::Drawn
            }
            Err(DrawError::Skipped(reason)) => {
                debug!(%reason, "frame skipped");
                self.driver.schedule(&mut self.host);
                TickOutcome::Skipped
            }
            Err(DrawError::ContextLost(reason)) => {
                warn!(%reason, "GPU context lost; surface needs a rebuild");
                // Handles are already invalid; dropping them must not issue deletes.
                self.gpu = None;
                self.driver.mark_lost(now, &mut self.host);
                TickOutcome::ContextLost
            }
        }
    }

    /// Replaces every GPU resource with fresh ones from a new context.
    ///
    /// Source, uniform values, and the clock reading survive.
    pub fn rebuild(&mut self) -> Result<(), RuntimeError> {
        self.ensure_alive()?;
        self.driver.cancel(&mut self.host);
        if let Some(gpu) = self.gpu.take() {
            gpu.release();
        }
        if let Err(err) = self.install() {
            // Nothing is resident; park in Lost until the next rebuild.
            let now = self.host.now();
            self.driver.mark_lost(now, &mut self.host);
            return Err(err);
        }
        self.driver.revive();
        self.sync();
        info!(state = ?self.driver.state(), "shader surface rebuilt");
        Ok(())
    }

    /// Registers a hook fired once after the first successful draw. If that
    /// draw already happened the hook runs immediately.
    pub fn on_ready(&mut self, hook: impl FnOnce() + 'static) {
        if self.ready {
            hook();
        } else {
            self.ready_hook = Some(Box::new(hook));
        }
    }

    pub fn state(&self) -> DriverState {
        self.driver.state()
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    /// Clock reading at the last tick or pause.
    pub fn elapsed(&self) -> Duration {
        self.driver.clock().elapsed
    }

    pub fn frames(&self) -> u64 {
        self.driver.frames()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn has_program(&self) -> bool {
        self.gpu.as_ref().is_some_and(|gpu| gpu.program.is_some())
    }

    pub fn last_compile_error(&self) -> Option<&CompileError> {
        self.last_error.as_ref()
    }

    pub fn source(&self) -> &ShaderSource {
        &self.source
    }

    pub fn values(&self) -> &UniformValues {
        &self.values
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    fn ensure_alive(&self) -> Result<(), RuntimeError> {
        if self.driver.state() == DriverState::Destroyed {
            Err(RuntimeError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn measure(&self) -> SurfaceSize {
        let (width, height) = self.host.pixel_box();
        compute_size(
            width,
            height,
            self.host.device_pixel_ratio(),
            self.options.quality.pixel_ratio_cap(),
        )
    }

    fn frame_inputs(&self, elapsed: Duration) -> FrameInputs {
        FrameInputs {
            elapsed: elapsed.as_secs_f32(),
            resolution: self.size.as_vec2(),
            quality: self.options.quality,
            reduced_motion: self.options.reduced_motion,
        }
    }

    /// Acquires a context and builds the quad and program on it.
    fn install(&mut self) -> Result<(), RuntimeError> {
        let mut backend = self.host.acquire_context().map_err(|reason| {
            warn!(%reason, "host could not provide a drawing context");
            RuntimeError::NoGpuSupport(reason)
        })?;

        self.size = self.measure();
        backend.resize_surface(self.size);

        let Some(quad) = backend.create_quad_buffer() else {
            return Err(RuntimeError::NoGpuSupport(
                "failed to allocate the quad vertex buffer".to_string(),
            ));
        };

        let mut gpu = GpuResources {
            backend,
            quad,
            program: None,
        };
        match compile_program(&mut gpu.backend, &self.source, self.values.descriptors()) {
            Ok(program) => {
                let frame = self.frame_inputs(self.driver.clock().elapsed);
                bind(&mut gpu.backend, &program, &self.values, &frame);
                gpu.program = Some(program);
                self.last_error = None;
            }
            Err(err) => {
                self.last_error = Some(err);
            }
        }
        self.gpu = Some(gpu);
        Ok(())
    }

    fn sync(&mut self) {
        let conditions = LoopConditions {
            visible: self.options.visible,
            has_program: self.has_program(),
            resident: self.gpu.is_some(),
        };
        let now = self.host.now();
        self.driver.sync(conditions, now, &mut self.host);
    }
}

impl<H: HostSurface> Drop for ShaderSurface<H> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::compile::CompileStage;
    use crate::headless::HeadlessHost;
    use crate::types::default_uniforms;

    const FRAGMENT: &str = r"
        precision mediump float;
        uniform float time;
        uniform vec2 resolution;
        void main() {
            gl_FragColor = vec4(gl_FragCoord.xy / resolution, fract(time), 1.0);
        }
    ";

    fn surface(host: HeadlessHost) -> ShaderSurface<HeadlessHost> {
        ShaderSurface::create(
            host,
            ShaderSource::fragment_only(FRAGMENT),
            default_uniforms(),
            RuntimeOptions::default(),
        )
        .expect("headless surface")
    }

    #[test]
    fn create_reaches_running_and_schedules_one_tick() {
        let host = HeadlessHost::new(320.0, 200.0, 1.0);
        let ledger = host.ledger();
        let surface = surface(host);

        assert_eq!(surface.state(), DriverState::Running);
        assert_eq!(ledger.tick_requests(), 1);
        assert_eq!(ledger.surface_size(), Some((320, 200)));
        assert!(surface.has_program());
    }

    #[test]
    fn no_gpu_is_reported_at_creation() {
        let host = HeadlessHost::new(320.0, 200.0, 1.0).without_gpu();
        let result = ShaderSurface::create(
            host,
            ShaderSource::fragment_only(FRAGMENT),
            default_uniforms(),
            RuntimeOptions::default(),
        );
        assert!(matches!(result, Err(RuntimeError::NoGpuSupport(_))));
    }

    #[test]
    fn replacing_source_keeps_one_live_program() {
        let host = HeadlessHost::new(64.0, 64.0, 1.0);
        let ledger = host.ledger();
        let mut surface = surface(host);

        let other = FRAGMENT.replace("fract(time)", "0.5");
        surface
            .update_shader_source(ShaderSource::fragment_only(other))
            .expect("recompiles");
        assert_eq!(ledger.live_programs(), 1);

        let err = surface
            .update_shader_source(ShaderSource::fragment_only("void main() {"))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Compile(ref e) if e.stage == CompileStage::Fragment));
        assert_eq!(ledger.live_programs(), 0);
        assert_eq!(surface.state(), DriverState::Idle);
        assert!(!ledger.tick_pending());
    }

    #[test]
    fn hidden_surface_does_not_draw() {
        let host = HeadlessHost::new(64.0, 64.0, 1.0);
        let ledger = host.ledger();
        let mut surface = surface(host);

        surface.set_visible(false).expect("alive");
        assert_eq!(surface.state(), DriverState::Suspended);
        assert_eq!(surface.tick(), TickOutcome::Inactive);
        assert_eq!(ledger.draws(), 0);

        surface.set_visible(true).expect("alive");
        assert_eq!(surface.tick(), TickOutcome::Drawn);
    }

    #[test]
    fn release_when_hidden_frees_and_restores_handles() {
        let host = HeadlessHost::new(64.0, 64.0, 1.0);
        let ledger = host.ledger();
        let mut surface = ShaderSurface::create(
            host,
            ShaderSource::fragment_only(FRAGMENT),
            default_uniforms(),
            RuntimeOptions {
                release_when_hidden: true,
                ..RuntimeOptions::default()
            },
        )
        .expect("headless surface");
        let live = ledger.live_handles();

        surface.set_visible(false).expect("alive");
        assert_eq!(ledger.live_handles(), 0);
        assert_eq!(ledger.contexts_released(), 1);
        assert_eq!(surface.state(), DriverState::Suspended);

        surface.set_visible(true).expect("alive");
        assert_eq!(ledger.live_handles(), live);
        assert_eq!(ledger.contexts_acquired(), 2);
        assert_eq!(surface.state(), DriverState::Running);
    }

    #[test]
    fn failed_reshow_stays_hidden_and_can_retry() {
        let host = HeadlessHost::new(64.0, 64.0, 1.0);
        let ledger = host.ledger();
        let mut surface = ShaderSurface::create(
            host,
            ShaderSource::fragment_only(FRAGMENT),
            default_uniforms(),
            RuntimeOptions {
                release_when_hidden: true,
                ..RuntimeOptions::default()
            },
        )
        .expect("headless surface");

        surface.set_visible(false).expect("alive");
        surface.host_mut().set_gpu_available(false);
        let err = surface.set_visible(true).unwrap_err();
        assert!(matches!(err, RuntimeError::NoGpuSupport(_)));
        assert!(!surface.options().visible);
        assert_eq!(surface.state(), DriverState::Suspended);
        assert!(!ledger.tick_pending());

        surface.host_mut().set_gpu_available(true);
        surface.set_visible(true).expect("context is back");
        assert!(surface.options().visible);
        assert_eq!(ledger.contexts_acquired(), 2);
        assert_eq!(surface.state(), DriverState::Running);
        assert_eq!(surface.tick(), TickOutcome::Drawn);
    }

    #[test]
    fn failed_rebuild_parks_the_loop_until_the_next_one() {
        let host = HeadlessHost::new(64.0, 64.0, 1.0);
        let ledger = host.ledger();
        let mut surface = surface(host);
        assert_eq!(surface.tick(), TickOutcome::Drawn);

        surface.host_mut().set_gpu_available(false);
        let err = surface.rebuild().unwrap_err();
        assert!(matches!(err, RuntimeError::NoGpuSupport(_)));
        assert_eq!(surface.state(), DriverState::Lost);
        assert!(!surface.has_program());
        assert!(!ledger.tick_pending());
        assert_eq!(ledger.live_handles(), 0);
        assert_eq!(surface.tick(), TickOutcome::Inactive);

        surface.host_mut().set_gpu_available(true);
        surface.rebuild().expect("context is back");
        assert_eq!(surface.state(), DriverState::Running);
        assert!(ledger.tick_pending());
        assert_eq!(surface.tick(), TickOutcome::Drawn);
    }

    #[test]
    fn tick_without_resident_program_stops_the_loop() {
        let host = HeadlessHost::new(64.0, 64.0, 1.0);
        let ledger = host.ledger();
        let mut surface = surface(host);
        assert_eq!(surface.state(), DriverState::Running);

        surface.gpu = None;
        assert_eq!(surface.tick(), TickOutcome::Inactive);
        assert_eq!(surface.state(), DriverState::Suspended);
        assert!(!ledger.tick_pending());
        assert_eq!(ledger.draws(), 0);
    }

    #[test]
    fn ready_hook_fires_once_after_first_draw() {
        let host = HeadlessHost::new(64.0, 64.0, 1.0);
        let mut surface = surface(host);
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        surface.on_ready(move || counter.set(counter.get() + 1));

        assert_eq!(fired.get(), 0);
        surface.tick();
        surface.tick();
        assert_eq!(fired.get(), 1);
        assert!(surface.is_ready());
    }

    #[test]
    fn quality_change_resizes_without_recompiling() {
        let host = HeadlessHost::new(100.0, 50.0, 3.0);
        let ledger = host.ledger();
        let mut surface = surface(host);
        assert_eq!(surface.size().dimensions(), (200, 100));

        let calls = ledger.live_programs();
        surface.set_quality(Quality::Low);
        assert_eq!(ledger.surface_size(), Some((100, 50)));
        assert_eq!(ledger.live_programs(), calls);
    }

    #[test]
    fn destroyed_surface_rejects_updates() {
        let mut surface = surface(HeadlessHost::new(8.0, 8.0, 1.0));
        surface.destroy();
        assert!(matches!(
            surface.update_uniform_values([("time", UniformValue::Scalar(1.0))]),
            Err(RuntimeError::Destroyed)
        ));
        assert!(matches!(surface.rebuild(), Err(RuntimeError::Destroyed)));
    }
}
