//! Native preview host: a winit window whose redraw requests drive the
//! shader surface.
//!
//! Occlusion and minimisation map to visibility, resize and scale-factor
//! events map to `resize`, and the cursor feeds an optional pointer uniform.
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, error, info, warn};
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::backend::HostSurface;
use crate::gpu::WgpuBackend;
use crate::lifecycle::{ShaderSurface, TickOutcome};
use crate::types::{Quality, RuntimeOptions, ShaderSource, UniformDescriptor, UniformValue};

/// [`HostSurface`] backed by a winit window.
pub struct WindowHost {
    window: Arc<Window>,
    started: Instant,
    tick_requested: bool,
}

impl WindowHost {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            started: Instant::now(),
            tick_requested: false,
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Whether a tick was requested and not yet cancelled.
    pub fn tick_requested(&self) -> bool {
        self.tick_requested
    }
}

impl HostSurface for WindowHost {
    type Backend = WgpuBackend;

    fn pixel_box(&self) -> (f64, f64) {
        let size = self.window.inner_size();
        let scale = self.window.scale_factor();
        (f64::from(size.width) / scale, f64::from(size.height) / scale)
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.window.scale_factor()
    }

    fn acquire_context(&mut self) -> Result<Self::Backend, String> {
        WgpuBackend::new(Arc::clone(&self.window)).map_err(|err| format!("{err:#}"))
    }

    fn request_tick(&mut self) {
        self.tick_requested = true;
        self.window.request_redraw();
    }

    fn cancel_tick(&mut self) {
        // winit cannot withdraw a redraw request; the surface ignores the
        // resulting tick because nothing is pending.
        self.tick_requested = false;
    }

    fn now(&self) -> Duration {
        self.started.elapsed()
    }
}

/// One shader the preview can show.
#[derive(Debug, Clone)]
pub struct PreviewShader {
    pub name: String,
    pub source: ShaderSource,
    pub uniforms: Vec<UniformDescriptor>,
    /// Initial caller-supplied values.
    pub values: Vec<(String, UniformValue)>,
    /// `Vec2` uniform fed with the cursor in normalised [-1, 1] coordinates.
    pub pointer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub title: String,
    /// Logical window size.
    pub size: (u32, u32),
    pub options: RuntimeOptions,
    /// Shaders cycled with the space bar, starting with the first.
    pub shaders: Vec<PreviewShader>,
}

/// Opens the preview window and runs until it is closed.
pub fn run_preview(config: PreviewConfig) -> Result<()> {
    if config.shaders.is_empty() {
        return Err(anyhow!("no shaders to preview"));
    }

    let event_loop = EventLoopBuilder::new()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(LogicalSize::new(config.size.0, config.size.1))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let mut preview = Preview::new(window, config)?;
    let mut failure = None;
    let run_result = event_loop.run(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Wait);
        let Event::WindowEvent { window_id, event } = event else {
            return;
        };
        if window_id != preview.window.id() {
            return;
        }
        let outcome = match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                elwt.exit();
                Ok(())
            }
            WindowEvent::KeyboardInput { event, .. } => match preview.handle_key(&event) {
                KeyAction::Exit => {
                    elwt.exit();
                    Ok(())
                }
                KeyAction::Next => preview.advance(),
                KeyAction::Handled | KeyAction::Ignored => Ok(()),
            },
            WindowEvent::CursorMoved { position, .. } => {
                preview.handle_cursor(position);
                Ok(())
            }
            WindowEvent::Occluded(occluded) => {
                preview.occluded = occluded;
                preview.sync_visibility()
            }
            WindowEvent::Resized(size) => {
                preview.minimized = size.width == 0 || size.height == 0;
                preview.surface.resize();
                preview.sync_visibility()
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                preview.surface.resize();
                Ok(())
            }
            WindowEvent::RedrawRequested => preview.redraw(),
            _ => Ok(()),
        };
        if let Err(err) = outcome {
            error!("preview stopped: {err:#}");
            failure = Some(err);
            elwt.exit();
        }
    });

    if let Err(err) = run_result {
        return Err(anyhow!("window event loop error: {err}"));
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

enum KeyAction {
    Exit,
    Next,
    Handled,
    Ignored,
}

struct Preview {
    window: Arc<Window>,
    title: String,
    options: RuntimeOptions,
    shaders: Vec<PreviewShader>,
    current: usize,
    surface: ShaderSurface<WindowHost>,
    occluded: bool,
    minimized: bool,
}

impl Preview {
    fn new(window: Arc<Window>, config: PreviewConfig) -> Result<Self> {
        let PreviewConfig {
            title,
            options,
            shaders,
            ..
        } = config;
        let surface = mount(&window, &shaders[0], &options)?;
        let preview = Self {
            window,
            title,
            options,
            shaders,
            current: 0,
            surface,
            occluded: false,
            minimized: false,
        };
        preview.refresh_title();
        Ok(preview)
    }

    fn shader(&self) -> &PreviewShader {
        &self.shaders[self.current]
    }

    fn refresh_title(&self) {
        let options = self.surface.options();
        let motion = if options.reduced_motion { ", reduced motion" } else { "" };
        self.window.set_title(&format!(
            "{} | {} ({}{motion})",
            self.title,
            self.shader().name,
            options.quality
        ));
    }

    fn redraw(&mut self) -> Result<()> {
        match self.surface.tick() {
            TickOutcome::ContextLost => {
                warn!(shader = %self.shader().name, "rebuilding after context loss");
                self.surface
                    .rebuild()
                    .context("failed to rebuild the shader surface")?;
            }
            TickOutcome::Drawn | TickOutcome::Skipped | TickOutcome::Inactive => {}
        }
        Ok(())
    }

    fn sync_visibility(&mut self) -> Result<()> {
        let visible = !(self.occluded || self.minimized);
        if visible != self.surface.options().visible {
            debug!(visible, "preview visibility changed");
            self.surface.set_visible(visible)?;
        }
        Ok(())
    }

    /// Moves to the next shader. A shader with the same uniform set reuses the
    /// surface through a source swap; anything else gets a fresh surface.
    fn advance(&mut self) -> Result<()> {
        if self.shaders.len() < 2 {
            return Ok(());
        }
        self.current = (self.current + 1) % self.shaders.len();
        let next = self.shaders[self.current].clone();

        if next.uniforms.as_slice() == self.surface.values().descriptors() {
            if let Err(err) = self.surface.update_shader_source(next.source.clone()) {
                warn!(shader = %next.name, error = %err, "shader failed to compile");
            }
            apply_values(&mut self.surface, &next);
        } else {
            let mut options = self.surface.options().clone();
            options.visible = true;
            self.options = options;
            // The old surface must release its context before the new one
            // configures the same window.
            self.surface.destroy();
            self.surface = mount(&self.window, &next, &self.options)?;
            self.sync_visibility()?;
        }
        info!(shader = %next.name, "switched preview shader");
        self.refresh_title();
        Ok(())
    }

    fn handle_key(&mut self, event: &KeyEvent) -> KeyAction {
        if event.state != ElementState::Pressed || event.repeat {
            return KeyAction::Ignored;
        }
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => KeyAction::Exit,
            Key::Named(NamedKey::Space) => KeyAction::Next,
            Key::Character(value) => {
                match value.as_str() {
                    "1" => self.surface.set_quality(Quality::Low),
                    "2" => self.surface.set_quality(Quality::Medium),
                    "3" => self.surface.set_quality(Quality::High),
                    "m" | "M" => {
                        let reduced = !self.surface.options().reduced_motion;
                        self.surface.set_reduced_motion(reduced);
                    }
                    " " => return KeyAction::Next,
                    _ => return KeyAction::Ignored,
                }
                self.refresh_title();
                KeyAction::Handled
            }
            _ => KeyAction::Ignored,
        }
    }

    fn handle_cursor(&mut self, position: PhysicalPosition<f64>) {
        let Some(pointer) = self.shader().pointer.clone() else {
            return;
        };
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return;
        }
        let x = (position.x / f64::from(size.width)) * 2.0 - 1.0;
        let y = 1.0 - (position.y / f64::from(size.height)) * 2.0;
        let value = UniformValue::Vec2([x as f32, y as f32]);
        if let Err(err) = self.surface.update_uniform_values([(pointer, value)]) {
            debug!(error = %err, "pointer uniform rejected");
        }
    }
}

fn mount(
    window: &Arc<Window>,
    shader: &PreviewShader,
    options: &RuntimeOptions,
) -> Result<ShaderSurface<WindowHost>> {
    let mut surface = ShaderSurface::create(
        WindowHost::new(Arc::clone(window)),
        shader.source.clone(),
        shader.uniforms.clone(),
        options.clone(),
    )
    .with_context(|| format!("failed to start shader '{}'", shader.name))?;

    if let Some(err) = surface.last_compile_error() {
        warn!(shader = %shader.name, error = %err, "shader failed to compile; showing the clear colour");
    }
    apply_values(&mut surface, shader);

    let name = shader.name.clone();
    surface.on_ready(move || info!(shader = %name, "first frame presented"));
    Ok(surface)
}

fn apply_values(surface: &mut ShaderSurface<WindowHost>, shader: &PreviewShader) {
    let values = shader
        .values
        .iter()
        .map(|(name, value)| (name.as_str(), value.clone()));
    if let Err(err) = surface.update_uniform_values(values) {
        warn!(shader = %shader.name, error = %err, "initial uniform values rejected");
    }
}
