//! CPU-only backend and host used to exercise the runtime without a GPU.
//!
//! `HeadlessBackend` follows GL object semantics closely enough for the
//! lifecycle to be observable: handles are counted, uniform writes are recorded
//! per name, and context loss can be injected. A shader "compiles" when its
//! delimiters balance and it defines `main`; a uniform is "active" when the
//! program text references it outside its own declaration.
//!
//! Every backend and host created from the same [`Ledger`] report into it, so a
//! test can keep a ledger handle after the surface takes ownership of the host.
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use crate::backend::{DrawError, GpuBackend, HostSurface, ShaderStage};
use crate::compile::references_identifier;
use crate::sizer::SurfaceSize;
use crate::types::{UniformData, UniformDescriptor, UniformKind, UniformValue};

#[derive(Debug, Default)]
struct LedgerState {
    live_shaders: usize,
    live_programs: usize,
    live_buffers: usize,
    calls: usize,
    draws: usize,
    last_clear: Option<[f32; 4]>,
    surface: Option<SurfaceSize>,
    uniforms: HashMap<String, UniformValue>,
    uniform_writes: usize,
    stale_writes: usize,
    oversized_array_writes: usize,
    lost: bool,
    fail_next_link: Option<String>,
    contexts_acquired: usize,
    contexts_released: usize,
    tick_pending: bool,
    tick_requests: usize,
    tick_cancels: usize,
}

/// Shared record of everything headless backends and hosts did.
#[derive(Debug, Clone, Default)]
pub struct Ledger(Rc<RefCell<LedgerState>>);

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shader, program, and buffer handles currently alive.
    pub fn live_handles(&self) -> usize {
        let state = self.0.borrow();
        state.live_shaders + state.live_programs + state.live_buffers
    }

    pub fn live_programs(&self) -> usize {
        self.0.borrow().live_programs
    }

    /// Number of backend calls issued so far.
    pub fn calls(&self) -> usize {
        self.0.borrow().calls
    }

    pub fn draws(&self) -> usize {
        self.0.borrow().draws
    }

    pub fn last_clear(&self) -> Option<[f32; 4]> {
        self.0.borrow().last_clear
    }

    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.0.borrow().surface.map(|size| size.dimensions())
    }

    /// Last value written to `name` by the current program. Arrays are
    /// reported at full capacity, unwritten slots reading as zero.
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.0.borrow().uniforms.get(name).cloned()
    }

    pub fn uniform_writes(&self) -> usize {
        self.0.borrow().uniform_writes
    }

    /// Writes made with a location from a program other than the one bound.
    pub fn stale_writes(&self) -> usize {
        self.0.borrow().stale_writes
    }

    /// Array writes longer than the declared capacity.
    pub fn oversized_array_writes(&self) -> usize {
        self.0.borrow().oversized_array_writes
    }

    pub fn contexts_acquired(&self) -> usize {
        self.0.borrow().contexts_acquired
    }

    pub fn contexts_released(&self) -> usize {
        self.0.borrow().contexts_released
    }

    pub fn tick_pending(&self) -> bool {
        self.0.borrow().tick_pending
    }

    pub fn tick_requests(&self) -> usize {
        self.0.borrow().tick_requests
    }

    pub fn tick_cancels(&self) -> usize {
        self.0.borrow().tick_cancels
    }

    /// Invalidates every handle of the current context. The next draw, and
    /// every allocation until a new context is acquired, fails.
    pub fn lose_context(&self) {
        let mut state = self.0.borrow_mut();
        state.lost = true;
        state.live_shaders = 0;
        state.live_programs = 0;
        state.live_buffers = 0;
    }

    /// Makes the next `link_program` call fail with `log`.
    pub fn fail_next_link(&self, log: impl Into<String>) {
        self.0.borrow_mut().fail_next_link = Some(log.into());
    }

    fn is_lost(&self) -> bool {
        self.0.borrow().lost
    }

    fn record_call(&self) {
        self.0.borrow_mut().calls += 1;
    }
}

/// Monotonic clock advanced by hand.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<Duration>>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.0.get()
    }

    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessShader(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessProgram(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessBuffer(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessLocation {
    program: u32,
    slot: usize,
}

#[derive(Debug)]
struct ShaderRecord {
    stage: ShaderStage,
    compiled: Option<(String, Vec<UniformDescriptor>)>,
}

#[derive(Debug, Default)]
struct ProgramRecord {
    attached: Vec<u32>,
    text: String,
    uniforms: Vec<UniformDescriptor>,
    linked: bool,
}

#[derive(Debug)]
pub struct HeadlessBackend {
    ledger: Ledger,
    next_id: u32,
    shaders: HashMap<u32, ShaderRecord>,
    programs: HashMap<u32, ProgramRecord>,
    buffers: HashSet<u32>,
}

impl HeadlessBackend {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            next_id: 1,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashSet::new(),
        }
    }

    /// Backend with a private ledger, for tests that drive it directly.
    pub fn detached() -> Self {
        Self::new(Ledger::new())
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn allocate(&mut self) -> Option<u32> {
        self.ledger.record_call();
        if self.ledger.is_lost() {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        Some(id)
    }
}

impl Drop for HeadlessBackend {
    fn drop(&mut self) {
        self.ledger.0.borrow_mut().contexts_released += 1;
    }
}

impl GpuBackend for HeadlessBackend {
    type Shader = HeadlessShader;
    type Program = HeadlessProgram;
    type Buffer = HeadlessBuffer;
    type Location = HeadlessLocation;

    fn create_shader(&mut self, stage: ShaderStage) -> Option<Self::Shader> {
        let id = self.allocate()?;
        self.shaders.insert(
            id,
            ShaderRecord {
                stage,
                compiled: None,
            },
        );
        self.ledger.0.borrow_mut().live_shaders += 1;
        Some(HeadlessShader(id))
    }

    fn compile_shader(
        &mut self,
        shader: &Self::Shader,
        text: &str,
        uniforms: &[UniformDescriptor],
    ) -> Result<(), String> {
        self.ledger.record_call();
        if self.ledger.is_lost() {
            return Err("context lost".to_string());
        }
        let record = self
            .shaders
            .get_mut(&shader.0)
            .ok_or_else(|| format!("unknown shader object {}", shader.0))?;
        check_syntax(text)?;
        record.compiled = Some((text.to_string(), uniforms.to_vec()));
        Ok(())
    }

    fn delete_shader(&mut self, shader: Self::Shader) {
        self.ledger.record_call();
        if self.shaders.remove(&shader.0).is_some() && !self.ledger.is_lost() {
            self.ledger.0.borrow_mut().live_shaders -= 1;
        }
    }

    fn create_program(&mut self) -> Option<Self::Program> {
        let id = self.allocate()?;
        self.programs.insert(id, ProgramRecord::default());
        self.ledger.0.borrow_mut().live_programs += 1;
        Some(HeadlessProgram(id))
    }

    fn attach_shader(&mut self, program: &Self::Program, shader: &Self::Shader) {
        self.ledger.record_call();
        if let Some(record) = self.programs.get_mut(&program.0) {
            record.attached.push(shader.0);
        }
    }

    fn link_program(&mut self, program: &Self::Program) -> Result<(), String> {
        self.ledger.record_call();
        if self.ledger.is_lost() {
            return Err("context lost".to_string());
        }
        if let Some(log) = self.ledger.0.borrow_mut().fail_next_link.take() {
            return Err(log);
        }

        let record = self
            .programs
            .get(&program.0)
            .ok_or_else(|| format!("unknown program object {}", program.0))?;
        let mut stages = Vec::new();
        let mut text = String::new();
        let mut uniforms = Vec::new();
        for id in &record.attached {
            let shader = self
                .shaders
                .get(id)
                .ok_or_else(|| format!("attached shader {id} was deleted"))?;
            let (source, declared) = shader
                .compiled
                .as_ref()
                .ok_or_else(|| format!("attached {} shader is not compiled", shader.stage))?;
            stages.push(shader.stage);
            text.push_str(source);
            text.push('\n');
            uniforms = declared.clone();
        }
        if !(stages.contains(&ShaderStage::Vertex) && stages.contains(&ShaderStage::Fragment)) {
            return Err("program needs one vertex and one fragment shader".to_string());
        }

        if let Some(record) = self.programs.get_mut(&program.0) {
            record.text = text;
            record.uniforms = uniforms;
            record.linked = true;
        }
        self.ledger.0.borrow_mut().uniforms.clear();
        Ok(())
    }

    fn delete_program(&mut self, program: Self::Program) {
        self.ledger.record_call();
        if self.programs.remove(&program.0).is_some() && !self.ledger.is_lost() {
            self.ledger.0.borrow_mut().live_programs -= 1;
        }
    }

    fn uniform_location(&self, program: &Self::Program, name: &str) -> Option<Self::Location> {
        self.ledger.record_call();
        let record = self.programs.get(&program.0).filter(|record| record.linked)?;
        let slot = record
            .uniforms
            .iter()
            .position(|descriptor| descriptor.name == name)?;
        let body = strip_uniform_declarations(&record.text);
        references_identifier(&body, name).then_some(HeadlessLocation {
            program: program.0,
            slot,
        })
    }

    fn set_uniform(
        &mut self,
        program: &Self::Program,
        location: Self::Location,
        value: UniformData<'_>,
    ) {
        self.ledger.record_call();
        let mut state = self.ledger.0.borrow_mut();
        let Some(descriptor) = self
            .programs
            .get(&program.0)
            .filter(|_| location.program == program.0)
            .and_then(|record| record.uniforms.get(location.slot))
        else {
            state.stale_writes += 1;
            return;
        };

        state.uniform_writes += 1;
        let stored = match (value, descriptor.kind) {
            (UniformData::Vec3Array(items), UniformKind::Vec3Array { capacity }) => {
                if items.len() > capacity {
                    state.oversized_array_writes += 1;
                }
                let mut slots = match state.uniforms.get(&descriptor.name) {
                    Some(UniformValue::Vec3Array(existing)) => existing.clone(),
                    _ => vec![[0.0; 3]; capacity],
                };
                for (slot, item) in slots.iter_mut().zip(items) {
                    *slot = *item;
                }
                UniformValue::Vec3Array(slots)
            }
            (UniformData::Scalar(v), _) => UniformValue::Scalar(v),
            (UniformData::Vec2(v), _) => UniformValue::Vec2(v),
            (UniformData::Vec3(v), _) => UniformValue::Vec3(v),
            (UniformData::Vec3Array(items), _) => UniformValue::Vec3Array(items.to_vec()),
            (UniformData::Int(v), _) => UniformValue::Int(v),
            (UniformData::Bool(v), _) => UniformValue::Bool(v),
        };
        state.uniforms.insert(descriptor.name.clone(), stored);
    }

    fn create_quad_buffer(&mut self) -> Option<Self::Buffer> {
        let id = self.allocate()?;
        self.buffers.insert(id);
        self.ledger.0.borrow_mut().live_buffers += 1;
        Some(HeadlessBuffer(id))
    }

    fn delete_buffer(&mut self, buffer: Self::Buffer) {
        self.ledger.record_call();
        if self.buffers.remove(&buffer.0) && !self.ledger.is_lost() {
            self.ledger.0.borrow_mut().live_buffers -= 1;
        }
    }

    fn resize_surface(&mut self, size: SurfaceSize) {
        self.ledger.record_call();
        self.ledger.0.borrow_mut().surface = Some(size);
    }

    fn draw(
        &mut self,
        program: &Self::Program,
        quad: &Self::Buffer,
        clear: [f32; 4],
    ) -> Result<(), DrawError> {
        self.ledger.record_call();
        if self.ledger.is_lost() {
            return Err(DrawError::ContextLost("headless context lost".to_string()));
        }
        if !self.buffers.contains(&quad.0) {
            return Err(DrawError::Skipped(format!("unknown buffer {}", quad.0)));
        }
        if !self.programs.get(&program.0).is_some_and(|record| record.linked) {
            return Err(DrawError::Skipped(format!("program {} not linked", program.0)));
        }
        let mut state = self.ledger.0.borrow_mut();
        state.last_clear = Some(clear);
        state.draws += 1;
        Ok(())
    }
}

/// Host with a fixed box that hands out [`HeadlessBackend`]s.
#[derive(Debug)]
pub struct HeadlessHost {
    ledger: Ledger,
    clock: ManualClock,
    pixel_box: (f64, f64),
    device_pixel_ratio: f64,
    gpu_available: bool,
}

impl HeadlessHost {
    pub fn new(width: f64, height: f64, device_pixel_ratio: f64) -> Self {
        Self {
            ledger: Ledger::new(),
            clock: ManualClock::new(),
            pixel_box: (width, height),
            device_pixel_ratio,
            gpu_available: true,
        }
    }

    /// Host whose context acquisition always fails.
    pub fn without_gpu(mut self) -> Self {
        self.gpu_available = false;
        self
    }

    /// Makes later context acquisitions fail or succeed again.
    pub fn set_gpu_available(&mut self, available: bool) {
        self.gpu_available = available;
    }

    pub fn ledger(&self) -> Ledger {
        self.ledger.clone()
    }

    pub fn clock(&self) -> ManualClock {
        self.clock.clone()
    }

    pub fn set_pixel_box(&mut self, width: f64, height: f64) {
        self.pixel_box = (width, height);
    }

    pub fn set_device_pixel_ratio(&mut self, ratio: f64) {
        self.device_pixel_ratio = ratio;
    }
}

impl HostSurface for HeadlessHost {
    type Backend = HeadlessBackend;

    fn pixel_box(&self) -> (f64, f64) {
        self.pixel_box
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    fn acquire_context(&mut self) -> Result<Self::Backend, String> {
        if !self.gpu_available {
            return Err("headless host has no GPU".to_string());
        }
        {
            let mut state = self.ledger.0.borrow_mut();
            state.lost = false;
            state.contexts_acquired += 1;
        }
        Ok(HeadlessBackend::new(self.ledger.clone()))
    }

    fn request_tick(&mut self) {
        let mut state = self.ledger.0.borrow_mut();
        state.tick_requests += 1;
        state.tick_pending = true;
    }

    fn cancel_tick(&mut self) {
        let mut state = self.ledger.0.borrow_mut();
        state.tick_cancels += 1;
        state.tick_pending = false;
    }

    fn now(&self) -> Duration {
        self.clock.now()
    }
}

fn check_syntax(text: &str) -> Result<(), String> {
    let mut stack = Vec::new();
    for (line_index, line) in text.lines().enumerate() {
        let code = line.split("//").next().unwrap_or_default();
        for ch in code.chars() {
            match ch {
                '(' | '{' | '[' => stack.push((ch, line_index + 1)),
                ')' | '}' | ']' => {
                    let expected = match ch {
                        ')' => '(',
                        '}' => '{',
                        _ => '[',
                    };
                    match stack.pop() {
                        Some((open, _)) if open == expected => {}
                        _ => return Err(format!("ERROR: 0:{}: unexpected '{ch}'", line_index + 1)),
                    }
                }
                _ => {}
            }
        }
    }
    if let Some((open, line)) = stack.pop() {
        return Err(format!("ERROR: 0:{line}: unclosed '{open}'"));
    }
    if !references_identifier(text, "main") {
        return Err("ERROR: 0:0: missing main function".to_string());
    }
    Ok(())
}

fn strip_uniform_declarations(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("uniform "))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_check_reports_line_of_unclosed_delimiter() {
        let err = check_syntax("void main() {\n  float x = (1.0;\n").unwrap_err();
        assert!(err.contains("0:2"), "{err}");
        assert!(check_syntax("void main() { }").is_ok());
    }

    #[test]
    fn lost_context_refuses_allocations() {
        let mut backend = HeadlessBackend::detached();
        assert!(backend.create_quad_buffer().is_some());
        backend.ledger().lose_context();
        assert!(backend.create_shader(ShaderStage::Vertex).is_none());
        assert_eq!(backend.ledger().live_handles(), 0);
    }

    #[test]
    fn host_records_tick_requests_and_cancellations() {
        let mut host = HeadlessHost::new(10.0, 10.0, 1.0);
        let ledger = host.ledger();
        host.request_tick();
        assert!(ledger.tick_pending());
        host.cancel_tick();
        assert!(!ledger.tick_pending());
        assert_eq!((ledger.tick_requests(), ledger.tick_cancels()), (1, 1));
    }
}
