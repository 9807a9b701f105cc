use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::backend::{DrawError, GpuBackend, ShaderStage};
use crate::sizer::SurfaceSize;
use crate::types::{UniformData, UniformDescriptor, UniformKind};

use super::context::GpuContext;
use super::glsl::{self, BlockLayout};
use super::present::Presenter;

const QUAD_VERTICES: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];
const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WgpuShader(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WgpuProgram(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WgpuBuffer(u32);

/// Byte offset of a uniform inside the program's std140 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WgpuLocation {
    program: u32,
    offset: u32,
}

struct ShaderObject {
    stage: ShaderStage,
    compiled: Option<(String, Vec<UniformDescriptor>)>,
}

struct LinkedProgram {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    layout: BlockLayout,
    referenced: Vec<String>,
    staging: Vec<u8>,
}

#[derive(Default)]
struct ProgramObject {
    attached: Vec<u32>,
    linked: Option<LinkedProgram>,
}

/// GL-style object model on top of wgpu.
///
/// Shader objects hold validated source; linking translates both stages
/// against each other and builds the render pipeline. Each program owns a
/// uniform buffer whose CPU copy is rewritten by `set_uniform` and uploaded
/// once per draw.
pub struct WgpuBackend {
    context: GpuContext,
    presenter: Presenter,
    uniform_layout: wgpu::BindGroupLayout,
    quad_layout: [wgpu::VertexBufferLayout<'static>; 1],
    size: SurfaceSize,
    next_id: u32,
    shaders: HashMap<u32, ShaderObject>,
    programs: HashMap<u32, ProgramObject>,
    buffers: HashMap<u32, wgpu::Buffer>,
}

impl WgpuBackend {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let physical = window.inner_size();
        let context = GpuContext::new(window)?;
        let size = SurfaceSize {
            width: physical.width.max(1),
            height: physical.height.max(1),
            pixel_ratio_cap: 1.0,
        };
        let presenter = Presenter::new(&context.device, context.surface_format, size);
        let uniform_layout =
            context
                .device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("uniform layout"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }],
                });
        debug!(adapter = %context.adapter_name, "wgpu backend ready");

        Ok(Self {
            context,
            presenter,
            uniform_layout,
            quad_layout: [wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &QUAD_ATTRIBUTES,
            }],
            size,
            next_id: 1,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
        })
    }

    fn allocate(&mut self) -> Option<u32> {
        if self.context.is_lost() {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        Some(id)
    }

    fn build_program(&self, attached: &[u32]) -> Result<LinkedProgram, String> {
        let mut vertex = None;
        let mut fragment = None;
        for id in attached {
            let shader = self
                .shaders
                .get(id)
                .ok_or_else(|| format!("attached shader {id} was deleted"))?;
            let compiled = shader
                .compiled
                .as_ref()
                .ok_or_else(|| format!("attached {} shader is not compiled", shader.stage))?;
            match shader.stage {
                ShaderStage::Vertex => vertex = Some(compiled),
                ShaderStage::Fragment => fragment = Some(compiled),
            }
        }
        let (Some((vertex_text, uniforms)), Some((fragment_text, _))) = (vertex, fragment) else {
            return Err("program needs one vertex and one fragment shader".to_string());
        };

        let layout = BlockLayout::new(uniforms);
        let vertex = glsl::translate(ShaderStage::Vertex, vertex_text, &layout, None)?;
        let fragment = glsl::translate(
            ShaderStage::Fragment,
            fragment_text,
            &layout,
            Some(vertex.varyings.as_slice()),
        )?;

        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("surface vertex"),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(vertex.text),
                stage: glsl::naga_stage(ShaderStage::Vertex),
                defines: &[],
            },
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("surface fragment"),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(fragment.text),
                stage: glsl::naga_stage(ShaderStage::Fragment),
                defines: &[],
            },
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("surface uniforms"),
            size: u64::from(layout.size()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("surface uniform bind group"),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("surface pipeline layout"),
            bind_group_layouts: &[&self.uniform_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("surface pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &self.quad_layout,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.presenter.format(),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(error.to_string());
        }

        let mut referenced = vertex.referenced;
        for name in fragment.referenced {
            if !referenced.contains(&name) {
                referenced.push(name);
            }
        }

        Ok(LinkedProgram {
            pipeline,
            uniform_buffer,
            bind_group,
            staging: vec![0; layout.size() as usize],
            layout,
            referenced,
        })
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        for buffer in self.buffers.values() {
            buffer.destroy();
        }
        debug!(
            shaders = self.shaders.len(),
            programs = self.programs.len(),
            buffers = self.buffers.len(),
            "wgpu backend released"
        );
    }
}

impl GpuBackend for WgpuBackend {
    type Shader = WgpuShader;
    type Program = WgpuProgram;
    type Buffer = WgpuBuffer;
    type Location = WgpuLocation;

    fn create_shader(&mut self, stage: ShaderStage) -> Option<Self::Shader> {
        let id = self.allocate()?;
        self.shaders.insert(
            id,
            ShaderObject {
                stage,
                compiled: None,
            },
        );
        Some(WgpuShader(id))
    }

    fn compile_shader(
        &mut self,
        shader: &Self::Shader,
        text: &str,
        uniforms: &[UniformDescriptor],
    ) -> Result<(), String> {
        if self.context.is_lost() {
            return Err("GPU device lost".to_string());
        }
        let record = self
            .shaders
            .get_mut(&shader.0)
            .ok_or_else(|| format!("unknown shader object {}", shader.0))?;

        let layout = BlockLayout::new(uniforms);
        let translation = glsl::translate(record.stage, text, &layout, None)?;
        glsl::validate(record.stage, &translation.text)?;
        record.compiled = Some((text.to_string(), uniforms.to_vec()));
        Ok(())
    }

    fn delete_shader(&mut self, shader: Self::Shader) {
        self.shaders.remove(&shader.0);
    }

    fn create_program(&mut self) -> Option<Self::Program> {
        let id = self.allocate()?;
        self.programs.insert(id, ProgramObject::default());
        Some(WgpuProgram(id))
    }

    fn attach_shader(&mut self, program: &Self::Program, shader: &Self::Shader) {
        if let Some(record) = self.programs.get_mut(&program.0) {
            record.attached.push(shader.0);
        }
    }

    fn link_program(&mut self, program: &Self::Program) -> Result<(), String> {
        if self.context.is_lost() {
            return Err("GPU device lost".to_string());
        }
        let attached = self
            .programs
            .get(&program.0)
            .map(|record| record.attached.clone())
            .ok_or_else(|| format!("unknown program object {}", program.0))?;
        let linked = self.build_program(&attached)?;
        if let Some(record) = self.programs.get_mut(&program.0) {
            record.linked = Some(linked);
        }
        Ok(())
    }

    fn delete_program(&mut self, program: Self::Program) {
        if let Some(linked) = self
            .programs
            .remove(&program.0)
            .and_then(|record| record.linked)
        {
            linked.uniform_buffer.destroy();
        }
    }

    fn uniform_location(&self, program: &Self::Program, name: &str) -> Option<Self::Location> {
        let linked = self.programs.get(&program.0)?.linked.as_ref()?;
        let entry = linked.layout.entry(name)?;
        linked
            .referenced
            .iter()
            .any(|candidate| candidate == name)
            .then_some(WgpuLocation {
                program: program.0,
                offset: entry.offset,
            })
    }

    fn set_uniform(
        &mut self,
        program: &Self::Program,
        location: Self::Location,
        value: UniformData<'_>,
    ) {
        if location.program != program.0 {
            debug!(?location, "ignoring uniform location from another program");
            return;
        }
        let Some(linked) = self
            .programs
            .get_mut(&program.0)
            .and_then(|record| record.linked.as_mut())
        else {
            return;
        };
        let offset = location.offset as usize;
        let staging = &mut linked.staging;
        match value {
            UniformData::Scalar(v) => write_bytes(staging, offset, bytemuck::bytes_of(&v)),
            UniformData::Vec2(v) => write_bytes(staging, offset, bytemuck::cast_slice(&v)),
            UniformData::Vec3(v) => write_bytes(staging, offset, bytemuck::cast_slice(&v)),
            UniformData::Int(v) => write_bytes(staging, offset, bytemuck::bytes_of(&v)),
            UniformData::Bool(v) => {
                write_bytes(staging, offset, bytemuck::bytes_of(&i32::from(v)))
            }
            UniformData::Vec3Array(items) => {
                let capacity = linked
                    .layout
                    .entries()
                    .iter()
                    .find(|entry| entry.offset == location.offset)
                    .and_then(|entry| match entry.kind {
                        UniformKind::Vec3Array { capacity } => Some(capacity),
                        _ => None,
                    })
                    .unwrap_or(0);
                // std140 pads every array element to 16 bytes.
                for (index, item) in items.iter().take(capacity).enumerate() {
                    write_bytes(staging, offset + index * 16, bytemuck::cast_slice(item));
                }
            }
        }
    }

    fn create_quad_buffer(&mut self) -> Option<Self::Buffer> {
        let id = self.allocate()?;
        let buffer = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("unit quad"),
                contents: bytemuck::cast_slice(&QUAD_VERTICES),
                usage: wgpu::BufferUsages::VERTEX,
            });
        self.buffers.insert(id, buffer);
        Some(WgpuBuffer(id))
    }

    fn delete_buffer(&mut self, buffer: Self::Buffer) {
        if let Some(buffer) = self.buffers.remove(&buffer.0) {
            buffer.destroy();
        }
    }

    fn resize_surface(&mut self, size: SurfaceSize) {
        self.size = size;
        self.presenter.resize(&self.context.device, size);
        self.context.sync_to_window();
    }

    fn draw(
        &mut self,
        program: &Self::Program,
        quad: &Self::Buffer,
        clear: [f32; 4],
    ) -> Result<(), DrawError> {
        if self.context.is_lost() {
            return Err(DrawError::ContextLost("GPU device lost".to_string()));
        }
        let Some(linked) = self
            .programs
            .get_mut(&program.0)
            .and_then(|record| record.linked.as_mut())
        else {
            return Err(DrawError::Skipped(format!("program {} is not linked", program.0)));
        };
        let Some(vertices) = self.buffers.get(&quad.0) else {
            return Err(DrawError::Skipped(format!("unknown buffer {}", quad.0)));
        };

        self.context.sync_to_window();
        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Outdated) => {
                let size = PhysicalSize::new(self.context.config.width, self.context.config.height);
                self.context.reconfigure(size);
                return Err(DrawError::Skipped("surface outdated".to_string()));
            }
            Err(wgpu::SurfaceError::Timeout) => {
                return Err(DrawError::Skipped("timed out acquiring frame".to_string()));
            }
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::OutOfMemory)) => {
                return Err(DrawError::ContextLost(err.to_string()));
            }
            Err(err) => return Err(DrawError::Skipped(err.to_string())),
        };

        let viewport = [self.size.width as f32, self.size.height as f32, 0.0, 0.0];
        write_bytes(&mut linked.staging, 0, bytemuck::cast_slice(&viewport));
        self.context
            .queue
            .write_buffer(&linked.uniform_buffer, 0, &linked.staging);

        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("surface encoder"),
                });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("surface pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.presenter.drawing_view(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(clear[0]),
                            g: f64::from(clear[1]),
                            b: f64::from(clear[2]),
                            a: f64::from(clear[3]),
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&linked.pipeline);
            pass.set_bind_group(0, &linked.bind_group, &[]);
            pass.set_vertex_buffer(0, vertices.slice(..));
            pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
        }
        self.presenter.encode(&mut encoder, &frame_view);

        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}

fn write_bytes(staging: &mut [u8], offset: usize, bytes: &[u8]) {
    if let Some(slot) = staging.get_mut(offset..offset + bytes.len()) {
        slot.copy_from_slice(bytes);
    }
}
