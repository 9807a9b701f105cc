//! Offscreen drawing buffer plus the pass that scales it onto the swapchain.
//!
//! The drawing buffer follows `SurfaceSize` (box × capped pixel ratio) while the
//! swapchain always matches the window, so lower quality tiers render fewer
//! pixels and are stretched with linear filtering, like a canvas whose backing
//! store is smaller than its CSS box.
use std::borrow::Cow;

use wgpu::naga::ShaderStage;

use crate::sizer::SurfaceSize;

const BLIT_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = vec2(pos.x * 0.5 + 0.5, 0.5 - pos.y * 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

const BLIT_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(set = 0, binding = 0) uniform texture2D shaderz_drawing_buffer;
layout(set = 0, binding = 1) uniform sampler shaderz_drawing_sampler;

void main() {
    out_color = texture(sampler2D(shaderz_drawing_buffer, shaderz_drawing_sampler), v_uv);
}
";

struct DrawingBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
    size: (u32, u32),
}

pub(crate) struct Presenter {
    format: wgpu::TextureFormat,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    pipeline: wgpu::RenderPipeline,
    target: DrawingBuffer,
}

impl Presenter {
    pub(crate) fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        size: SurfaceSize,
    ) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("drawing buffer layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("drawing buffer sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("present vertex"),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Borrowed(BLIT_VERTEX_GLSL),
                stage: ShaderStage::Vertex,
                defines: &[],
            },
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("present fragment"),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Borrowed(BLIT_FRAGMENT_GLSL),
                stage: ShaderStage::Fragment,
                defines: &[],
            },
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("present pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("present pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: Some("main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        let target = DrawingBuffer::new(device, &layout, &sampler, format, size.dimensions());
        Self {
            format,
            layout,
            sampler,
            pipeline,
            target,
        }
    }

    /// Format shader programs render into.
    pub(crate) fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub(crate) fn drawing_view(&self) -> &wgpu::TextureView {
        &self.target.view
    }

    pub(crate) fn resize(&mut self, device: &wgpu::Device, size: SurfaceSize) {
        if self.target.size == size.dimensions() {
            return;
        }
        self.target = DrawingBuffer::new(
            device,
            &self.layout,
            &self.sampler,
            self.format,
            size.dimensions(),
        );
    }

    /// Scales the drawing buffer onto `frame`.
    pub(crate) fn encode(&self, encoder: &mut wgpu::CommandEncoder, frame: &wgpu::TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("present pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: frame,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.target.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

impl DrawingBuffer {
    fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        format: wgpu::TextureFormat,
        (width, height): (u32, u32),
    ) -> Self {
        let limit = device.limits().max_texture_dimension_2d;
        let size = (width.clamp(1, limit), height.clamp(1, limit));
        if size != (width, height) {
            tracing::warn!(width, height, limit, "drawing buffer clamped to GPU texture limit");
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("drawing buffer"),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("drawing buffer bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        Self {
            _texture: texture,
            view,
            bind_group,
            size: (width, height),
        }
    }
}
