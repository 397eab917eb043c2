//! The bloom post-process pass.
//!
//! Three stages over one shader module: a luminance-threshold brightpass, a
//! separable two-axis Gaussian blur, and an additive recombine with the scene.
//! Each stage keeps its own uniform buffer so the queued writes for one frame
//! never step on each other.

use crate::error::EngineError;
use crate::gpu::GpuContext;

use super::pass::{Pass, PassKind};
use super::target::{RenderContext, RenderTarget};

/// Default luminance threshold: only over-bright pixels bloom.
pub const DEFAULT_LUMINANCE_THRESHOLD: f32 = 1.0;

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BloomUniforms {
    resolution: [f32; 2],
    threshold: f32,
    intensity: f32,
    direction: [f32; 2],
    _pad: [f32; 2],
}

struct BloomStage {
    uniform_buffer: wgpu::Buffer,
}

/// Brightens pixels above the luminance threshold, blurs them, and adds the
/// result back onto the scene.
pub struct BloomPass {
    threshold: f32,
    intensity: f32,
    brightpass_pipeline: wgpu::RenderPipeline,
    blur_pipeline: wgpu::RenderPipeline,
    combine_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    stages: [BloomStage; 4],
    ping: RenderTarget,
    pong: RenderTarget,
}

impl BloomPass {
    /// Creates the pass with the given luminance threshold
    /// (see [`DEFAULT_LUMINANCE_THRESHOLD`]).
    pub fn new(gpu: &GpuContext, threshold: f32) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Bloom Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/bloom.wgsl").into()),
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Bloom Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Bloom Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |label: &str, entry_point: &str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: gpu.config.format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let stages = std::array::from_fn(|_| BloomStage {
            uniform_buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Bloom Stage Uniforms"),
                size: std::mem::size_of::<BloomUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
        });

        Self {
            threshold,
            intensity: 1.0,
            brightpass_pipeline: make_pipeline("Bloom Brightpass Pipeline", "fs_brightpass"),
            blur_pipeline: make_pipeline("Bloom Blur Pipeline", "fs_blur"),
            combine_pipeline: make_pipeline("Bloom Combine Pipeline", "fs_combine"),
            bind_group_layout,
            sampler,
            stages,
            ping: RenderTarget::new(gpu, "Bloom Ping"),
            pong: RenderTarget::new(gpu, "Bloom Pong"),
        }
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn bind_group(
        &self,
        gpu: &GpuContext,
        stage: usize,
        input: &wgpu::TextureView,
        blur: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.stages[stage].uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(blur),
                },
            ],
        })
    }

    fn run_stage(
        &self,
        ctx: &mut RenderContext,
        pipeline: &wgpu::RenderPipeline,
        target: &wgpu::TextureView,
        bind_group: &wgpu::BindGroup,
    ) {
        let mut render_pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Bloom Stage"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}

impl Pass for BloomPass {
    fn kind(&self) -> PassKind {
        PassKind::Bloom
    }

    fn resize(&mut self, gpu: &GpuContext) {
        self.ping.ensure_size(gpu, "Bloom Ping");
        self.pong.ensure_size(gpu, "Bloom Pong");
    }

    fn execute(
        &mut self,
        ctx: &mut RenderContext,
        target: &wgpu::TextureView,
        input: Option<&wgpu::TextureView>,
    ) -> Result<(), EngineError> {
        let input = input.expect("bloom pass requires the previous pass output");
        let resolution = [ctx.gpu.width() as f32, ctx.gpu.height() as f32];

        let stage_uniforms = [
            // brightpass, blur horizontal, blur vertical, combine
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [0.0, 0.0],
        ]
        .map(|direction| BloomUniforms {
            resolution,
            threshold: self.threshold,
            intensity: self.intensity,
            direction,
            _pad: [0.0, 0.0],
        });
        for (stage, uniforms) in self.stages.iter().zip(stage_uniforms) {
            ctx.gpu
                .queue
                .write_buffer(&stage.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));
        }

        // Brightpass into ping, blur ping -> pong -> ping, then add the
        // blurred highlights back onto the scene while copying it out.
        let brightpass = self.bind_group(ctx.gpu, 0, input, input);
        self.run_stage(ctx, &self.brightpass_pipeline, &self.ping.view, &brightpass);

        let blur_h = self.bind_group(ctx.gpu, 1, &self.ping.view, &self.ping.view);
        self.run_stage(ctx, &self.blur_pipeline, &self.pong.view, &blur_h);

        let blur_v = self.bind_group(ctx.gpu, 2, &self.pong.view, &self.pong.view);
        self.run_stage(ctx, &self.blur_pipeline, &self.ping.view, &blur_v);

        let combine = self.bind_group(ctx.gpu, 3, input, &self.ping.view);
        self.run_stage(ctx, &self.combine_pipeline, target, &combine);

        Ok(())
    }
}
