//! The outline post-process pass.
//!
//! Entities carrying the [`Outlined`](crate::scene::Outlined) marker are drawn
//! into a multisampled silhouette mask, which is then edge-detected and
//! painted over the scene with a configurable color and strength. The mask's
//! sample count is clamped to what the device supports, never raised as an
//! error.

use crate::color::Color;
use crate::error::EngineError;
use crate::gpu::GpuContext;
use crate::mesh::{Transform, Vertex3d};
use crate::scene::{Drawable, MeshId, Outlined};

use super::pass::{Pass, PassKind};
use super::target::{RenderContext, RenderTarget};

/// Outline appearance and mask quality.
#[derive(Clone, Copy, Debug)]
pub struct OutlineSettings {
    pub edge_color: Color,
    pub edge_strength: f32,
    /// Requested multisample count for the silhouette mask; the effective
    /// count is `min(requested, device max)`.
    pub samples: u32,
}

impl Default for OutlineSettings {
    fn default() -> Self {
        Self {
            edge_color: Color::rgb(0.0, 0.0, 1.0),
            edge_strength: 2.5,
            samples: 4,
        }
    }
}

/// Clamps a requested multisample count to the device capability.
pub fn effective_sample_count(requested: u32, device_max: u32) -> u32 {
    requested.min(device_max).max(1)
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct MaskCameraUniforms {
    view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct MaskModelUniforms {
    model: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CompositeUniforms {
    edge_color: [f32; 4],
    resolution: [f32; 2],
    edge_strength: f32,
    _pad: f32,
}

/// Silhouettes the outlined entities over the scene.
pub struct OutlinePass {
    settings: OutlineSettings,
    sample_count: u32,
    mask_pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    model_layout: wgpu::BindGroupLayout,
    model_slots: Vec<(wgpu::Buffer, wgpu::BindGroup)>,
    mask_ms: Option<RenderTarget>,
    mask: RenderTarget,
    composite_pipeline: wgpu::RenderPipeline,
    composite_buffer: wgpu::Buffer,
    composite_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl OutlinePass {
    pub fn new(gpu: &GpuContext, settings: OutlineSettings) -> Self {
        let device = &gpu.device;
        let sample_count = effective_sample_count(settings.samples, gpu.max_sample_count());

        let mask_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Outline Mask Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/outline_mask.wgsl").into()),
        });
        let composite_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Outline Composite Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../shaders/outline_composite.wgsl").into(),
            ),
        });

        let uniform_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Outline Camera Layout"),
            entries: &[uniform_entry(0)],
        });
        let model_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Outline Model Layout"),
            entries: &[uniform_entry(0)],
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Outline Camera Uniforms"),
            size: std::mem::size_of::<MaskCameraUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Outline Camera Bind Group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let mask_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Outline Mask Pipeline Layout"),
            bind_group_layouts: &[&camera_layout, &model_layout],
            push_constant_ranges: &[],
        });
        let mask_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Outline Mask Pipeline"),
            layout: Some(&mask_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &mask_shader,
                entry_point: Some("vs"),
                buffers: &[Vertex3d::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &mask_shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: gpu.config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                front_face: wgpu::FrontFace::Ccw,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: sample_count,
                ..Default::default()
            },
            multiview: None,
            cache: None,
        });

        let composite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Outline Composite Layout"),
            entries: &[
                uniform_entry(0),
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
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let composite_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Outline Composite Pipeline Layout"),
                bind_group_layouts: &[&composite_layout],
                push_constant_ranges: &[],
            });
        let composite_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Outline Composite Pipeline"),
            layout: Some(&composite_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &composite_shader,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &composite_shader,
                entry_point: Some("fs"),
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
        });

        let composite_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Outline Composite Uniforms"),
            size: std::mem::size_of::<CompositeUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Outline Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let mask_ms = (sample_count > 1).then(|| {
            RenderTarget::with_format(gpu, "Outline Mask MS", gpu.config.format, sample_count)
        });

        Self {
            settings,
            sample_count,
            mask_pipeline,
            camera_buffer,
            camera_bind_group,
            model_layout,
            model_slots: Vec::new(),
            mask_ms,
            mask: RenderTarget::new(gpu, "Outline Mask"),
            composite_pipeline,
            composite_buffer,
            composite_layout,
            sampler,
        }
    }

    /// The mask's sample count after device clamping.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn settings(&self) -> &OutlineSettings {
        &self.settings
    }

    pub fn set_edge_color(&mut self, color: Color) {
        self.settings.edge_color = color;
    }

    pub fn set_edge_strength(&mut self, strength: f32) {
        self.settings.edge_strength = strength;
    }

    fn ensure_model_slots(&mut self, gpu: &GpuContext, count: usize) {
        while self.model_slots.len() < count {
            let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Outline Model Uniforms"),
                size: std::mem::size_of::<MaskModelUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Outline Model Bind Group"),
                layout: &self.model_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            self.model_slots.push((buffer, bind_group));
        }
    }
}

impl Pass for OutlinePass {
    fn kind(&self) -> PassKind {
        PassKind::Outline
    }

    fn resize(&mut self, gpu: &GpuContext) {
        if let Some(mask_ms) = &mut self.mask_ms {
            mask_ms.ensure_size(gpu, "Outline Mask MS");
        }
        self.mask.ensure_size(gpu, "Outline Mask");
    }

    fn execute(
        &mut self,
        ctx: &mut RenderContext,
        target: &wgpu::TextureView,
        input: Option<&wgpu::TextureView>,
    ) -> Result<(), EngineError> {
        let input = input.expect("outline pass requires the previous pass output");

        let mut draws: Vec<(MeshId, Transform)> = Vec::new();
        for (_, (transform, drawable, _)) in ctx
            .scene
            .world
            .query::<(&Transform, &Drawable, &Outlined)>()
            .iter()
        {
            draws.push((drawable.mesh, *transform));
        }

        let view_proj =
            ctx.camera.projection_matrix(ctx.gpu.aspect()) * ctx.camera.view_matrix();
        ctx.gpu.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&[MaskCameraUniforms {
                view_proj: view_proj.to_cols_array_2d(),
            }]),
        );

        self.ensure_model_slots(ctx.gpu, draws.len());
        for (i, (_, transform)) in draws.iter().enumerate() {
            ctx.gpu.queue.write_buffer(
                &self.model_slots[i].0,
                0,
                bytemuck::cast_slice(&[MaskModelUniforms {
                    model: transform.matrix().to_cols_array_2d(),
                }]),
            );
        }

        // Silhouette mask: multisampled when the device allows it, resolved
        // into the single-sample texture the composite stage reads.
        {
            let (mask_view, resolve_target) = match &self.mask_ms {
                Some(ms) => (&ms.view, Some(&self.mask.view)),
                None => (&self.mask.view, None),
            };
            let mut render_pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Outline Mask Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: mask_view,
                    resolve_target,
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

            render_pass.set_pipeline(&self.mask_pipeline);
            render_pass.set_bind_group(0, &self.camera_bind_group, &[]);
            for (i, (mesh_id, _)) in draws.iter().enumerate() {
                let mesh = ctx.scene.mesh(*mesh_id);
                render_pass.set_bind_group(1, &self.model_slots[i].1, &[]);
                render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                render_pass
                    .set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                ctx.gpu.counters.record_draw_call();
            }
        }

        // Edge-detect the mask and paint the edges over the scene.
        ctx.gpu.queue.write_buffer(
            &self.composite_buffer,
            0,
            bytemuck::cast_slice(&[CompositeUniforms {
                edge_color: self.settings.edge_color.to_array(),
                resolution: [ctx.gpu.width() as f32, ctx.gpu.height() as f32],
                edge_strength: self.settings.edge_strength,
                _pad: 0.0,
            }]),
        );

        let composite_bind_group = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Outline Composite Bind Group"),
            layout: &self.composite_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.composite_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&self.mask.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut render_pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Outline Composite Pass"),
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
        render_pass.set_pipeline(&self.composite_pipeline);
        render_pass.set_bind_group(0, &composite_bind_group, &[]);
        render_pass.draw(0..3, 0..1);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_count_never_exceeds_the_device() {
        assert_eq!(effective_sample_count(4, 8), 4);
        assert_eq!(effective_sample_count(8, 4), 4);
        assert_eq!(effective_sample_count(16, 16), 16);
        assert_eq!(effective_sample_count(0, 4), 1);
        for requested in 0..32 {
            for max in 1..16 {
                let effective = effective_sample_count(requested, max);
                assert!(effective <= max.max(1));
                assert!(effective <= requested.max(1));
            }
        }
    }

    #[test]
    fn default_settings_match_the_stock_outline() {
        let settings = OutlineSettings::default();
        assert_eq!(settings.samples, 4);
        assert!((settings.edge_strength - 2.5).abs() < 1e-6);
        assert_eq!(settings.edge_color, Color::rgb(0.0, 0.0, 1.0));
    }
}
