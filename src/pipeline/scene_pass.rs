//! The opaque scene draw pass.
//!
//! Draws every entity carrying a [`Transform`] and a
//! [`Drawable`](crate::scene::Drawable) with its procedural material, onto the
//! buffer the clear pass just prepared. Two bind groups are owned here and
//! shared by every material pipeline:
//!
//! - **Group 0**: per-frame camera and light uniforms, written once per frame
//! - **Group 1**: per-draw model uniforms, one buffer per queued draw
//!
//! Groups 2 (material uniforms) and 3 (fog uniforms, when opted in) belong to
//! the material instances themselves; see
//! [`MaterialInstance`](crate::material::MaterialInstance).

use crate::chunks::ChunkLibrary;
use crate::error::EngineError;
use crate::gpu::GpuContext;
use crate::material::{PipelineTargets, SharedMaterial};
use crate::mesh::Transform;
use crate::scene::{Drawable, MeshId};

use super::graph::DEPTH_FORMAT;
use super::pass::{Pass, PassKind};
use super::target::RenderContext;

/// Per-frame camera and light uniforms, shared by all scene materials.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct FrameUniforms {
    view_proj: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    camera_pos: [f32; 3],
    time: f32,
    light_dir: [f32; 3],
    _pad0: f32,
    light_color: [f32; 3],
    _pad1: f32,
    ambient: [f32; 3],
    _pad2: f32,
}

/// Per-draw model uniforms.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ModelUniforms {
    model: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 4],
}

/// Draws the scene's drawables with the frame camera, accumulating onto the
/// just-cleared color buffer.
pub struct ScenePass {
    chunks: ChunkLibrary,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    frame_layout: wgpu::BindGroupLayout,
    model_layout: wgpu::BindGroupLayout,
    // One (buffer, bind group) slot per queued draw, grown on demand and
    // reused across frames.
    model_slots: Vec<(wgpu::Buffer, wgpu::BindGroup)>,
}

impl ScenePass {
    /// Creates the pass. The chunk library is captured here, after any fog
    /// override has been installed, and consulted read-only at material
    /// compile time.
    pub fn new(gpu: &GpuContext, chunks: ChunkLibrary) -> Self {
        let device = &gpu.device;

        let frame_layout = uniform_layout(device, "Frame Bind Group Layout");
        let model_layout = uniform_layout(device, "Model Bind Group Layout");

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        Self {
            chunks,
            frame_buffer,
            frame_bind_group,
            frame_layout,
            model_layout,
            model_slots: Vec::new(),
        }
    }

    pub fn chunks(&self) -> &ChunkLibrary {
        &self.chunks
    }

    fn ensure_model_slots(&mut self, gpu: &GpuContext, count: usize) {
        while self.model_slots.len() < count {
            let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Model Uniforms"),
                size: std::mem::size_of::<ModelUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Model Bind Group"),
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

fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

impl Pass for ScenePass {
    fn kind(&self) -> PassKind {
        PassKind::Opaque
    }

    fn execute(
        &mut self,
        ctx: &mut RenderContext,
        target: &wgpu::TextureView,
        _input: Option<&wgpu::TextureView>,
    ) -> Result<(), EngineError> {
        // Queue the frame's draws: opaque materials first, blended ones after,
        // so depth-write-off surfaces composite over what they overlap.
        let mut draws: Vec<(MeshId, Transform, SharedMaterial)> = Vec::new();
        for (_, (transform, drawable)) in ctx
            .scene
            .world
            .query::<(&Transform, &Drawable)>()
            .iter()
        {
            draws.push((drawable.mesh, *transform, drawable.material.clone_shared()));
        }
        draws.sort_by_key(|(_, _, material)| material.is_blended());

        let view = ctx.camera.view_matrix();
        let proj = ctx.camera.projection_matrix(ctx.gpu.aspect());
        let (light_dir, light_color, ambient) = ctx.scene.lighting();
        let frame_uniforms = FrameUniforms {
            view_proj: (proj * view).to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            camera_pos: ctx.camera.position.to_array(),
            time: ctx.time,
            light_dir: light_dir.to_array(),
            _pad0: 0.0,
            light_color: light_color.to_array(),
            _pad1: 0.0,
            ambient: ambient.to_array(),
            _pad2: 0.0,
        };
        ctx.gpu.queue.write_buffer(
            &self.frame_buffer,
            0,
            bytemuck::cast_slice(&[frame_uniforms]),
        );

        // Compile-on-first-use and uniform upload happen before the render
        // pass opens; buffer writes land when the queue flushes at submit.
        let targets = PipelineTargets {
            frame_layout: &self.frame_layout,
            model_layout: &self.model_layout,
            color_format: ctx.gpu.config.format,
            depth_format: DEPTH_FORMAT,
        };
        self.ensure_model_slots(ctx.gpu, draws.len());
        for (i, (_, transform, material)) in draws.iter().enumerate() {
            material
                .instance()
                .ensure_compiled(ctx.gpu, &self.chunks, &targets)?;
            material.instance().upload(ctx.gpu, &self.chunks);

            let model_matrix = transform.matrix();
            let model_uniforms = ModelUniforms {
                model: model_matrix.to_cols_array_2d(),
                normal_matrix: model_matrix.inverse().transpose().to_cols_array_2d(),
            };
            ctx.gpu.queue.write_buffer(
                &self.model_slots[i].0,
                0,
                bytemuck::cast_slice(&[model_uniforms]),
            );
        }

        let mut render_pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    // Accumulate onto the cleared buffer, never clear again.
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: ctx.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_bind_group(0, &self.frame_bind_group, &[]);
        for (i, (mesh_id, _, material)) in draws.iter().enumerate() {
            let mesh = ctx.scene.mesh(*mesh_id);
            material.instance().bind(&mut render_pass);
            render_pass.set_bind_group(1, &self.model_slots[i].1, &[]);
            render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            ctx.gpu.counters.record_draw_call();
        }

        Ok(())
    }
}
