//! Render targets and the per-frame execution context.

use crate::camera::Camera;
use crate::gpu::GpuContext;
use crate::scene::Scene;

/// An off-screen render target a pass can draw into and a later pass can
/// sample from.
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl RenderTarget {
    /// A color target matching the surface format and current size.
    pub fn new(gpu: &GpuContext, label: &str) -> Self {
        Self::with_format(gpu, label, gpu.config.format, 1)
    }

    /// A target with an explicit format and sample count (depth buffers,
    /// multisampled masks).
    pub fn with_format(
        gpu: &GpuContext,
        label: &str,
        format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: gpu.width(),
                height: gpu.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width: gpu.width(),
            height: gpu.height(),
        }
    }

    /// Recreates the texture if the surface size changed since creation.
    pub fn ensure_size(&mut self, gpu: &GpuContext, label: &str) {
        if self.width != gpu.width() || self.height != gpu.height() {
            let format = self.texture.format();
            let sample_count = self.texture.sample_count();
            *self = Self::with_format(gpu, label, format, sample_count);
        }
    }
}

/// Everything a pass needs while recording one frame.
pub struct RenderContext<'a> {
    pub gpu: &'a GpuContext,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub scene: &'a Scene,
    pub camera: &'a Camera,
    /// Elapsed seconds since the scheduler started.
    pub time: f32,
    /// The frame's shared depth buffer, cleared at the end of each frame.
    pub depth_view: &'a wgpu::TextureView,
}
