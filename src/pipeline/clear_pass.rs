//! The frame-opening clear pass.

use crate::color::Color;
use crate::gpu::GpuContext;

use super::pass::{Pass, PassKind};
use super::target::RenderContext;

/// Clears the color target, resets the viewport to the full surface, and
/// disables scissoring. Always the first pass of a pipeline.
pub struct ClearPass {
    color: Color,
}

impl ClearPass {
    pub fn new(color: Color) -> Self {
        Self { color }
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }
}

impl Pass for ClearPass {
    fn kind(&self) -> PassKind {
        PassKind::Clear
    }

    fn resize(&mut self, _gpu: &GpuContext) {}

    fn execute(
        &mut self,
        ctx: &mut RenderContext,
        target: &wgpu::TextureView,
        _input: Option<&wgpu::TextureView>,
    ) -> Result<(), crate::error::EngineError> {
        let mut render_pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.color.to_wgpu()),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        // Full-surface viewport, scissor back to the whole target.
        let (w, h) = (ctx.gpu.width(), ctx.gpu.height());
        render_pass.set_viewport(0.0, 0.0, w as f32, h as f32, 0.0, 1.0);
        render_pass.set_scissor_rect(0, 0, w, h);
        Ok(())
    }
}
