//! The pipeline itself: an ordered, immutable-after-setup pass sequence.

use crate::camera::Camera;
use crate::chunks::ChunkLibrary;
use crate::color::Color;
use crate::error::EngineError;
use crate::gpu::GpuContext;
use crate::scene::Scene;

use super::bloom_pass::BloomPass;
use super::clear_pass::ClearPass;
use super::outline_pass::{OutlinePass, OutlineSettings};
use super::pass::{Pass, PassKind};
use super::scene_pass::ScenePass;
use super::target::{RenderContext, RenderTarget};

pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Builder for assembling a pass sequence during setup.
///
/// Passes execute in the order they are added; once [`build`](Self::build) has
/// run the sequence is fixed. Validity (non-empty, clear pass first and
/// unique) is checked on every [`Pipeline::render`], so a misassembled
/// pipeline fails on first use rather than mid-frame.
pub struct PipelineBuilder {
    passes: Vec<Box<dyn Pass>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Appends a pass to the sequence.
    pub fn pass<P: Pass + 'static>(mut self, pass: P) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Finalizes the sequence and allocates the shared frame resources:
    /// two ping-pong color targets and the depth buffer.
    pub fn build(self, gpu: &GpuContext) -> Pipeline {
        let depth = RenderTarget::with_format(gpu, "Pipeline Depth", DEPTH_FORMAT, 1);

        // The depth buffer is cleared at the end of every frame; give the
        // first frame the same starting state.
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Pipeline Init Encoder"),
            });
        clear_depth(&mut encoder, &depth.view);
        gpu.queue.submit(std::iter::once(encoder.finish()));

        Pipeline {
            passes: self.passes,
            target_a: RenderTarget::new(gpu, "Pipeline Target A"),
            target_b: RenderTarget::new(gpu, "Pipeline Target B"),
            depth,
            last_trace: Vec::new(),
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The per-frame multi-pass pipeline.
///
/// Owns the ordered pass sequence, the ping-pong targets the post-process
/// passes chain through, and the frame's depth buffer. See the module docs
/// for the execution contract.
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
    target_a: RenderTarget,
    target_b: RenderTarget,
    depth: RenderTarget,
    last_trace: Vec<PassKind>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// The stock sequence: clear, opaque scene draw, bloom, outline.
    pub fn standard(
        gpu: &GpuContext,
        chunks: ChunkLibrary,
        clear_color: Color,
        luminance_threshold: f32,
        outline: OutlineSettings,
    ) -> Pipeline {
        Self::builder()
            .pass(ClearPass::new(clear_color))
            .pass(ScenePass::new(gpu, chunks))
            .pass(BloomPass::new(gpu, luminance_threshold))
            .pass(OutlinePass::new(gpu, outline))
            .build(gpu)
    }

    /// The pass kinds in execution order.
    pub fn pass_kinds(&self) -> Vec<PassKind> {
        self.passes.iter().map(|p| p.kind()).collect()
    }

    /// The pass kinds executed by the most recent [`render`](Self::render),
    /// in the order they ran.
    pub fn last_trace(&self) -> &[PassKind] {
        &self.last_trace
    }

    /// Renders one frame: validates the sequence, executes every pass in
    /// strict order against `scene` and `camera`, then clears the depth
    /// buffer for the next frame.
    ///
    /// Fails with [`EngineError::InvalidPipelineState`] if the sequence is
    /// empty or the clear pass is missing, duplicated, or not first. No pass
    /// is ever skipped or reordered at runtime.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        scene: &Scene,
        camera: &Camera,
        time: f32,
    ) -> Result<(), EngineError> {
        let kinds = self.pass_kinds();
        validate_order(&kinds)?;

        self.target_a.ensure_size(gpu, "Pipeline Target A");
        self.target_b.ensure_size(gpu, "Pipeline Target B");
        self.depth.ensure_size(gpu, "Pipeline Depth");
        for pass in &mut self.passes {
            pass.resize(gpu);
        }

        let output = gpu
            .surface
            .get_current_texture()
            .expect("failed to acquire the surface texture");
        let screen_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Pipeline Encoder"),
            });

        self.last_trace.clear();

        {
            let mut ctx = RenderContext {
                gpu,
                encoder: &mut encoder,
                scene,
                camera,
                time,
                depth_view: &self.depth.view,
            };

            // The clear and opaque passes accumulate into the live target;
            // each post-process pass consumes it and writes the other (or the
            // screen when it is the final pass). Pipelines with no
            // post-process passes render straight to the screen.
            let has_post = kinds.iter().any(|k| k.consumes_input());
            let mut live_is_a = true;
            let pass_count = self.passes.len();

            for (i, pass) in self.passes.iter_mut().enumerate() {
                let is_last = i == pass_count - 1;
                let (live, spare) = if live_is_a {
                    (&self.target_a, &self.target_b)
                } else {
                    (&self.target_b, &self.target_a)
                };

                if pass.kind().consumes_input() {
                    let target = if is_last { &screen_view } else { &spare.view };
                    pass.execute(&mut ctx, target, Some(&live.view))?;
                    live_is_a = !live_is_a;
                } else {
                    let target = if has_post { &live.view } else { &screen_view };
                    pass.execute(&mut ctx, target, None)?;
                }

                ctx.gpu.counters.record_pass();
                self.last_trace.push(pass.kind());
            }
        }

        // The next frame's depth test starts fresh.
        clear_depth(&mut encoder, &self.depth.view);

        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn clear_depth(encoder: &mut wgpu::CommandEncoder, depth_view: &wgpu::TextureView) {
    let _render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Depth Clear Pass"),
        color_attachments: &[],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth_view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

/// Checks the pass-order invariant: at least one pass, exactly one clear
/// pass, and the clear pass comes first.
pub(crate) fn validate_order(kinds: &[PassKind]) -> Result<(), EngineError> {
    if kinds.is_empty() {
        return Err(EngineError::InvalidPipelineState(
            "render invoked with zero passes".to_string(),
        ));
    }
    let clear_count = kinds.iter().filter(|k| **k == PassKind::Clear).count();
    if clear_count != 1 {
        return Err(EngineError::InvalidPipelineState(format!(
            "expected exactly one clear pass, found {clear_count}"
        )));
    }
    if kinds[0] != PassKind::Clear {
        return Err(EngineError::InvalidPipelineState(
            "the clear pass must come first".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_order_is_valid() {
        let kinds = [
            PassKind::Clear,
            PassKind::Opaque,
            PassKind::Bloom,
            PassKind::Outline,
        ];
        assert_eq!(validate_order(&kinds), Ok(()));
    }

    #[test]
    fn zero_passes_is_invalid() {
        let err = validate_order(&[]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPipelineState(_)));
    }

    #[test]
    fn clear_must_come_first() {
        let err = validate_order(&[PassKind::Opaque, PassKind::Clear]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPipelineState(_)));
    }

    #[test]
    fn clear_must_be_unique() {
        let err =
            validate_order(&[PassKind::Clear, PassKind::Clear, PassKind::Opaque]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPipelineState(_)));

        let err = validate_order(&[PassKind::Opaque, PassKind::Bloom]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPipelineState(_)));
    }
}
