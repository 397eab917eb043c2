//! The pass trait and pass kinds.

use crate::gpu::GpuContext;

use super::target::RenderContext;

/// What a pass does within the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    /// Clears the color target; always first, exactly once.
    Clear,
    /// Draws the scene's drawables without clearing.
    Opaque,
    /// Brightens and blurs pixels above a luminance threshold.
    Bloom,
    /// Silhouettes the outlined objects over the scene.
    Outline,
}

impl PassKind {
    /// Whether the pass samples the previous pass's output.
    pub fn consumes_input(self) -> bool {
        matches!(self, Self::Bloom | Self::Outline)
    }
}

/// One step of the pipeline's per-frame sequence.
///
/// Implementations record their GPU work into the frame's encoder. A pass
/// either renders fresh content onto `target` (clear, opaque) or transforms
/// `input` into `target` (the post-process kinds).
pub trait Pass {
    fn kind(&self) -> PassKind;

    /// Recreates any internal size-dependent resources. Called once per frame
    /// before execution; implementations compare against the current surface
    /// size and usually do nothing.
    fn resize(&mut self, _gpu: &GpuContext) {}

    /// Records this pass's GPU commands. The opaque pass is the only one
    /// that can fail (a material may refuse to compile); the error aborts
    /// the frame before anything is submitted.
    fn execute(
        &mut self,
        ctx: &mut RenderContext,
        target: &wgpu::TextureView,
        input: Option<&wgpu::TextureView>,
    ) -> Result<(), crate::error::EngineError>;
}
