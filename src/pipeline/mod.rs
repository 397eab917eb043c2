//! The ordered multi-pass pipeline.
//!
//! A [`Pipeline`] owns an immutable-after-setup sequence of [`Pass`]es and the
//! intermediate render targets they chain through. Every frame executes the
//! same sequence in the same order: clear, opaque scene draw, then the
//! post-process effects, with the depth buffer cleared at the end of the frame
//! so the next one starts fresh.
//!
//! ```ignore
//! let pipeline = Pipeline::builder()
//!     .pass(ClearPass::new(Color::BLACK))
//!     .pass(ScenePass::new(&gpu, chunks.clone()))
//!     .pass(BloomPass::new(&gpu, 1.0))
//!     .pass(OutlinePass::new(&gpu, OutlineSettings::default()))
//!     .build(&gpu);
//!
//! pipeline.render(&gpu, &scene, &camera, time)?;
//! ```

mod bloom_pass;
mod clear_pass;
mod graph;
mod outline_pass;
mod pass;
mod scene_pass;
mod target;

pub use bloom_pass::{BloomPass, DEFAULT_LUMINANCE_THRESHOLD};
pub use clear_pass::ClearPass;
pub use graph::{Pipeline, PipelineBuilder};
pub use outline_pass::{OutlinePass, OutlineSettings, effective_sample_count};
pub use pass::{Pass, PassKind};
pub use scene_pass::ScenePass;
pub use target::{RenderContext, RenderTarget};
