//! # Brume
//!
//! **A multi-pass 3D renderer with animated procedural materials and layered
//! volumetric fog.**
//!
//! Every frame runs the same ordered pass sequence — clear, opaque scene
//! draw, bloom, outline — while a single tick registry advances every
//! time-driven material exactly once per refresh. Materials are plain
//! descriptors carrying WGSL source and a typed uniform block; cloning one
//! deep-copies its uniforms and gives the clone its own clock. A shared
//! shader-chunk library can be patched once, before anything compiles, so
//! that any material opting into fog picks up a layered-noise fog term.
//!
//! ## Quick Start
//!
//! ```no_run
//! use brume::*;
//!
//! fn main() {
//!     run(|ctx| {
//!         ctx.chunks.install_fog_override(FogFalloff::Exponential { density: 0.05 });
//!
//!         let fog = FogTicker::new();
//!         fog.attach(ctx.registry);
//!
//!         let plane = ctx.scene.add_mesh(Mesh::plane(ctx.gpu, 60.0));
//!         let ground = MaterialTemplate::phong(Color::rgb(0.2, 0.22, 0.25))
//!             .with_fog(true)
//!             .clone_instance(ctx.registry)
//!             .unwrap();
//!         fog.subscribe(&ground);
//!         ctx.scene.add_drawable(plane, Transform::new(), ground);
//!
//!         ctx.camera(Camera::new().at(14.0, 9.0, 14.0).looking_at(0.0, 2.0, 0.0));
//!         ctx.standard_pipeline(Color::rgb(0.02, 0.02, 0.04), 1.0, OutlineSettings::default());
//!
//!         move |_frame| {}
//!     });
//! }
//! ```
//!
//! ## Design
//!
//! - **Strict pass order** — the pipeline validates its sequence on every
//!   render and records an inspectable trace; no pass is skipped or reordered.
//! - **One scheduling discipline** — everything time-driven goes through the
//!   [`TickRegistry`]; per-clone animation and the shared fog clock are both
//!   just tickables.
//! - **Explicit state** — the shader-chunk table is a value you pass around,
//!   not process-global; patching it is a setup step, not a side effect.

mod app;
mod camera;
mod chunks;
mod clock;
mod color;
mod error;
mod gpu;
mod material;
mod mesh;
mod pipeline;
mod scene;
mod scheduler;

pub use app::{AppConfig, Frame, SetupContext, run, run_with_config};
pub use camera::Camera;
pub use chunks::{
    ChunkLibrary, FOG_FRAGMENT, FOG_FRAGMENT_DECLARATIONS, FOG_VERTEX, FOG_VERTEX_DECLARATIONS,
    FogFalloff, FogTicker, SCENE_DECLARATIONS,
};
pub use clock::{Clock, PULSE_INTERVAL, PulseTimer, TickId, TickRegistry, Tickable};
pub use color::Color;
pub use error::EngineError;
pub use gpu::{FrameCounters, GpuContext};
pub use material::{
    BlendMode, MaterialInstance, MaterialTemplate, SharedMaterial, UniformBlock, UniformValue,
};
pub use mesh::{Mesh, Transform, Vertex3d};
pub use pipeline::{
    BloomPass, ClearPass, DEFAULT_LUMINANCE_THRESHOLD, OutlinePass, OutlineSettings, Pass,
    PassKind, Pipeline, PipelineBuilder, RenderContext, RenderTarget, ScenePass,
    effective_sample_count,
};
pub use scene::{Drawable, Light, MeshId, Outlined, Scene};
pub use scheduler::FrameScheduler;

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

pub use hecs::{Entity, World};
