//! The shader-chunk library and the global fog override.
//!
//! Shader sources in this crate are assembled from named snippets
//! ("chunks"). A material's WGSL pulls a chunk in with an include line:
//!
//! ```wgsl
//! #include <scene_declarations>
//! ```
//!
//! [`ChunkLibrary`] is an explicit value passed to whoever compiles shaders —
//! there is no process-global snippet table. The one sanctioned mutation,
//! [`install_fog_override`](ChunkLibrary::install_fog_override), happens at
//! setup time before any material compiles; afterwards the library is
//! consulted read-only. Any fog-opted material compiled against the patched
//! library automatically receives the injected fog code.
//!
//! # Fog slots
//!
//! Four slot names are fixed public contract; base materials that include
//! them keep compiling no matter what the slots currently hold:
//!
//! | Slot | Spliced into | Holds |
//! |------|--------------|-------|
//! | `fog_vertex_declarations` | `VsOut` / `FsIn` structs | the world-position varying field |
//! | `fog_vertex` | end of the vertex entry point | the varying assignment (needs `world_pos: vec4f` in scope) |
//! | `fog_fragment_declarations` | fragment module top level | fog uniforms + fog functions |
//! | `fog_fragment` | end of the fragment entry point | the final-color blend (needs `var color: vec4f` in scope) |
//!
//! The stock library fills these with plain exponential depth fog. The
//! override replaces them with a layered-noise version: fractal Brownian
//! motion over a 3-D gradient noise primitive, drifting with `fog_time`,
//! weighting the fog factor by both view depth and world height.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;

use crate::clock::{Clock, TickId, TickRegistry};
use crate::error::EngineError;
use crate::material::{SharedMaterial, UniformBlock, UniformValue};

/// Slot name for the fog varying declaration (vertex output / fragment input).
pub const FOG_VERTEX_DECLARATIONS: &str = "fog_vertex_declarations";
/// Slot name for the world-position varying assignment.
pub const FOG_VERTEX: &str = "fog_vertex";
/// Slot name for the fog uniform/function declarations.
pub const FOG_FRAGMENT_DECLARATIONS: &str = "fog_fragment_declarations";
/// Slot name for the fog factor computation and final color blend.
pub const FOG_FRAGMENT: &str = "fog_fragment";
/// Slot name for the shared frame/model/vertex-input declarations.
pub const SCENE_DECLARATIONS: &str = "scene_declarations";

/// Size of the packed fog uniform struct (group 3, binding 0).
pub const FOG_UNIFORM_BYTES: usize = 32;

/// How the fog factor grows with view depth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FogFalloff {
    /// Squared-exponential falloff driven by a density uniform.
    Exponential { density: f32 },
    /// Linear ramp between a near and a far distance.
    Linear { near: f32, far: f32 },
}

impl Default for FogFalloff {
    fn default() -> Self {
        // The stock scene fog: FogExp2-style, light haze.
        Self::Exponential { density: 0.05 }
    }
}

const SCENE_DECLARATIONS_SRC: &str = include_str!("shaders/scene_declarations.wgsl");

const STOCK_FOG_VARYING: &str = "@location(7) fog_world_pos: vec3f,";
const STOCK_FOG_VERTEX: &str = "out.fog_world_pos = world_pos.xyz;";
const STOCK_FOG_BLEND: &str =
    "color = vec4f(mix(color.rgb, fog.color, fog_factor(in.fog_world_pos)), color.a);";

const STOCK_FOG_FRAGMENT_DECLARATIONS: &str = "\
struct FogUniforms {
    color: vec3f,
    time: f32,
    density: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
}
@group(3) @binding(0) var<uniform> fog: FogUniforms;

fn fog_factor(world_pos: vec3f) -> f32 {
    let dist = distance(frame.camera_pos, world_pos);
    return clamp(1.0 - exp(-fog.density * fog.density * dist * dist), 0.0, 1.0);
}
";

/// The 3-D gradient noise primitive and the fBm accumulation over it,
/// shared by both falloff modes of the override.
const FOG_NOISE_FUNCTIONS: &str = "\
fn fog_hash(p: vec3f) -> vec3f {
    let q = vec3f(
        dot(p, vec3f(127.1, 311.7, 74.7)),
        dot(p, vec3f(269.5, 183.3, 246.1)),
        dot(p, vec3f(113.5, 271.9, 124.6)),
    );
    return -1.0 + 2.0 * fract(sin(q) * 43758.5453123);
}

fn fog_noise(p: vec3f) -> f32 {
    let i = floor(p);
    let f = fract(p);
    let u = f * f * (3.0 - 2.0 * f);
    return mix(
        mix(
            mix(dot(fog_hash(i + vec3f(0.0, 0.0, 0.0)), f - vec3f(0.0, 0.0, 0.0)),
                dot(fog_hash(i + vec3f(1.0, 0.0, 0.0)), f - vec3f(1.0, 0.0, 0.0)), u.x),
            mix(dot(fog_hash(i + vec3f(0.0, 1.0, 0.0)), f - vec3f(0.0, 1.0, 0.0)),
                dot(fog_hash(i + vec3f(1.0, 1.0, 0.0)), f - vec3f(1.0, 1.0, 0.0)), u.x),
            u.y),
        mix(
            mix(dot(fog_hash(i + vec3f(0.0, 0.0, 1.0)), f - vec3f(0.0, 0.0, 1.0)),
                dot(fog_hash(i + vec3f(1.0, 0.0, 1.0)), f - vec3f(1.0, 0.0, 1.0)), u.x),
            mix(dot(fog_hash(i + vec3f(0.0, 1.0, 1.0)), f - vec3f(0.0, 1.0, 1.0)),
                dot(fog_hash(i + vec3f(1.0, 1.0, 1.0)), f - vec3f(1.0, 1.0, 1.0)), u.x),
            u.y),
        u.z);
}

fn fog_fbm(p: vec3f) -> f32 {
    var value = 0.0;
    var amplitude = 0.5;
    var q = p;
    for (var i = 0; i < 5; i = i + 1) {
        value = value + amplitude * fog_noise(q);
        amplitude = amplitude * 0.5;
        q = q * 2.02;
    }
    return value;
}
";

fn override_fragment_declarations(falloff: FogFalloff) -> String {
    let (fields, depth_term) = match falloff {
        FogFalloff::Exponential { .. } => (
            "    density: f32,\n    _pad0: f32,\n    _pad1: f32,\n    _pad2: f32,",
            "let depth_term = 1.0 - exp(-fog.density * fog.density * dist * dist);",
        ),
        FogFalloff::Linear { .. } => (
            "    near: f32,\n    far: f32,\n    _pad0: f32,\n    _pad1: f32,",
            "let depth_term = clamp((dist - fog.near) / max(fog.far - fog.near, 0.001), 0.0, 1.0);",
        ),
    };
    format!(
        "struct FogUniforms {{\n    color: vec3f,\n    time: f32,\n{fields}\n}}\n\
         @group(3) @binding(0) var<uniform> fog: FogUniforms;\n\n\
         {FOG_NOISE_FUNCTIONS}\n\
         fn fog_factor(world_pos: vec3f) -> f32 {{\n\
         \x20   let dist = distance(frame.camera_pos, world_pos);\n\
         \x20   {depth_term}\n\
         \x20   let drift = vec3f(0.0, 0.0, fog.time * 0.025);\n\
         \x20   let turbulence = 0.5 + 0.5 * fog_fbm(world_pos * 0.08 + drift);\n\
         \x20   let height_weight = exp(-max(world_pos.y, 0.0) * 0.08);\n\
         \x20   return clamp(depth_term * mix(0.55, 1.0, turbulence) * mix(0.35, 1.0, height_weight), 0.0, 1.0);\n\
         }}\n"
    )
}

/// The named shader-snippet table.
///
/// Created once at setup, optionally patched with
/// [`install_fog_override`](Self::install_fog_override), then shared read-only
/// with everything that compiles shaders. Cloning snapshots the table.
#[derive(Clone, Debug)]
pub struct ChunkLibrary {
    chunks: Vec<(String, String)>,
    fog_installed: bool,
    fog_falloff: FogFalloff,
    fog_uniforms: UniformBlock,
}

impl ChunkLibrary {
    /// The stock library: shared scene declarations plus plain exponential
    /// depth fog in the fog slots.
    pub fn standard() -> Self {
        let mut fog_uniforms = UniformBlock::new();
        fog_uniforms.set_vec3("fog_color", Vec3::new(0.875, 0.914, 0.953));
        fog_uniforms.set_float("fog_density", 0.05);

        Self {
            chunks: vec![
                (SCENE_DECLARATIONS.to_string(), SCENE_DECLARATIONS_SRC.to_string()),
                (FOG_VERTEX_DECLARATIONS.to_string(), STOCK_FOG_VARYING.to_string()),
                (FOG_VERTEX.to_string(), STOCK_FOG_VERTEX.to_string()),
                (
                    FOG_FRAGMENT_DECLARATIONS.to_string(),
                    STOCK_FOG_FRAGMENT_DECLARATIONS.to_string(),
                ),
                (FOG_FRAGMENT.to_string(), STOCK_FOG_BLEND.to_string()),
            ],
            fog_installed: false,
            fog_falloff: FogFalloff::default(),
            fog_uniforms,
        }
    }

    /// An empty library, for tests and fully custom setups.
    pub fn empty() -> Self {
        Self {
            chunks: Vec::new(),
            fog_installed: false,
            fog_falloff: FogFalloff::default(),
            fog_uniforms: UniformBlock::new(),
        }
    }

    /// Adds or replaces a custom chunk.
    pub fn with_chunk(mut self, name: &str, source: &str) -> Self {
        self.set_chunk(name, source);
        self
    }

    fn set_chunk(&mut self, name: &str, source: &str) {
        match self.chunks.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = source.to_string(),
            None => self.chunks.push((name.to_string(), source.to_string())),
        }
    }

    /// Looks up a chunk's current source text.
    pub fn chunk(&self, name: &str) -> Option<&str> {
        self.chunks
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s.as_str())
    }

    /// Rewrites the fog slots with the layered-noise override and declares
    /// the uniforms it requires (`fog_time`, `fog_color`, plus `fog_density`
    /// or `fog_near`/`fog_far` depending on `falloff`).
    ///
    /// Applied at most once per library: a repeated call is a no-op and
    /// neither duplicates the injected code nor re-declares uniforms.
    pub fn install_fog_override(&mut self, falloff: FogFalloff) {
        if self.fog_installed {
            eprintln!("[fog] override already installed, ignoring repeated call");
            return;
        }

        self.set_chunk(FOG_VERTEX_DECLARATIONS, STOCK_FOG_VARYING);
        self.set_chunk(FOG_VERTEX, STOCK_FOG_VERTEX);
        self.set_chunk(
            FOG_FRAGMENT_DECLARATIONS,
            &override_fragment_declarations(falloff),
        );
        self.set_chunk(FOG_FRAGMENT, STOCK_FOG_BLEND);

        let mut uniforms = UniformBlock::new();
        uniforms.set_vec3("fog_color", Vec3::new(0.875, 0.914, 0.953));
        uniforms.set_float("fog_time", 0.0);
        match falloff {
            FogFalloff::Exponential { density } => uniforms.set_float("fog_density", density),
            FogFalloff::Linear { near, far } => {
                uniforms.set_float("fog_near", near);
                uniforms.set_float("fog_far", far);
            }
        }

        self.fog_uniforms = uniforms;
        self.fog_falloff = falloff;
        self.fog_installed = true;
    }

    /// Whether the fog override has been installed.
    pub fn is_fog_installed(&self) -> bool {
        self.fog_installed
    }

    /// Readiness check for fog-opted material compilation.
    ///
    /// Patch first, compile after: a material that declared fog interest must
    /// not compile until the override is in place.
    pub fn require_fog(&self) -> Result<(), EngineError> {
        if self.fog_installed {
            Ok(())
        } else {
            Err(EngineError::ShaderNotPatched)
        }
    }

    /// The uniform defaults a fog-opted material merges into its block
    /// before compiling.
    pub fn fog_uniforms(&self) -> &UniformBlock {
        &self.fog_uniforms
    }

    pub fn fog_falloff(&self) -> FogFalloff {
        self.fog_falloff
    }

    /// Splices `#include <name>` lines with the named chunk's text.
    ///
    /// Fog slots resolve to nothing when `fog` is false, so the same base
    /// source compiles with or without the fog term.
    ///
    /// # Panics
    ///
    /// Panics on an include naming a chunk the library does not hold — that
    /// is a programmer error, not a recoverable condition.
    pub fn resolve_includes(&self, source: &str, fog: bool) -> String {
        let mut out = String::with_capacity(source.len());
        for line in source.lines() {
            let trimmed = line.trim();
            if let Some(name) = trimmed
                .strip_prefix("#include <")
                .and_then(|rest| rest.strip_suffix('>'))
            {
                if name.starts_with("fog_") && !fog {
                    continue;
                }
                match self.chunk(name) {
                    Some(text) => out.push_str(text),
                    None => panic!("unknown shader chunk '{name}'"),
                }
                out.push('\n');
            } else {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// Packs a uniform block's fog values into the fixed 32-byte layout of
    /// the `FogUniforms` struct (color, time, then the falloff parameters).
    pub fn pack_fog_uniforms(&self, block: &UniformBlock) -> [u8; FOG_UNIFORM_BYTES] {
        let color = match block.get("fog_color") {
            Some(UniformValue::Vec3(v)) => *v,
            Some(UniformValue::Color(c)) => Vec3::new(c.r, c.g, c.b),
            _ => Vec3::ONE,
        };
        let time = block.get_float("fog_time").unwrap_or(0.0);
        let (a, b) = match self.fog_falloff {
            FogFalloff::Exponential { density } => {
                (block.get_float("fog_density").unwrap_or(density), 0.0)
            }
            FogFalloff::Linear { near, far } => (
                block.get_float("fog_near").unwrap_or(near),
                block.get_float("fog_far").unwrap_or(far),
            ),
        };

        let floats = [color.x, color.y, color.z, time, a, b, 0.0, 0.0];
        let mut bytes = [0u8; FOG_UNIFORM_BYTES];
        bytes.copy_from_slice(bytemuck::cast_slice(&floats));
        bytes
    }
}

struct FogTickerState {
    subscribers: Vec<SharedMaterial>,
    clock: Clock,
}

/// The single shared clock for every fog-opted material.
///
/// Instead of one animation loop per material (the per-clone pattern of the
/// material runtime), all fog subscribers share one registry entry: each tick
/// advances one clock and writes its elapsed seconds into every subscriber's
/// `fog_time` uniform. Subscribing a hundred materials still costs one tick.
#[derive(Clone)]
pub struct FogTicker {
    inner: Rc<RefCell<FogTickerState>>,
}

impl FogTicker {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(FogTickerState {
                subscribers: Vec::new(),
                clock: Clock::new(),
            })),
        }
    }

    /// Registers the ticker's single tick with the registry.
    pub fn attach(&self, registry: &mut TickRegistry) -> TickId {
        let inner = Rc::clone(&self.inner);
        registry.register(move |dt: f32| {
            let mut state = inner.borrow_mut();
            state.clock.advance(dt);
            let elapsed = state.clock.elapsed();
            for material in &state.subscribers {
                material.set_float("fog_time", elapsed);
            }
        })
    }

    /// Captures a fog-opted material's fog-time uniform into the shared list.
    ///
    /// Subscribing the same instance twice is a no-op.
    pub fn subscribe(&self, material: &SharedMaterial) {
        if !material.is_fog_enabled() {
            eprintln!("[fog] subscribing a material that did not opt into fog");
        }
        let mut state = self.inner.borrow_mut();
        if state.subscribers.iter().any(|m| m.ptr_eq(material)) {
            return;
        }
        state.subscribers.push(material.clone_shared());
    }

    /// Number of subscribed materials.
    pub fn len(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The shared fog clock's elapsed seconds.
    pub fn elapsed(&self) -> f32 {
        self.inner.borrow().clock.elapsed()
    }
}

impl Default for FogTicker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialTemplate;

    #[test]
    fn standard_library_holds_the_four_fog_slots() {
        let library = ChunkLibrary::standard();
        for slot in [
            FOG_VERTEX_DECLARATIONS,
            FOG_VERTEX,
            FOG_FRAGMENT_DECLARATIONS,
            FOG_FRAGMENT,
        ] {
            assert!(library.chunk(slot).is_some(), "missing slot {slot}");
        }
        assert!(!library.is_fog_installed());
        assert!(library.chunk(FOG_FRAGMENT_DECLARATIONS).unwrap().contains("fog_factor"));
        assert!(!library.chunk(FOG_FRAGMENT_DECLARATIONS).unwrap().contains("fog_fbm"));
    }

    #[test]
    fn override_installs_exactly_once() {
        let mut library = ChunkLibrary::standard();
        library.install_fog_override(FogFalloff::Exponential { density: 0.05 });
        library.install_fog_override(FogFalloff::Exponential { density: 0.9 });

        let fragment = library.chunk(FOG_FRAGMENT_DECLARATIONS).unwrap();
        assert_eq!(fragment.matches("fn fog_fbm").count(), 1);
        assert_eq!(fragment.matches("struct FogUniforms").count(), 1);

        // Uniform declarations are not duplicated and the first falloff wins.
        let names: Vec<&str> = library.fog_uniforms().names().collect();
        assert_eq!(names, vec!["fog_color", "fog_time", "fog_density"]);
        assert_eq!(library.fog_uniforms().get_float("fog_density"), Some(0.05));
    }

    #[test]
    fn linear_falloff_declares_near_and_far() {
        let mut library = ChunkLibrary::standard();
        library.install_fog_override(FogFalloff::Linear {
            near: 10.0,
            far: 100.0,
        });

        let names: Vec<&str> = library.fog_uniforms().names().collect();
        assert_eq!(names, vec!["fog_color", "fog_time", "fog_near", "fog_far"]);
        assert!(library.chunk(FOG_FRAGMENT_DECLARATIONS).unwrap().contains("fog.near"));
    }

    #[test]
    fn fog_materials_must_compile_after_the_patch() {
        let library = ChunkLibrary::standard();
        assert_eq!(library.require_fog(), Err(EngineError::ShaderNotPatched));

        let mut library = library;
        library.install_fog_override(FogFalloff::default());
        assert_eq!(library.require_fog(), Ok(()));
    }

    #[test]
    fn includes_splice_and_fog_slots_strip_when_disabled() {
        let library = ChunkLibrary::empty()
            .with_chunk("greeting", "fn greet() -> f32 { return 1.0; }")
            .with_chunk("fog_fragment", "// fog blend");

        let source = "#include <greeting>\n#include <fog_fragment>\nfn fs() {}\n";

        let without = library.resolve_includes(source, false);
        assert!(without.contains("fn greet"));
        assert!(!without.contains("fog blend"));

        let with = library.resolve_includes(source, true);
        assert!(with.contains("fog blend"));
    }

    #[test]
    #[should_panic(expected = "unknown shader chunk")]
    fn unknown_chunk_is_a_programmer_error() {
        ChunkLibrary::empty().resolve_includes("#include <nope>", true);
    }

    #[test]
    fn shared_ticker_advances_every_subscriber_together() {
        let mut registry = TickRegistry::new();
        let template = MaterialTemplate::new("// vs", "// fs").with_fog(true);

        let materials: Vec<SharedMaterial> = (0..3)
            .map(|_| template.clone_instance(&mut registry).unwrap())
            .collect();

        let ticker = FogTicker::new();
        ticker.attach(&mut registry);
        for material in &materials {
            ticker.subscribe(material);
        }
        assert_eq!(ticker.len(), 3);

        // Subscribing a shared alias again does not double-tick it.
        ticker.subscribe(&materials[0].clone_shared());
        assert_eq!(ticker.len(), 3);

        registry.advance(0.0); // activation frame
        registry.advance(0.25);
        registry.advance(0.5);

        for material in &materials {
            assert!((material.get_float("fog_time").unwrap() - 0.75).abs() < 1e-6);
        }
        assert!((ticker.elapsed() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn fog_uniforms_pack_into_the_fixed_layout() {
        let mut library = ChunkLibrary::standard();
        library.install_fog_override(FogFalloff::Linear {
            near: 10.0,
            far: 100.0,
        });

        let mut block = library.fog_uniforms().deep_copy().unwrap();
        block.set_float("fog_time", 2.5);
        block.set_vec3("fog_color", Vec3::new(0.1, 0.2, 0.3));

        let bytes = library.pack_fog_uniforms(&block);
        let floats: &[f32] = bytemuck::cast_slice(&bytes);
        assert_eq!(&floats[0..3], &[0.1, 0.2, 0.3]);
        assert_eq!(floats[3], 2.5);
        assert_eq!(floats[4], 10.0);
        assert_eq!(floats[5], 100.0);
    }
}
