//! The procedural material runtime.
//!
//! A [`MaterialTemplate`] is a plain descriptor: vertex and fragment WGSL
//! source, a typed uniform block, blend/depth state, and an optional fog
//! opt-in. Templates are never drawn. Drawables hold a [`SharedMaterial`]
//! produced by [`MaterialTemplate::clone_instance`], which deep-copies the
//! uniform values and owns an independent clock, or by
//! [`SharedMaterial::clone_shared`], which intentionally aliases one instance
//! across several drawables.
//!
//! # Uniform contract
//!
//! Material WGSL declares its uniforms as a struct at `@group(2) @binding(0)`,
//! with fields in the same order the template declares them via
//! [`with_uniform`](MaterialTemplate::with_uniform). The block is packed with
//! WGSL alignment rules, so the two orderings must match. Fog uniforms are not
//! part of this struct; they arrive at group 3 through the chunk library (see
//! [`ChunkLibrary`](crate::ChunkLibrary)).
//!
//! # Time-driven animation
//!
//! A template created with [`with_time_uniform`](MaterialTemplate::with_time_uniform)
//! gives every clone its own tick in the [`TickRegistry`](crate::TickRegistry):
//! the clone's clock advances once per frame and its elapsed seconds are
//! written into the designated uniform. The clock starts at the clone's
//! creation and can be rewound with [`SharedMaterial::reset_clock`].

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use glam::{Vec2, Vec3};

use crate::chunks::ChunkLibrary;
use crate::clock::{Clock, TickId, TickRegistry};
use crate::color::Color;
use crate::error::EngineError;
use crate::gpu::GpuContext;
use crate::mesh::Vertex3d;

/// A typed uniform value.
///
/// Every kind except `Handle` has a defined deep-copy rule. `Handle` exists
/// for live resources (samplers, views, host objects) that can be shared but
/// never duplicated; cloning a material whose block contains one fails with
/// [`EngineError::UncloneableState`].
#[derive(Clone, Debug)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Color(Color),
    /// A live handle with no deep-copy rule.
    Handle(Rc<dyn Any>),
}

impl UniformValue {
    /// Copies the value per its kind's rule; `Handle` has none.
    fn deep_copy(&self, name: &str) -> Result<UniformValue, EngineError> {
        match self {
            Self::Float(v) => Ok(Self::Float(*v)),
            Self::Vec2(v) => Ok(Self::Vec2(*v)),
            Self::Vec3(v) => Ok(Self::Vec3(*v)),
            Self::Color(v) => Ok(Self::Color(*v)),
            Self::Handle(_) => Err(EngineError::UncloneableState {
                uniform: name.to_string(),
            }),
        }
    }

    /// WGSL alignment of this kind in a uniform struct.
    fn alignment(&self) -> usize {
        match self {
            Self::Float(_) => 4,
            Self::Vec2(_) => 8,
            Self::Vec3(_) | Self::Color(_) => 16,
            Self::Handle(_) => 0,
        }
    }

    fn byte_len(&self) -> usize {
        match self {
            Self::Float(_) => 4,
            Self::Vec2(_) => 8,
            Self::Vec3(_) => 12,
            Self::Color(_) => 16,
            Self::Handle(_) => 0,
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::Float(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
            Self::Vec2(v) => out.extend_from_slice(bytemuck::bytes_of(&v.to_array())),
            Self::Vec3(v) => out.extend_from_slice(bytemuck::bytes_of(&v.to_array())),
            Self::Color(v) => out.extend_from_slice(bytemuck::bytes_of(&v.to_array())),
            Self::Handle(_) => {}
        }
    }
}

/// An ordered `name -> value` uniform map.
///
/// Iteration order is declaration order, which is also the GPU packing order.
/// The key set is stable across deep copies; only values diverge.
#[derive(Clone, Debug, Default)]
pub struct UniformBlock {
    entries: Vec<(String, UniformValue)>,
}

impl UniformBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a uniform, inserting it at the end if the name is new.
    pub fn set(&mut self, name: &str, value: UniformValue) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.set(name, UniformValue::Float(value));
    }

    pub fn set_vec3(&mut self, name: &str, value: Vec3) {
        self.set(name, UniformValue::Vec3(value));
    }

    pub fn set_color(&mut self, name: &str, value: Color) {
        self.set(name, UniformValue::Color(value));
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_float(&self, name: &str) -> Option<f32> {
        match self.get(name) {
            Some(UniformValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deep-copies every value; fails on the first kind without a copy rule.
    pub fn deep_copy(&self) -> Result<UniformBlock, EngineError> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            entries.push((name.clone(), value.deep_copy(name)?));
        }
        Ok(UniformBlock { entries })
    }

    /// Adds defaults for any name not already present, preserving order.
    pub fn merge_defaults(&mut self, defaults: &UniformBlock) {
        for (name, value) in &defaults.entries {
            if self.get(name).is_none() {
                self.entries.push((name.clone(), value.clone()));
            }
        }
    }

    /// Packed size of the GPU-visible entries, per WGSL uniform layout rules,
    /// rounded up to a 16-byte multiple. Entries named `fog_*` and handles are
    /// excluded (fog data lives in its own binding).
    pub fn byte_size(&self) -> usize {
        let mut cursor = 0usize;
        for (name, value) in self.gpu_entries() {
            let _ = name;
            cursor = align_up(cursor, value.alignment());
            cursor += value.byte_len();
        }
        align_up(cursor.max(4), 16)
    }

    /// Writes the packed buffer image for the GPU-visible entries.
    pub fn write_packed(&self, out: &mut Vec<u8>) {
        out.clear();
        for (_, value) in self.gpu_entries() {
            while out.len() % value.alignment() != 0 {
                out.push(0);
            }
            value.write_to(out);
        }
        while out.len() < self.byte_size() {
            out.push(0);
        }
    }

    fn gpu_entries(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.entries.iter().filter_map(|(n, v)| {
            if n.starts_with("fog_") || matches!(v, UniformValue::Handle(_)) {
                None
            } else {
                Some((n.as_str(), v))
            }
        })
    }
}

fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// How a material's output combines with the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    /// Replace the destination.
    #[default]
    Opaque,
    /// Standard source-over alpha blending.
    Alpha,
    /// Source added onto the destination.
    Additive,
}

impl BlendMode {
    pub(crate) fn state(self) -> Option<wgpu::BlendState> {
        match self {
            Self::Opaque => None,
            Self::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
            Self::Additive => Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            }),
        }
    }
}

/// A procedural material descriptor.
///
/// Built once at startup, then cloned per drawable use. The built-in
/// constructors ([`phong`](Self::phong), [`rings`](Self::rings),
/// [`extrusion`](Self::extrusion)) cover the stock shaders; custom materials
/// supply their own WGSL through [`new`](Self::new).
#[derive(Clone, Debug)]
pub struct MaterialTemplate {
    vertex_source: String,
    fragment_source: String,
    uniforms: UniformBlock,
    blend: BlendMode,
    depth_write: bool,
    double_sided: bool,
    fog: bool,
    time_uniform: Option<String>,
}

impl MaterialTemplate {
    /// Creates a template from vertex and fragment WGSL source.
    ///
    /// Sources may use `#include <slot>` lines resolved against the chunk
    /// library at compile time; entry points must be named `vs` and `fs`.
    pub fn new(vertex_source: impl Into<String>, fragment_source: impl Into<String>) -> Self {
        Self {
            vertex_source: vertex_source.into(),
            fragment_source: fragment_source.into(),
            uniforms: UniformBlock::new(),
            blend: BlendMode::Opaque,
            depth_write: true,
            double_sided: false,
            fog: false,
            time_uniform: None,
        }
    }

    /// Declares a uniform with its default value. Declaration order is the
    /// GPU struct field order.
    pub fn with_uniform(mut self, name: &str, value: UniformValue) -> Self {
        self.uniforms.set(name, value);
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_depth_write(mut self, depth_write: bool) -> Self {
        self.depth_write = depth_write;
        self
    }

    pub fn with_double_sided(mut self, double_sided: bool) -> Self {
        self.double_sided = double_sided;
        self
    }

    /// Opts the material into the globally injected fog term.
    pub fn with_fog(mut self, fog: bool) -> Self {
        self.fog = fog;
        self
    }

    /// Marks `name` as the designated time uniform: every clone gets its own
    /// per-frame tick writing its clock's elapsed seconds into it.
    pub fn with_time_uniform(mut self, name: &str) -> Self {
        if self.uniforms.get(name).is_none() {
            self.uniforms.set_float(name, 0.0);
        }
        self.time_uniform = Some(name.to_string());
        self
    }

    /// Direct access to the template's default uniform values.
    pub fn uniforms_mut(&mut self) -> &mut UniformBlock {
        &mut self.uniforms
    }

    pub fn uniforms(&self) -> &UniformBlock {
        &self.uniforms
    }

    pub fn is_fog_enabled(&self) -> bool {
        self.fog
    }

    /// The lit base material with a solid color, fog-capable.
    pub fn phong(color: Color) -> Self {
        Self::new(
            include_str!("shaders/phong_vs.wgsl"),
            include_str!("shaders/phong_fs.wgsl"),
        )
        .with_uniform("u_color", UniformValue::Color(color))
    }

    /// The animated ring-stripe shader used on cylinders, with a pulse
    /// uniform suitable for [`PulseTimer`](crate::PulseTimer) driving.
    pub fn rings() -> Self {
        Self::new(
            include_str!("shaders/rings_vs.wgsl"),
            include_str!("shaders/rings_fs.wgsl"),
        )
        .with_uniform("u_color", UniformValue::Color(Color::rgb(0.8, 0.0, 0.2)))
        .with_uniform("u_half_stripe_width", UniformValue::Float(0.25))
        .with_uniform("u_intensity", UniformValue::Float(1.0))
        .with_uniform("u_pulse", UniformValue::Float(0.0))
        .with_time_uniform("u_time")
        .with_blend(BlendMode::Alpha)
        .with_depth_write(false)
        .with_double_sided(true)
    }

    /// The height-cutoff shader: fragments above `u_y` are discarded.
    pub fn extrusion(color: Color) -> Self {
        Self::new(
            include_str!("shaders/extrusion_vs.wgsl"),
            include_str!("shaders/extrusion_fs.wgsl"),
        )
        .with_uniform("u_y", UniformValue::Float(3.0))
        .with_uniform("u_color", UniformValue::Color(color))
    }

    /// Creates an independent instance: deep-copied uniforms, its own clock,
    /// and (for time-driven templates) a freshly registered per-clone tick.
    ///
    /// Fails with [`EngineError::UncloneableState`] if any uniform value has
    /// no deep-copy rule.
    pub fn clone_instance(
        &self,
        registry: &mut TickRegistry,
    ) -> Result<SharedMaterial, EngineError> {
        let uniforms = self.uniforms.deep_copy()?;
        let instance = Rc::new(MaterialInstance {
            vertex_source: self.vertex_source.clone(),
            fragment_source: self.fragment_source.clone(),
            uniforms: RefCell::new(uniforms),
            clock: RefCell::new(Clock::new()),
            blend: self.blend,
            depth_write: self.depth_write,
            double_sided: self.double_sided,
            fog: self.fog,
            compiled: RefCell::new(None),
        });

        let tick = self.time_uniform.as_ref().map(|name| {
            let target = Rc::clone(&instance);
            let name = name.clone();
            registry.register(move |dt: f32| {
                let mut clock = target.clock.borrow_mut();
                clock.advance(dt);
                target.uniforms.borrow_mut().set_float(&name, clock.elapsed());
            })
        });

        Ok(SharedMaterial {
            inner: instance,
            tick,
        })
    }
}

/// One live material: deep-copied uniform state, an independent clock,
/// and lazily compiled GPU state.
pub struct MaterialInstance {
    vertex_source: String,
    fragment_source: String,
    uniforms: RefCell<UniformBlock>,
    clock: RefCell<Clock>,
    blend: BlendMode,
    depth_write: bool,
    double_sided: bool,
    fog: bool,
    compiled: RefCell<Option<CompiledMaterial>>,
}

/// A shared handle to a [`MaterialInstance`].
///
/// Produced by [`MaterialTemplate::clone_instance`]. Handles from
/// [`clone_shared`](Self::clone_shared) alias the same instance — mutating
/// uniforms through one is visible through all, which is how several drawables
/// share one animated material.
#[derive(Clone)]
pub struct SharedMaterial {
    inner: Rc<MaterialInstance>,
    tick: Option<TickId>,
}

impl SharedMaterial {
    /// Another handle to the same instance (shared uniforms, shared clock).
    pub fn clone_shared(&self) -> SharedMaterial {
        SharedMaterial {
            inner: Rc::clone(&self.inner),
            tick: self.tick,
        }
    }

    /// Unregisters this instance's animation tick.
    ///
    /// Call when the last drawable using the material is discarded; the
    /// registry otherwise keeps ticking it forever. Safe to call more than
    /// once. [`Scene::despawn`](crate::Scene::despawn) does not do this
    /// implicitly, because shared handles may still be in use elsewhere.
    pub fn release(&self, registry: &mut TickRegistry) {
        if let Some(id) = self.tick {
            registry.unregister(id);
        }
    }

    /// Rewinds this instance's clock; the time uniform restarts from zero.
    pub fn reset_clock(&self) {
        self.inner.clock.borrow_mut().reset();
    }

    pub fn set_float(&self, name: &str, value: f32) {
        self.inner.uniforms.borrow_mut().set_float(name, value);
    }

    pub fn set_vec3(&self, name: &str, value: Vec3) {
        self.inner.uniforms.borrow_mut().set_vec3(name, value);
    }

    pub fn set_color(&self, name: &str, value: Color) {
        self.inner.uniforms.borrow_mut().set_color(name, value);
    }

    pub fn get_float(&self, name: &str) -> Option<f32> {
        self.inner.uniforms.borrow().get_float(name)
    }

    pub fn is_fog_enabled(&self) -> bool {
        self.inner.fog
    }

    /// Runs `f` with the instance's uniform block borrowed mutably.
    pub fn with_uniforms<R>(&self, f: impl FnOnce(&mut UniformBlock) -> R) -> R {
        f(&mut self.inner.uniforms.borrow_mut())
    }

    pub(crate) fn instance(&self) -> &MaterialInstance {
        &self.inner
    }

    pub(crate) fn is_blended(&self) -> bool {
        self.inner.blend != BlendMode::Opaque
    }

    pub(crate) fn ptr_eq(&self, other: &SharedMaterial) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Formats and shared bind group layouts a material pipeline is built against.
/// Owned by the scene pass and handed to materials at compile time.
pub struct PipelineTargets<'a> {
    pub frame_layout: &'a wgpu::BindGroupLayout,
    pub model_layout: &'a wgpu::BindGroupLayout,
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
}

/// GPU-side state for one compiled material instance.
struct CompiledMaterial {
    pipeline: wgpu::RenderPipeline,
    material_buffer: wgpu::Buffer,
    material_bind_group: wgpu::BindGroup,
    fog: Option<(wgpu::Buffer, wgpu::BindGroup)>,
    scratch: RefCell<Vec<u8>>,
}

impl MaterialInstance {
    /// Compiles the instance's shaders and pipeline on first use.
    ///
    /// Fog-opted instances merge the library's fog uniform defaults into
    /// their block here, and fail with [`EngineError::ShaderNotPatched`] if
    /// the library's fog override has not been installed yet.
    pub(crate) fn ensure_compiled(
        &self,
        gpu: &GpuContext,
        chunks: &ChunkLibrary,
        targets: &PipelineTargets,
    ) -> Result<(), EngineError> {
        if self.compiled.borrow().is_some() {
            return Ok(());
        }
        if self.fog && !chunks.is_fog_installed() {
            return Err(EngineError::ShaderNotPatched);
        }
        if self.fog {
            self.uniforms
                .borrow_mut()
                .merge_defaults(chunks.fog_uniforms());
        }

        let device = &gpu.device;
        let vertex_source = chunks.resolve_includes(&self.vertex_source, self.fog);
        let fragment_source = chunks.resolve_includes(&self.fragment_source, self.fog);

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Material Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(vertex_source.into()),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Material Fragment Shader"),
            source: wgpu::ShaderSource::Wgsl(fragment_source.into()),
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Uniform Layout"),
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
        });

        let material_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Material Uniforms"),
            size: self.uniforms.borrow().byte_size() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let material_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material Bind Group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: material_buffer.as_entire_binding(),
            }],
        });

        let fog = if self.fog {
            let fog_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Fog Uniforms"),
                size: crate::chunks::FOG_UNIFORM_BYTES as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let fog_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Fog Bind Group"),
                layout: &uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: fog_buffer.as_entire_binding(),
                }],
            });
            Some((fog_buffer, fog_bind_group))
        } else {
            None
        };

        let mut bind_group_layouts = vec![
            targets.frame_layout,
            targets.model_layout,
            &uniform_layout,
        ];
        if self.fog {
            bind_group_layouts.push(&uniform_layout);
        }

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Material Pipeline Layout"),
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Material Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("vs"),
                buffers: &[Vertex3d::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: targets.color_format,
                    blend: self.blend.state(),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: if self.double_sided {
                    None
                } else {
                    Some(wgpu::Face::Back)
                },
                front_face: wgpu::FrontFace::Ccw,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: targets.depth_format,
                depth_write_enabled: self.depth_write,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        *self.compiled.borrow_mut() = Some(CompiledMaterial {
            pipeline,
            material_buffer,
            material_bind_group,
            fog,
            scratch: RefCell::new(Vec::new()),
        });
        Ok(())
    }

    /// Uploads the current uniform values. Call once per frame before drawing.
    pub(crate) fn upload(&self, gpu: &GpuContext, chunks: &ChunkLibrary) {
        let compiled = self.compiled.borrow();
        let Some(compiled) = compiled.as_ref() else {
            return;
        };
        let uniforms = self.uniforms.borrow();

        let mut scratch = compiled.scratch.borrow_mut();
        uniforms.write_packed(&mut scratch);
        gpu.queue
            .write_buffer(&compiled.material_buffer, 0, &scratch);

        if let Some((fog_buffer, _)) = &compiled.fog {
            let packed = chunks.pack_fog_uniforms(&uniforms);
            gpu.queue.write_buffer(fog_buffer, 0, &packed);
        }
    }

    /// Binds the pipeline and material groups; the caller has already bound
    /// the frame (0) and model (1) groups.
    pub(crate) fn bind(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        let compiled = self.compiled.borrow();
        let Some(compiled) = compiled.as_ref() else {
            return;
        };
        render_pass.set_pipeline(&compiled.pipeline);
        render_pass.set_bind_group(2, &compiled.material_bind_group, &[]);
        if let Some((_, fog_bind_group)) = &compiled.fog {
            render_pass.set_bind_group(3, fog_bind_group, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::PulseTimer;

    fn plain_template() -> MaterialTemplate {
        MaterialTemplate::new("// vs", "// fs")
            .with_uniform("u_y", UniformValue::Float(3.0))
            .with_uniform("u_color", UniformValue::Color(Color::WHITE))
    }

    #[test]
    fn clones_do_not_share_uniform_storage() {
        let mut registry = TickRegistry::new();
        let template = plain_template();

        let c1 = template.clone_instance(&mut registry).unwrap();
        let c2 = template.clone_instance(&mut registry).unwrap();

        c1.set_float("u_y", 9.0);
        assert_eq!(c1.get_float("u_y"), Some(9.0));
        assert_eq!(c2.get_float("u_y"), Some(3.0));
        assert_eq!(template.uniforms().get_float("u_y"), Some(3.0));
    }

    #[test]
    fn template_mutation_does_not_reach_existing_clones() {
        let mut registry = TickRegistry::new();
        let mut template = plain_template();

        let clone = template.clone_instance(&mut registry).unwrap();
        template.uniforms_mut().set_float("u_y", 100.0);

        assert_eq!(clone.get_float("u_y"), Some(3.0));
    }

    #[test]
    fn key_set_is_stable_across_clone() {
        let mut registry = TickRegistry::new();
        let template = plain_template();
        let clone = template.clone_instance(&mut registry).unwrap();

        let names: Vec<String> = clone.with_uniforms(|u| {
            u.names().map(|n| n.to_string()).collect()
        });
        assert_eq!(names, vec!["u_y", "u_color"]);
    }

    #[test]
    fn handle_uniform_is_uncloneable() {
        let mut registry = TickRegistry::new();
        let template = plain_template()
            .with_uniform("u_lookup", UniformValue::Handle(Rc::new(42u32)));

        let err = template.clone_instance(&mut registry).unwrap_err();
        assert_eq!(
            err,
            EngineError::UncloneableState {
                uniform: "u_lookup".to_string()
            }
        );
    }

    #[test]
    fn time_uniform_follows_the_clone_clock() {
        let mut registry = TickRegistry::new();
        let template = MaterialTemplate::new("// vs", "// fs").with_time_uniform("u_time");

        let clone = template.clone_instance(&mut registry).unwrap();

        // Registered this frame: no tick yet.
        registry.advance(1.0);
        assert_eq!(clone.get_float("u_time"), Some(0.0));

        registry.advance(0.5);
        registry.advance(0.25);
        assert!((clone.get_float("u_time").unwrap() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn clone_clocks_are_independent() {
        let mut registry = TickRegistry::new();
        let template = MaterialTemplate::new("// vs", "// fs").with_time_uniform("u_time");

        let early = template.clone_instance(&mut registry).unwrap();
        registry.advance(0.0);
        registry.advance(1.0);

        let late = template.clone_instance(&mut registry).unwrap();
        registry.advance(0.0); // activates `late`, ticks `early`
        registry.advance(1.0);

        assert!((early.get_float("u_time").unwrap() - 2.0).abs() < 1e-6);
        assert!((late.get_float("u_time").unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn reset_clock_restarts_the_time_uniform() {
        let mut registry = TickRegistry::new();
        let template = MaterialTemplate::new("// vs", "// fs").with_time_uniform("u_time");
        let clone = template.clone_instance(&mut registry).unwrap();

        registry.advance(0.0);
        registry.advance(2.0);
        clone.reset_clock();
        registry.advance(0.5);
        assert!((clone.get_float("u_time").unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn release_stops_the_animation_tick() {
        let mut registry = TickRegistry::new();
        let template = MaterialTemplate::new("// vs", "// fs").with_time_uniform("u_time");
        let clone = template.clone_instance(&mut registry).unwrap();

        registry.advance(0.0);
        registry.advance(1.0);
        clone.release(&mut registry);
        registry.advance(1.0); // removal staged, last tick
        registry.advance(1.0);
        registry.advance(1.0);

        assert!((clone.get_float("u_time").unwrap() - 2.0).abs() < 1e-6);
        clone.release(&mut registry); // idempotent
    }

    #[test]
    fn shared_handles_alias_one_instance() {
        let mut registry = TickRegistry::new();
        let template = plain_template();
        let a = template.clone_instance(&mut registry).unwrap();
        let b = a.clone_shared();

        b.set_float("u_y", 7.0);
        assert_eq!(a.get_float("u_y"), Some(7.0));
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn pulse_drives_a_material_uniform() {
        let mut registry = TickRegistry::new();
        let template = MaterialTemplate::rings();
        let material = template.clone_instance(&mut registry).unwrap();

        let pulse = Rc::new(RefCell::new(PulseTimer::with_interval(0.7, 0.1)));
        pulse.borrow_mut().trigger();
        material.set_float("u_pulse", 1.0);

        let mat = material.clone_shared();
        let timer = Rc::clone(&pulse);
        registry.register(move |dt: f32| {
            let mut timer = timer.borrow_mut();
            timer.advance(dt);
            mat.set_float("u_pulse", timer.value());
        });

        registry.advance(0.0); // activation frame
        registry.advance(0.1);
        registry.advance(0.1);
        registry.advance(0.1);

        let value = material.get_float("u_pulse").unwrap();
        assert!((value - 0.7f32.powi(3)).abs() < 1e-6);

        pulse.borrow_mut().stop();
        registry.advance(0.5);
        assert!((material.get_float("u_pulse").unwrap() - value).abs() < 1e-6);
    }

    #[test]
    fn packing_follows_wgsl_alignment() {
        let mut block = UniformBlock::new();
        block.set_float("a", 1.0);
        block.set_vec3("b", Vec3::ONE);
        block.set_float("c", 2.0);
        // a @ 0, b @ 16 (12 bytes), c @ 28, struct rounded to 32.
        assert_eq!(block.byte_size(), 32);

        let mut packed = Vec::new();
        block.write_packed(&mut packed);
        assert_eq!(packed.len(), 32);
        let floats: &[f32] = bytemuck::cast_slice(&packed);
        assert_eq!(floats[0], 1.0);
        assert_eq!(&floats[4..7], &[1.0, 1.0, 1.0]);
        assert_eq!(floats[7], 2.0);
    }

    #[test]
    fn packing_skips_fog_and_handle_entries() {
        let mut block = UniformBlock::new();
        block.set_float("u_strength", 2.5);
        block.set_float("fog_time", 9.0);
        block.set("u_host", UniformValue::Handle(Rc::new(())));
        assert_eq!(block.byte_size(), 16);
    }
}
