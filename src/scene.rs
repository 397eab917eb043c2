//! The scene-graph handle: an entity world of drawables and lights.
//!
//! The renderer consumes a [`Scene`] purely through queries — it draws every
//! entity carrying a [`Transform`](crate::Transform) and a [`Drawable`], lights
//! the frame from the [`Light`] entities, and silhouettes the ones marked
//! [`Outlined`]. What gets placed where is the caller's business; this module
//! only provides the storage and the add/remove surface.

use glam::Vec3;
use hecs::{Entity, World};

use crate::clock::TickRegistry;
use crate::material::SharedMaterial;
use crate::mesh::{Mesh, Transform};

/// Type-safe handle to a mesh registered with a scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshId(pub(crate) usize);

/// Component attaching geometry and a material to an entity.
pub struct Drawable {
    pub mesh: MeshId,
    pub material: SharedMaterial,
}

/// Marker component: the outline pass silhouettes this entity.
pub struct Outlined;

/// A scene light. One directional light and an ambient term light the frame;
/// extra lights of the same kind accumulate into those two.
#[derive(Clone, Copy, Debug)]
pub enum Light {
    Directional { direction: Vec3, color: Vec3 },
    Ambient { color: Vec3 },
}

/// The scene: mesh storage plus an entity world.
pub struct Scene {
    pub world: World,
    meshes: Vec<Mesh>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            meshes: Vec::new(),
        }
    }

    /// Registers a mesh for use by drawables. Meshes live as long as the scene.
    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        let idx = self.meshes.len();
        self.meshes.push(mesh);
        MeshId(idx)
    }

    pub(crate) fn mesh(&self, id: MeshId) -> &Mesh {
        &self.meshes[id.0]
    }

    /// Spawns a drawable entity.
    pub fn add_drawable(
        &mut self,
        mesh: MeshId,
        transform: Transform,
        material: SharedMaterial,
    ) -> Entity {
        self.world.spawn((transform, Drawable { mesh, material }))
    }

    /// Spawns a light entity.
    pub fn add_light(&mut self, light: Light) -> Entity {
        self.world.spawn((light,))
    }

    /// Adds or removes the [`Outlined`] marker.
    pub fn set_outlined(&mut self, entity: Entity, outlined: bool) {
        if outlined {
            let _ = self.world.insert_one(entity, Outlined);
        } else {
            let _ = self.world.remove_one::<Outlined>(entity);
        }
    }

    /// Removes an entity from the scene.
    ///
    /// The entity's material (if any) keeps its animation tick: shared
    /// handles from `clone_shared` may still be driving other drawables.
    /// Call [`SharedMaterial::release`] yourself — or use
    /// [`despawn_and_release`](Self::despawn_and_release) when the material
    /// is known to have no other users.
    pub fn despawn(&mut self, entity: Entity) {
        if self.world.despawn(entity).is_err() {
            eprintln!("[scene] despawn of unknown entity ignored");
        }
    }

    /// Removes an entity and unregisters its material's animation tick.
    pub fn despawn_and_release(&mut self, entity: Entity, registry: &mut TickRegistry) {
        if let Ok(drawable) = self.world.get::<&Drawable>(entity) {
            drawable.material.release(registry);
        }
        self.despawn(entity);
    }

    /// The frame's effective lighting: accumulated directional direction and
    /// color plus the accumulated ambient term.
    pub(crate) fn lighting(&self) -> (Vec3, Vec3, Vec3) {
        let mut direction = Vec3::new(0.0, -1.0, 0.0);
        let mut color = Vec3::ZERO;
        let mut ambient = Vec3::ZERO;
        for (_, light) in self.world.query::<&Light>().iter() {
            match light {
                Light::Directional {
                    direction: d,
                    color: c,
                } => {
                    direction = d.normalize_or_zero();
                    color += *c;
                }
                Light::Ambient { color: c } => ambient += *c,
            }
        }
        (direction, color, ambient)
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialTemplate;

    #[test]
    fn lighting_accumulates_by_kind() {
        let mut scene = Scene::new();
        scene.add_light(Light::Directional {
            direction: Vec3::new(0.0, -2.0, 0.0),
            color: Vec3::new(1.0, 1.0, 1.0),
        });
        scene.add_light(Light::Ambient {
            color: Vec3::splat(0.1),
        });
        scene.add_light(Light::Ambient {
            color: Vec3::splat(0.05),
        });

        let (direction, color, ambient) = scene.lighting();
        assert!((direction - Vec3::new(0.0, -1.0, 0.0)).length() < 1e-6);
        assert_eq!(color, Vec3::ONE);
        assert!((ambient - Vec3::splat(0.15)).length() < 1e-6);
    }

    #[test]
    fn despawn_and_release_stops_the_material_tick() {
        let mut registry = TickRegistry::new();
        let mut scene = Scene::new();
        let template = MaterialTemplate::new("// vs", "// fs").with_time_uniform("u_time");
        let material = template.clone_instance(&mut registry).unwrap();

        // A drawable with no mesh registered is fine for this test; MeshId is
        // only dereferenced at draw time.
        let entity = scene.add_drawable(MeshId(0), Transform::new(), material.clone_shared());

        registry.advance(0.0);
        registry.advance(1.0);
        scene.despawn_and_release(entity, &mut registry);
        registry.advance(1.0); // removal staged
        registry.advance(1.0);

        assert!((material.get_float("u_time").unwrap() - 2.0).abs() < 1e-6);
        assert!(!scene.world.contains(entity));
    }

    #[test]
    fn outlined_marker_toggles() {
        let mut registry = TickRegistry::new();
        let mut scene = Scene::new();
        let template = MaterialTemplate::new("// vs", "// fs");
        let material = template.clone_instance(&mut registry).unwrap();
        let entity = scene.add_drawable(MeshId(0), Transform::new(), material);

        scene.set_outlined(entity, true);
        assert!(scene.world.get::<&Outlined>(entity).is_ok());
        scene.set_outlined(entity, false);
        assert!(scene.world.get::<&Outlined>(entity).is_err());
    }
}
