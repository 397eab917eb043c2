//! Drawable geometry: vertex layout, GPU meshes, and transforms.
//!
//! Geometry is generated on the CPU by the `*_geometry` builders and uploaded
//! once into vertex/index buffers. The primitive set covers what the stock
//! scenes place: boxes, ground planes, and cylinders.

use glam::{Mat4, Quat, Vec3};

use crate::gpu::GpuContext;

/// One vertex of a 3D mesh: position, normal, texture coordinates.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3d {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex3d {
    /// Buffer layout for pipelines reading this vertex type:
    /// position (loc 0), normal (loc 1), uv (loc 2), 32 bytes per vertex.
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex3d>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: 24,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    };

    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Geometry uploaded to the GPU, ready for indexed drawing.
pub struct Mesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl Mesh {
    /// Uploads vertex and index data into GPU buffers.
    pub fn new(gpu: &GpuContext, vertices: &[Vertex3d], indices: &[u32]) -> Self {
        use wgpu::util::DeviceExt;

        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Index Buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    /// An axis-aligned box centered at the origin with the given full extents.
    /// Each face has its own vertices for flat shading.
    pub fn cube(gpu: &GpuContext, extents: Vec3) -> Self {
        let (vertices, indices) = cube_geometry(extents);
        Self::new(gpu, &vertices, &indices)
    }

    /// A square ground plane on the XZ axis, normals up, centered at the
    /// origin.
    pub fn plane(gpu: &GpuContext, size: f32) -> Self {
        let (vertices, indices) = plane_geometry(size);
        Self::new(gpu, &vertices, &indices)
    }

    /// A capped cylinder around the Y axis, centered at the origin.
    pub fn cylinder(gpu: &GpuContext, radius: f32, height: f32, segments: u32) -> Self {
        let (vertices, indices) = cylinder_geometry(radius, height, segments);
        Self::new(gpu, &vertices, &indices)
    }
}

pub(crate) fn cube_geometry(extents: Vec3) -> (Vec<Vertex3d>, Vec<u32>) {
    let (hx, hy, hz) = (extents.x * 0.5, extents.y * 0.5, extents.z * 0.5);

    // Four corners per face so each face keeps its own flat normal.
    #[rustfmt::skip]
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        ([0.0, 0.0,  1.0], [[-hx, -hy,  hz], [ hx, -hy,  hz], [ hx,  hy,  hz], [-hx,  hy,  hz]]),
        ([0.0, 0.0, -1.0], [[ hx, -hy, -hz], [-hx, -hy, -hz], [-hx,  hy, -hz], [ hx,  hy, -hz]]),
        ([ 1.0, 0.0, 0.0], [[ hx, -hy,  hz], [ hx, -hy, -hz], [ hx,  hy, -hz], [ hx,  hy,  hz]]),
        ([-1.0, 0.0, 0.0], [[-hx, -hy, -hz], [-hx, -hy,  hz], [-hx,  hy,  hz], [-hx,  hy, -hz]]),
        ([0.0,  1.0, 0.0], [[-hx,  hy,  hz], [ hx,  hy,  hz], [ hx,  hy, -hz], [-hx,  hy, -hz]]),
        ([0.0, -1.0, 0.0], [[-hx, -hy, -hz], [ hx, -hy, -hz], [ hx, -hy,  hz], [-hx, -hy,  hz]]),
    ];
    let face_uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, corners) in faces {
        let base = vertices.len() as u32;
        for (corner, uv) in corners.iter().zip(face_uvs) {
            vertices.push(Vertex3d::new(*corner, normal, uv));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

pub(crate) fn plane_geometry(size: f32) -> (Vec<Vertex3d>, Vec<u32>) {
    let half = size * 0.5;
    let up = [0.0, 1.0, 0.0];
    let vertices = vec![
        Vertex3d::new([-half, 0.0, half], up, [0.0, 0.0]),
        Vertex3d::new([half, 0.0, half], up, [1.0, 0.0]),
        Vertex3d::new([half, 0.0, -half], up, [1.0, 1.0]),
        Vertex3d::new([-half, 0.0, -half], up, [0.0, 1.0]),
    ];
    let indices = vec![0, 1, 2, 0, 2, 3];
    (vertices, indices)
}

pub(crate) fn cylinder_geometry(
    radius: f32,
    height: f32,
    segments: u32,
) -> (Vec<Vertex3d>, Vec<u32>) {
    let segments = segments.max(3);
    let half = height * 0.5;
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    // Side wall: a seam-duplicated ring at each cap, outward normals.
    for seg in 0..=segments {
        let theta = 2.0 * std::f32::consts::PI * seg as f32 / segments as f32;
        let (x, z) = (theta.cos(), theta.sin());
        let u = seg as f32 / segments as f32;
        vertices.push(Vertex3d::new(
            [x * radius, -half, z * radius],
            [x, 0.0, z],
            [u, 0.0],
        ));
        vertices.push(Vertex3d::new(
            [x * radius, half, z * radius],
            [x, 0.0, z],
            [u, 1.0],
        ));
    }
    for seg in 0..segments {
        let base = seg * 2;
        indices.extend_from_slice(&[base, base + 2, base + 1, base + 1, base + 2, base + 3]);
    }

    // Caps: a center vertex plus their own ring with axial normals.
    for sign in [1.0f32, -1.0] {
        let normal = [0.0, sign, 0.0];
        let center = vertices.len() as u32;
        vertices.push(Vertex3d::new([0.0, sign * half, 0.0], normal, [0.5, 0.5]));
        for seg in 0..=segments {
            let theta = 2.0 * std::f32::consts::PI * seg as f32 / segments as f32;
            let (x, z) = (theta.cos(), theta.sin());
            vertices.push(Vertex3d::new(
                [x * radius, sign * half, z * radius],
                normal,
                [0.5 + x * 0.5, 0.5 + z * 0.5],
            ));
        }
        for seg in 0..segments {
            let a = center + 1 + seg;
            let b = center + 2 + seg;
            // Top cap winds counter-clockwise seen from above, bottom from
            // below.
            if sign > 0.0 {
                indices.extend_from_slice(&[center, b, a]);
            } else {
                indices.extend_from_slice(&[center, a, b]);
            }
        }
    }

    (vertices, indices)
}

/// Position, rotation, and scale of one drawable.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self::new().position(position)
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    /// The object-to-world matrix.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_indices_in_bounds(vertices: &[Vertex3d], indices: &[u32]) {
        for index in indices {
            assert!((*index as usize) < vertices.len());
        }
    }

    #[test]
    fn cube_spans_the_requested_extents() {
        let (vertices, indices) = cube_geometry(Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        assert_indices_in_bounds(&vertices, &indices);

        let max_y = vertices
            .iter()
            .map(|v| v.position[1])
            .fold(f32::MIN, f32::max);
        assert!((max_y - 2.0).abs() < 1e-6);
    }

    #[test]
    fn plane_lies_flat_with_up_normals() {
        let (vertices, indices) = plane_geometry(10.0);
        assert_eq!(indices.len(), 6);
        assert_indices_in_bounds(&vertices, &indices);
        for v in &vertices {
            assert_eq!(v.position[1], 0.0);
            assert_eq!(v.normal, [0.0, 1.0, 0.0]);
        }
    }

    #[test]
    fn cylinder_normals_are_unit_length() {
        let (vertices, indices) = cylinder_geometry(1.5, 4.0, 24);
        assert_indices_in_bounds(&vertices, &indices);
        for v in &vertices {
            let n = Vec3::from_array(v.normal);
            assert!((n.length() - 1.0).abs() < 1e-5);
            assert!(v.position[1].abs() <= 2.0 + 1e-6);
        }
    }

    #[test]
    fn cylinder_clamps_degenerate_segment_counts() {
        let (_, indices) = cylinder_geometry(1.0, 1.0, 1);
        // Three wall segments plus two caps of three triangles each.
        assert_eq!(indices.len(), (3 * 6) + 2 * (3 * 3));
    }

    #[test]
    fn transform_composes_scale_then_translation() {
        let transform = Transform::from_position(Vec3::new(0.0, 5.0, 0.0)).uniform_scale(2.0);
        let p = transform.matrix().transform_point3(Vec3::ONE);
        assert!((p - Vec3::new(2.0, 7.0, 2.0)).length() < 1e-5);
    }
}
