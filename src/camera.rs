//! A simple look-at camera for 3D scenes.

use glam::{Mat4, Vec3};

/// Position, orientation, and projection parameters for one viewpoint.
///
/// Built with the chained constructors and consumed by the pipeline once per
/// frame:
///
/// ```
/// use brume::Camera;
///
/// let camera = Camera::new().at(14.0, 9.0, 14.0).looking_at(0.0, 2.0, 0.0).with_fov(55.0);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_2,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.position = Vec3::new(x, y, z);
        self
    }

    pub fn looking_at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.target = Vec3::new(x, y, z);
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees.to_radians();
        self
    }

    pub fn with_clip(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// World-to-camera transform.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Camera-to-clip transform for the given aspect ratio.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect, self.near, self.far)
    }

    /// Unit vector from the camera toward its target.
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fov_in_radians() {
        let camera = Camera::new().with_fov(90.0);
        assert!((camera.fov - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn forward_points_at_the_target() {
        let camera = Camera::new().at(0.0, 0.0, 10.0).looking_at(0.0, 0.0, 0.0);
        assert!((camera.forward() - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-6);
    }

    #[test]
    fn view_matrix_centers_the_eye() {
        let camera = Camera::new().at(3.0, 4.0, 5.0).looking_at(0.0, 0.0, 0.0);
        let eye = camera.view_matrix().transform_point3(camera.position);
        assert!(eye.length() < 1e-5);
    }
}
