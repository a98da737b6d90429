//! Camera parameters recorded for a scene
//!
//! Values are stored exactly as the host supplies them; no projection is
//! derived and nothing is validated (a near plane beyond the far plane is the
//! backend's problem).

use crate::foundation::math::{self, Mat4, Vec3};

/// Camera used to reconstruct world positions from the depth buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Local-to-world transform
    pub transform: Mat4,
    /// World-to-view matrix
    pub view: Mat4,
    /// View-to-clip matrix
    pub projection: Mat4,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
    /// Vertical field of view in degrees
    pub fov: f32,
}

impl Camera {
    /// Record camera parameters verbatim
    pub fn new(transform: Mat4, view: Mat4, projection: Mat4, near: f32, far: f32, fov: f32) -> Self {
        Self { transform, view, projection, near, far, fov }
    }

    /// World-space camera position
    pub fn position(&self) -> Vec3 {
        math::translation(&self.transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_are_not_validated() {
        // Inverted clip planes are kept as given
        let camera = Camera::new(Mat4::identity(), Mat4::identity(), Mat4::identity(), 100.0, 0.1, 60.0);
        assert_eq!(camera.near, 100.0);
        assert_eq!(camera.far, 0.1);
    }

    #[test]
    fn test_position_from_transform() {
        let transform = Mat4::new_translation(&Vec3::new(0.0, 5.0, -2.0));
        let camera = Camera::new(transform, Mat4::identity(), Mat4::identity(), 0.1, 10.0, 60.0);
        assert_eq!(camera.position(), Vec3::new(0.0, 5.0, -2.0));
    }
}
