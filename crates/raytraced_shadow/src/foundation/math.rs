//! Math utilities and types
//!
//! Provides the matrix and vector types used by scene descriptions. Transforms
//! are column-major `nalgebra` matrices with the translation in the fourth
//! column, matching what host engines hand over as local-to-world matrices.

pub use nalgebra::{Matrix4, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Extract the world-space position stored in a transform's translation column
pub fn translation(transform: &Mat4) -> Vec3 {
    Vec3::new(transform[(0, 3)], transform[(1, 3)], transform[(2, 3)])
}

/// Extract the normalized +Z (forward) axis of a transform
///
/// Returns +Z when the transform collapses the axis to zero length.
pub fn forward(transform: &Mat4) -> Vec3 {
    let axis = Vec3::new(transform[(0, 2)], transform[(1, 2)], transform[(2, 2)]);
    axis.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::z)
}

/// Math utility functions
pub mod utils {
    /// Clamp a blend shape weight into the activation range
    pub fn saturate(value: f32) -> f32 {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_translation_reads_fourth_column() {
        let transform = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(translation(&transform), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_forward_follows_rotation() {
        let rotation = Mat4::from_axis_angle(&Vector3::y_axis(), std::f32::consts::FRAC_PI_2);
        let dir = forward(&rotation);
        assert_relative_eq!(dir, Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_forward_of_degenerate_matrix_defaults_to_z() {
        assert_relative_eq!(forward(&Mat4::zeros()), Vec3::z());
    }
}
