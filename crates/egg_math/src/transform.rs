// Transform utilities for Mat4
//
// Extends glam::Mat4 with the pieces the egg transcoder needs beyond
// transform_point3()/transform_vector3(): rotation-only application
// for normals, and a column-major scalar walk for serialization.

use glam::{Mat3, Mat4, Vec3};

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Transform a direction by the rotation part of the matrix only.
    ///
    /// Scale and translation are stripped, which is what normal vectors
    /// want when the object matrix carries non-uniform scale.
    fn rotate_vector3(&self, vector: Vec3) -> Vec3;

    /// The sixteen scalars of the matrix in column-major order, one
    /// column after another.
    fn columns(&self) -> [[f32; 4]; 4];
}

impl Mat4Ext for Mat4 {
    fn rotate_vector3(&self, vector: Vec3) -> Vec3 {
        let (_, rotation, _) = self.to_scale_rotation_translation();
        Mat3::from_quat(rotation) * vector
    }

    fn columns(&self) -> [[f32; 4]; 4] {
        [
            self.x_axis.to_array(),
            self.y_axis.to_array(),
            self.z_axis.to_array(),
            self.w_axis.to_array(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_vector3_strips_scale() {
        let m = Mat4::from_scale_rotation_translation(
            Vec3::new(3.0, 3.0, 3.0),
            glam::Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(5.0, 0.0, 0.0),
        );
        let v = m.rotate_vector3(Vec3::X);
        // Pure 90 degree rotation about Z: X -> Y, length preserved.
        assert!((v - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_columns_order() {
        let m = Mat4::from_translation(Vec3::new(7.0, 8.0, 9.0));
        let cols = m.columns();
        assert_eq!(cols[0], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(cols[3], [7.0, 8.0, 9.0, 1.0]);
    }
}
