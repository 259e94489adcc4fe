//! Local node transforms.

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Translation, Euler rotation and scale of a node relative to its parent.
///
/// Rotation is in degrees with XYZ order: X is applied first, then Y, then Z,
/// so the rotation matrix is `Rz * Ry * Rx`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeTransform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl NodeTransform {
    pub const IDENTITY: NodeTransform = NodeTransform {
        translation: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn new(translation: Vec3, rotation: Vec3, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Decompose an affine matrix. Shear is discarded.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation: quat_to_euler_degrees(rotation),
            scale,
        }
    }

    /// Check if this is an identity transform.
    pub fn is_identity(&self) -> bool {
        self.translation == Vec3::ZERO && self.rotation == Vec3::ZERO && self.scale == Vec3::ONE
    }

    /// Rotation as a quaternion.
    pub fn quaternion(&self) -> Quat {
        euler_degrees_to_quat(self.rotation)
    }

    /// Compose into a matrix (`T * R * S`).
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.quaternion(), self.translation)
    }

    /// Apply a change of basis `m` (orthonormal) to this transform: `M * T * M^-1`.
    pub fn change_basis(&self, m: Mat3) -> Self {
        let basis = Mat4::from_mat3(m);
        let converted = basis * self.to_matrix() * basis.transpose();
        let mut result = Self::from_matrix(converted);
        // Reflections show up as a negated scale axis after decomposition.
        // A similarity transform keeps the original scale magnitudes.
        result.scale = (m * self.scale).abs();
        result
    }

    /// Keep each rotation component within 180 degrees of `previous`.
    pub fn unwrap_rotation(&mut self, previous: Vec3) {
        for i in 0..3 {
            self.rotation[i] = unwrap_angle(previous[i], self.rotation[i]);
        }
    }
}

/// XYZ Euler angles in degrees to a quaternion.
pub fn euler_degrees_to_quat(rotation: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::ZYX,
        rotation.z.to_radians(),
        rotation.y.to_radians(),
        rotation.x.to_radians(),
    )
}

/// A quaternion to XYZ Euler angles in degrees.
pub fn quat_to_euler_degrees(rotation: Quat) -> Vec3 {
    let (z, y, x) = rotation.to_euler(EulerRot::ZYX);
    Vec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees())
}

/// Shift `angle` by whole turns so it lands within 180 degrees of `previous`.
pub fn unwrap_angle(previous: f32, angle: f32) -> f32 {
    let turns = ((previous - angle) / 360.0).round();
    angle + turns * 360.0
}
