//! 3D rigid transform for fiducial and camera poses.
//!
//! Coordinate frame follows ROS REP-103:
//! - X-forward, Y-left, Z-up (right-handed)
//! - Rotations are unit quaternions, normalized by construction

use nalgebra::{UnitQuaternion, Vector3};

/// A rigid transform in SE(3): rotation followed by translation.
///
/// Used both for fiducial poses in the map frame and for the relative
/// transforms between camera and fiducial frames.
///
/// # Composition
///
/// Transforms chain with the `*` operator (apply `rhs` in `self`'s frame):
/// ```
/// use chihna_slam::core::Transform3D;
/// use nalgebra::{UnitQuaternion, Vector3};
///
/// let step = Transform3D::new(UnitQuaternion::identity(), Vector3::new(1.0, 0.0, 0.0));
/// let twice = step * step;
/// assert_eq!(twice.translation.x, 2.0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform3D {
    /// Rotation component (always a unit quaternion).
    pub rotation: UnitQuaternion<f64>,
    /// Translation component in meters.
    pub translation: Vector3<f64>,
}

impl Transform3D {
    /// Create a transform from rotation and translation parts.
    #[inline]
    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Identity transform (no rotation, no translation).
    #[inline]
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Create a transform from roll/pitch/yaw angles (radians) and a translation.
    #[inline]
    pub fn from_euler_angles(roll: f64, pitch: f64, yaw: f64, translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::from_euler_angles(roll, pitch, yaw),
            translation,
        }
    }

    /// Roll/pitch/yaw Euler angles of the rotation, in radians.
    #[inline]
    pub fn euler_angles(&self) -> (f64, f64, f64) {
        self.rotation.euler_angles()
    }

    /// Transform a point from this transform's local frame to its parent frame.
    #[inline]
    pub fn transform_point(&self, point: Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// Compose this transform with another (chain transformations).
    ///
    /// Returns `self * other`: apply `other` in `self`'s frame.
    #[inline]
    pub fn compose(&self, other: &Transform3D) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Compute the inverse of this transform.
    ///
    /// `t.compose(&t.inverse())` is the identity up to rounding.
    #[inline]
    pub fn inverse(&self) -> Self {
        let inv_rotation = self.rotation.inverse();
        Self {
            rotation: inv_rotation,
            translation: -(inv_rotation * self.translation),
        }
    }

    /// Check approximate equality with separate position and angle tolerances.
    #[inline]
    pub fn approx_eq(&self, other: &Transform3D, pos_epsilon: f64, angle_epsilon: f64) -> bool {
        (self.translation - other.translation).norm() <= pos_epsilon
            && self.rotation.angle_to(&other.rotation) <= angle_epsilon
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for Transform3D {
    type Output = Self;

    /// Compose two transforms (same as `compose`).
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        self.compose(&rhs)
    }
}
