//! Quaternion for 3D rotations

use crate::matrix::Mat3;
use crate::vector::Vec3;
use core::ops::Mul;

/// Quaternion representing a 3D rotation
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    /// Identity quaternion (no rotation)
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Create from axis and angle (radians)
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let half = angle * 0.5;
        let (sin, cos) = half.sin_cos();
        let axis = axis.normalize();
        Self::new(axis.x * sin, axis.y * sin, axis.z * sin, cos)
    }

    /// Create from a pure rotation matrix.
    ///
    /// The input must be orthonormal; callers strip scale first.
    pub fn from_rotation_matrix(m: &Mat3) -> Self {
        let [c0, c1, c2] = m.cols;
        let trace = c0.x + c1.y + c2.z;

        if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self::new((c1.z - c2.y) / s, (c2.x - c0.z) / s, (c0.y - c1.x) / s, 0.25 * s)
        } else if c0.x > c1.y && c0.x > c2.z {
            let s = (1.0 + c0.x - c1.y - c2.z).sqrt() * 2.0;
            Self::new(0.25 * s, (c0.y + c1.x) / s, (c2.x + c0.z) / s, (c1.z - c2.y) / s)
        } else if c1.y > c2.z {
            let s = (1.0 + c1.y - c0.x - c2.z).sqrt() * 2.0;
            Self::new((c0.y + c1.x) / s, 0.25 * s, (c1.z + c2.y) / s, (c2.x - c0.z) / s)
        } else {
            let s = (1.0 + c2.z - c0.x - c1.y).sqrt() * 2.0;
            Self::new((c2.x + c0.z) / s, (c1.z + c2.y) / s, 0.25 * s, (c0.y - c1.x) / s)
        }
    }

    #[inline]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Normalize the quaternion; degenerate input yields the identity
    #[inline]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len > 0.0 && len.is_finite() {
            Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
        } else {
            Self::IDENTITY
        }
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.w.is_finite()
    }

    #[inline]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Rotate a vector
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let qv = Vec3::new(self.x, self.y, self.z);
        let uv = qv.cross(v);
        let uuv = qv.cross(uv);
        v + (uv * self.w + uuv) * 2.0
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul<Vec3> for Quat {
    type Output = Vec3;

    fn mul(self, rhs: Vec3) -> Vec3 {
        self.rotate(rhs)
    }
}
