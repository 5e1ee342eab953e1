//! Matrix types for transformations

use crate::vector::{Vec3, Vec4};
use core::ops::Mul;

/// 3x3 matrix (column-major)
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct Mat3 {
    pub cols: [Vec3; 3],
}

impl Mat3 {
    #[inline]
    pub const fn from_cols(c0: Vec3, c1: Vec3, c2: Vec3) -> Self {
        Self { cols: [c0, c1, c2] }
    }

    #[inline]
    pub fn determinant(&self) -> f32 {
        self.cols[0].x * (self.cols[1].y * self.cols[2].z - self.cols[2].y * self.cols[1].z)
            - self.cols[1].x * (self.cols[0].y * self.cols[2].z - self.cols[2].y * self.cols[0].z)
            + self.cols[2].x * (self.cols[0].y * self.cols[1].z - self.cols[1].y * self.cols[0].z)
    }
}

/// 4x4 matrix (column-major) - the main transformation matrix
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Mat4 {
    pub cols: [Vec4; 4],
}

impl Mat4 {
    pub const IDENTITY: Self = Self {
        cols: [Vec4::X, Vec4::Y, Vec4::Z, Vec4::W],
    };

    /// Handedness flip `diag(-1, 1, 1, 1)`
    pub const REFLECT_X: Self = Self {
        cols: [
            Vec4::new(-1.0, 0.0, 0.0, 0.0),
            Vec4::Y,
            Vec4::Z,
            Vec4::W,
        ],
    };

    #[inline]
    pub const fn from_cols(c0: Vec4, c1: Vec4, c2: Vec4, c3: Vec4) -> Self {
        Self { cols: [c0, c1, c2, c3] }
    }

    /// Build from 16 values in column-major order
    pub fn from_cols_array(m: &[f32; 16]) -> Self {
        Self::from_cols(
            Vec4::new(m[0], m[1], m[2], m[3]),
            Vec4::new(m[4], m[5], m[6], m[7]),
            Vec4::new(m[8], m[9], m[10], m[11]),
            Vec4::new(m[12], m[13], m[14], m[15]),
        )
    }

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self::from_cols(Vec4::X, Vec4::Y, Vec4::Z, translation.extend(1.0))
    }

    #[inline]
    pub fn from_scale(scale: Vec3) -> Self {
        Self::from_cols(
            Vec4::new(scale.x, 0.0, 0.0, 0.0),
            Vec4::new(0.0, scale.y, 0.0, 0.0),
            Vec4::new(0.0, 0.0, scale.z, 0.0),
            Vec4::W,
        )
    }

    /// Rotation about an arbitrary axis (Rodrigues' rotation formula).
    ///
    /// A zero-length axis yields the identity.
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let axis = match axis.try_normalize(1e-12) {
            Some(axis) => axis,
            None => return Self::IDENTITY,
        };
        let (sin, cos) = angle.sin_cos();
        let t = 1.0 - cos;

        let x = axis.x;
        let y = axis.y;
        let z = axis.z;

        Self::from_cols(
            Vec4::new(t * x * x + cos, t * x * y + sin * z, t * x * z - sin * y, 0.0),
            Vec4::new(t * x * y - sin * z, t * y * y + cos, t * y * z + sin * x, 0.0),
            Vec4::new(t * x * z + sin * y, t * y * z - sin * x, t * z * z + cos, 0.0),
            Vec4::W,
        )
    }

    /// Create a rotation matrix from a quaternion
    pub fn from_quat(q: crate::Quat) -> Self {
        let x2 = q.x + q.x;
        let y2 = q.y + q.y;
        let z2 = q.z + q.z;

        let xx = q.x * x2;
        let xy = q.x * y2;
        let xz = q.x * z2;
        let yy = q.y * y2;
        let yz = q.y * z2;
        let zz = q.z * z2;
        let wx = q.w * x2;
        let wy = q.w * y2;
        let wz = q.w * z2;

        Self::from_cols(
            Vec4::new(1.0 - (yy + zz), xy + wz, xz - wy, 0.0),
            Vec4::new(xy - wz, 1.0 - (xx + zz), yz + wx, 0.0),
            Vec4::new(xz + wy, yz - wx, 1.0 - (xx + yy), 0.0),
            Vec4::W,
        )
    }

    /// Get the translation component
    #[inline]
    pub fn translation(&self) -> Vec3 {
        self.cols[3].truncate()
    }

    /// Upper-left 3x3 block
    #[inline]
    pub fn to_mat3(&self) -> Mat3 {
        Mat3::from_cols(
            self.cols[0].truncate(),
            self.cols[1].truncate(),
            self.cols[2].truncate(),
        )
    }

    /// Transform a point (w=1)
    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        let v = *self * point.extend(1.0);
        if v.w != 0.0 && v.w != 1.0 {
            v.truncate() / v.w
        } else {
            v.truncate()
        }
    }

    /// Transform a vector (w=0)
    #[inline]
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        (*self * vector.extend(0.0)).truncate()
    }

    /// Full 4x4 determinant
    pub fn determinant(&self) -> f32 {
        let a = self.cols[0];
        let b = self.cols[1];
        let c = self.cols[2];
        let d = self.cols[3];

        let s0 = a.x * b.y - b.x * a.y;
        let s1 = a.x * b.z - b.x * a.z;
        let s2 = a.x * b.w - b.x * a.w;
        let s3 = a.y * b.z - b.y * a.z;
        let s4 = a.y * b.w - b.y * a.w;
        let s5 = a.z * b.w - b.z * a.w;

        let c5 = c.z * d.w - d.z * c.w;
        let c4 = c.y * d.w - d.y * c.w;
        let c3 = c.y * d.z - d.y * c.z;
        let c2 = c.x * d.w - d.x * c.w;
        let c1 = c.x * d.z - d.x * c.z;
        let c0 = c.x * d.y - d.x * c.y;

        s0 * c5 - s1 * c4 + s2 * c3 + s3 * c2 - s4 * c1 + s5 * c0
    }

    /// True when every element is finite
    pub fn is_finite(&self) -> bool {
        self.cols.iter().all(|c| c.is_finite())
    }

    /// Change of handedness: `R * self * R` with `R = diag(-1, 1, 1, 1)`
    pub fn reflect_x(&self) -> Self {
        Self::REFLECT_X * *self * Self::REFLECT_X
    }

    /// Convert to flat array (column-major)
    pub fn to_cols_array(&self) -> [f32; 16] {
        [
            self.cols[0].x, self.cols[0].y, self.cols[0].z, self.cols[0].w,
            self.cols[1].x, self.cols[1].y, self.cols[1].z, self.cols[1].w,
            self.cols[2].x, self.cols[2].y, self.cols[2].z, self.cols[2].w,
            self.cols[3].x, self.cols[3].y, self.cols[3].z, self.cols[3].w,
        ]
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Mat4 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::from_cols(
            self * rhs.cols[0],
            self * rhs.cols[1],
            self * rhs.cols[2],
            self * rhs.cols[3],
        )
    }
}

impl Mul<Vec4> for Mat4 {
    type Output = Vec4;

    #[inline]
    fn mul(self, rhs: Vec4) -> Vec4 {
        self.cols[0] * rhs.x + self.cols[1] * rhs.y + self.cols[2] * rhs.z + self.cols[3] * rhs.w
    }
}
