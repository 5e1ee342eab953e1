//! Decomposed position/rotation/scale transform

use crate::matrix::{Mat3, Mat4};
use crate::quaternion::Quat;
use crate::vector::Vec3;

/// Basis vectors shorter than this are treated as collapsed
pub const SCALE_EPSILON: f32 = 1e-6;

/// Allowed deviation of `|det|` from 1 for an extracted rotation
pub const ORTHOGONALITY_TOLERANCE: f32 = 0.1;

/// Complete 3D transform with position, rotation, and scale
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

/// What had to be repaired while decomposing a matrix
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecomposeIssues {
    /// Non-finite entries or a zero/non-finite determinant; identity was used
    pub invalid_matrix: bool,
    /// A basis column had zero or non-finite length; its scale became 1
    pub collapsed_axis: bool,
    /// Negative determinant, folded into the X scale
    pub reflected: bool,
    /// Residual rotation was not orthogonal; identity rotation was used
    pub non_orthogonal: bool,
}

impl DecomposeIssues {
    /// True when the matrix needed repair (a plain reflection is not a repair)
    pub fn any_repaired(&self) -> bool {
        self.invalid_matrix || self.collapsed_axis || self.non_orthogonal
    }
}

impl Transform {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Decompose an affine matrix into position, rotation and scale.
    ///
    /// Total over all inputs: invalid matrices fall back to identity, collapsed
    /// axes get unit scale, a negative determinant becomes a negative X scale
    /// and a non-orthogonal residual falls back to the identity rotation.
    pub fn decompose(m: &Mat4) -> (Self, DecomposeIssues) {
        let mut issues = DecomposeIssues::default();

        let det = m.determinant();
        let m = if !m.is_finite() || !det.is_finite() || det == 0.0 {
            issues.invalid_matrix = true;
            Mat4::IDENTITY
        } else {
            *m
        };

        let position = m.translation();

        let basis = m.to_mat3();
        let mut scale = Vec3::new(
            basis.cols[0].length(),
            basis.cols[1].length(),
            basis.cols[2].length(),
        );
        for s in [&mut scale.x, &mut scale.y, &mut scale.z] {
            if !s.is_finite() || *s < SCALE_EPSILON {
                *s = 1.0;
                issues.collapsed_axis = true;
            }
        }

        if basis.determinant() < 0.0 {
            scale.x = -scale.x;
            issues.reflected = true;
        }

        let rot = Mat3::from_cols(
            basis.cols[0] / scale.x,
            basis.cols[1] / scale.y,
            basis.cols[2] / scale.z,
        );

        let rot_det = rot.determinant();
        let rotation = if !rot_det.is_finite() || (rot_det.abs() - 1.0).abs() > ORTHOGONALITY_TOLERANCE {
            issues.non_orthogonal = true;
            Quat::IDENTITY
        } else {
            let q = Quat::from_rotation_matrix(&rot).normalize();
            if q.is_finite() { q } else { Quat::IDENTITY }
        };

        (Self { position, rotation, scale }, issues)
    }

    /// Convert to a 4x4 transformation matrix (`T * R * S`)
    pub fn to_matrix(&self) -> Mat4 {
        let rot = Mat4::from_quat(self.rotation);
        let scale = Mat4::from_scale(self.scale);
        let translation = Mat4::from_translation(self.position);
        translation * rot * scale
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_mat_eq(a: &Mat4, b: &Mat4) {
        for (x, y) in a.to_cols_array().iter().zip(b.to_cols_array().iter()) {
            assert!((x - y).abs() < 1e-4, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_decompose_roundtrip() {
        let m = Mat4::from_translation(Vec3::new(1.0, -2.0, 3.0))
            * Mat4::from_axis_angle(Vec3::new(0.3, 1.0, 0.2), 1.1)
            * Mat4::from_scale(Vec3::new(2.0, 0.5, 3.0));
        let (t, issues) = Transform::decompose(&m);
        assert_eq!(issues, DecomposeIssues::default());
        assert_mat_eq(&t.to_matrix(), &m);
    }

    #[test]
    fn test_negative_determinant_folds_into_x_scale() {
        let m = Mat4::from_scale(Vec3::new(1.0, 1.0, -2.0));
        let (t, issues) = Transform::decompose(&m);
        assert!(issues.reflected);
        assert!(!issues.any_repaired());
        assert!(t.scale.x < 0.0);
        assert_mat_eq(&t.to_matrix(), &m);
    }

    #[test]
    fn test_nan_matrix_falls_back_to_identity() {
        let mut m = Mat4::IDENTITY;
        m.cols[1].y = f32::NAN;
        let (t, issues) = Transform::decompose(&m);
        assert!(issues.invalid_matrix);
        assert_eq!(t, Transform::IDENTITY);
    }

    #[test]
    fn test_singular_matrix_falls_back_to_identity() {
        let m = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        let (t, issues) = Transform::decompose(&m);
        assert!(issues.invalid_matrix);
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.rotation, Quat::IDENTITY);
    }

    #[test]
    fn test_sheared_basis_uses_identity_rotation() {
        // Two nearly parallel basis columns: finite, invertible, not orthogonal
        let m = Mat4::from_cols(
            crate::Vec4::new(1.0, 0.0, 0.0, 0.0),
            crate::Vec4::new(0.9, 0.1, 0.0, 0.0),
            crate::Vec4::Z,
            crate::Vec4::W,
        );
        let (t, issues) = Transform::decompose(&m);
        assert!(issues.non_orthogonal);
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert!(t.position.is_finite());
    }
}
