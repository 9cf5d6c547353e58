//! Symbolic points, rotations and homogeneous frames.
//!
//! Conventions match nalgebra: rotations are 3×3 column-vector matrices,
//! frames are 4×4 homogeneous transforms, roll/pitch/yaw compose as
//! `Rz(yaw) * Ry(pitch) * Rx(roll)`.

use std::collections::HashMap;

use nalgebra::{Isometry3, Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3};
use taskqp_core::EvalError;

use crate::expr::Expr;
use crate::matrix::ExprMatrix;

/// 3×1 column `[x, y, z]`.
pub fn point3(x: Expr, y: Expr, z: Expr) -> ExprMatrix {
    ExprMatrix::column(vec![x, y, z])
}

/// 3×1 column `[x, y, z]`. Same layout as [`point3`]; the name documents intent.
pub fn vector3(x: Expr, y: Expr, z: Expr) -> ExprMatrix {
    ExprMatrix::column(vec![x, y, z])
}

/// Rotation by a symbolic `angle` about a constant `axis` (Rodrigues).
///
/// The axis is normalized; a zero axis yields the identity.
pub fn rotation_from_axis_angle(axis: &Vector3<f64>, angle: &Expr) -> ExprMatrix {
    let norm = axis.norm();
    if norm <= f64::EPSILON {
        return ExprMatrix::identity(3);
    }
    let (x, y, z) = (axis.x / norm, axis.y / norm, axis.z / norm);
    let c = angle.cos();
    let s = angle.sin();
    let t = 1.0 - &c;

    ExprMatrix::from_row_major(3, 3, vec![
        &t * (x * x) + &c,
        &t * (x * y) - &s * z,
        &t * (x * z) + &s * y,
        &t * (x * y) + &s * z,
        &t * (y * y) + &c,
        &t * (y * z) - &s * x,
        &t * (x * z) - &s * y,
        &t * (y * z) + &s * x,
        &t * (z * z) + &c,
    ])
}

/// Rotation from roll, pitch and yaw (extrinsic X, then Y, then Z).
pub fn rotation_from_rpy(roll: &Expr, pitch: &Expr, yaw: &Expr) -> ExprMatrix {
    let rx = rotation_from_axis_angle(&Vector3::x(), roll);
    let ry = rotation_from_axis_angle(&Vector3::y(), pitch);
    let rz = rotation_from_axis_angle(&Vector3::z(), yaw);
    rz.matmul(&ry).matmul(&rx)
}

/// Rotation from quaternion components `(x, y, z, w)`.
///
/// Every entry is divided by `x² + y² + z² + w²`, so any nonzero quaternion
/// gives the rotation of its normalized form. The zero quaternion gives the
/// zero matrix.
pub fn rotation_from_quaternion(x: &Expr, y: &Expr, z: &Expr, w: &Expr) -> ExprMatrix {
    let (x2, y2, z2, w2) = (x.square(), y.square(), z.square(), w.square());
    let norm2 = &x2 + &y2 + &z2 + &w2;
    let two = |a: &Expr, b: &Expr| 2.0 * (a * b);

    let entries = vec![
        &w2 + &x2 - &y2 - &z2,
        two(x, y) - two(w, z),
        two(x, z) + two(w, y),
        two(x, y) + two(w, z),
        &w2 - &x2 + &y2 - &z2,
        two(y, z) - two(w, x),
        two(x, z) - two(w, y),
        two(y, z) + two(w, x),
        &w2 - &x2 - &y2 + &z2,
    ];
    ExprMatrix::from_row_major(3, 3, entries.into_iter().map(|e| e / &norm2).collect())
}

/// Pure translation frame.
pub fn translation3(x: Expr, y: Expr, z: Expr) -> Frame {
    Frame::from_parts(&ExprMatrix::identity(3), &point3(x, y, z))
}

/// Frame from a 3×3 rotation and a 3×1 position.
pub fn frame(rotation: &ExprMatrix, position: &ExprMatrix) -> Frame {
    Frame::from_parts(rotation, position)
}

/// A symbolic rigid transform, stored as a 4×4 homogeneous matrix.
#[derive(Debug, Clone)]
pub struct Frame(ExprMatrix);

impl Frame {
    pub fn identity() -> Self {
        Self(ExprMatrix::identity(4))
    }

    /// Assemble `[R p; 0 1]`.
    ///
    /// # Panics
    /// If `rotation` is not 3×3 or `position` is not 3×1.
    pub fn from_parts(rotation: &ExprMatrix, position: &ExprMatrix) -> Self {
        assert_eq!(rotation.shape(), (3, 3), "frame rotation must be 3x3");
        assert_eq!(position.shape(), (3, 1), "frame position must be 3x1");
        let mut m = ExprMatrix::identity(4);
        for r in 0..3 {
            for c in 0..3 {
                m.set(r, c, rotation.get(r, c).clone());
            }
            m.set(r, 3, position.get(r, 0).clone());
        }
        Self(m)
    }

    /// A constant frame.
    pub fn constant(iso: &Isometry3<f64>) -> Self {
        Self(ExprMatrix::from_dmatrix(&nalgebra::DMatrix::from_column_slice(
            4,
            4,
            iso.to_homogeneous().as_slice(),
        )))
    }

    /// Translation part, 3×1.
    pub fn position(&self) -> ExprMatrix {
        self.0.block(0, 3, 3, 1)
    }

    /// Rotation part, 3×3.
    pub fn rotation(&self) -> ExprMatrix {
        self.0.block(0, 0, 3, 3)
    }

    /// `self * other`: express `other` (given in this frame) in the parent frame.
    pub fn compose(&self, other: &Self) -> Self {
        Self(self.0.matmul(&other.0))
    }

    /// Translation by `distance` along a constant `axis`.
    pub fn translation_along(axis: &Vector3<f64>, distance: &Expr) -> Self {
        translation3(distance * axis.x, distance * axis.y, distance * axis.z)
    }

    pub fn as_matrix(&self) -> &ExprMatrix {
        &self.0
    }

    pub fn into_matrix(self) -> ExprMatrix {
        self.0
    }

    /// Numeric 4×4 homogeneous matrix.
    pub fn eval(&self, values: &HashMap<String, f64>) -> Result<Matrix4<f64>, EvalError> {
        let m = self.0.eval(values)?;
        Ok(Matrix4::from_fn(|r, c| m[(r, c)]))
    }

    /// Numeric rigid transform. The rotation block is taken as orthonormal.
    pub fn eval_isometry(&self, values: &HashMap<String, f64>) -> Result<Isometry3<f64>, EvalError> {
        let m = self.eval(values)?;
        let rot: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
        let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rot));
        let translation = Translation3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
        Ok(Isometry3::from_parts(translation, rotation))
    }
}
