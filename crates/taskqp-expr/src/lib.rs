//! Symbolic expressions for constraint modelling.
//!
//! Provides:
//! - [`Symbol`] and [`Expr`]: scalar expression DAG with symbolic derivatives
//! - [`ExprMatrix`]: dense expression matrices, Jacobians and block assembly
//! - [`CompiledFunction`]: a matrix compiled once, evaluated every cycle
//! - [`geometry`]: symbolic rotations and homogeneous frames

pub mod compile;
pub mod expr;
pub mod geometry;
pub mod matrix;
pub mod symbol;

pub use compile::{CompiledFunction, union_symbols};
pub use expr::Expr;
pub use geometry::{
    Frame, frame, point3, rotation_from_axis_angle, rotation_from_quaternion, rotation_from_rpy,
    translation3, vector3,
};
pub use matrix::ExprMatrix;
pub use symbol::Symbol;
