//! Constraint-to-QP compilation and per-cycle solve.
//!
//! A constraint model (joint, hard and soft constraints over symbolic
//! expressions) is assembled into the cost matrix, bounds and linearized
//! constraint matrix of a velocity QP, compiled once, then re-evaluated and
//! solved every control cycle. The solve result is mapped back to named
//! joint velocities.

pub mod builder;
pub mod constraint;
pub mod solver;
pub mod types;

pub use builder::{QpArtifact, QpProblemBuilder, SymbolicQp};
pub use constraint::{ConstraintMap, HardConstraint, JointConstraint, SoftConstraint};
pub use solver::{ClarabelSolver, QpSolver};
pub use types::{JointVelocities, QpMatrices, QpSolution};
