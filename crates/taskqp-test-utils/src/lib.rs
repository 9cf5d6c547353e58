//! Shared test fixtures and utilities for taskqp crates.
//!
//! Provides mock robots and solvers plus small URDF descriptions used
//! across crate test suites.

pub mod fixtures;
pub mod mocks;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use fixtures::{PLANAR_ARM_URDF, TWO_LINK_ARM_URDF, Y_ARM_URDF, planar_arm, y_arm};
pub use mocks::{InfeasibleSolver, RecordingSolver, SingleJointRobot};
