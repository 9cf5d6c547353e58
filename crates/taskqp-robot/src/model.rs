//! The robot collaborator seen by a controller.

use std::collections::HashMap;

use taskqp_core::BuildError;
use taskqp_expr::{Frame, Symbol};
use taskqp_qp::{ConstraintMap, HardConstraint, JointConstraint};

/// A robot as the controller sees it.
///
/// The constraint maps and end-effector frames are read once, when a
/// controller is built. [`observables`](Self::observables) is read every
/// cycle and must cover every joint symbol the frames and constraints use.
pub trait RobotModel {
    /// Velocity bounds and cost weight per controlled joint, keyed by joint name.
    ///
    /// The insertion order fixes the QP's joint column order.
    fn joint_constraints(&self) -> Result<ConstraintMap<JointConstraint>, BuildError>;

    /// Constraints the robot always enforces (e.g. position limits).
    fn hard_constraints(&self) -> Result<ConstraintMap<HardConstraint>, BuildError>;

    /// End-effector names, in a stable order.
    fn end_effectors(&self) -> Vec<String>;

    /// Pose of an end-effector as an expression over joint symbols.
    fn end_effector_frame(&self, name: &str) -> Option<Frame>;

    /// Current value of every live observable, keyed by symbol name.
    fn observables(&self) -> HashMap<String, f64>;

    /// Symbol carrying the position of a controlled joint.
    fn joint_symbol(&self, name: &str) -> Option<Symbol>;
}
