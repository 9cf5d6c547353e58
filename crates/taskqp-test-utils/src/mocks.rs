//! Mock robot and solver implementations for testing.

use std::collections::HashMap;

use nalgebra::Vector3;
use taskqp_core::{BuildError, SolveError};
use taskqp_expr::{Expr, Frame, Symbol, rotation_from_axis_angle, vector3};
use taskqp_qp::{
    ClarabelSolver, ConstraintMap, HardConstraint, JointConstraint, QpMatrices, QpSolution,
    QpSolver,
};
use taskqp_robot::RobotModel;

// ---------------------------------------------------------------------------
// SingleJointRobot
// ---------------------------------------------------------------------------

/// One revolute joint about z carrying a unit-length link along x.
///
/// Joint velocity bounds are `[-1, 1]` with weight 1; there are no hard
/// constraints. The end-effector sits at the end of the link.
#[derive(Debug, Clone)]
pub struct SingleJointRobot {
    position: f64,
}

impl SingleJointRobot {
    pub const JOINT: &'static str = "joint";
    pub const END_EFFECTOR: &'static str = "tip";

    pub const fn new(position: f64) -> Self {
        Self { position }
    }

    pub const fn position(&self) -> f64 {
        self.position
    }

    pub fn set_position(&mut self, position: f64) {
        self.position = position;
    }
}

impl RobotModel for SingleJointRobot {
    fn joint_constraints(&self) -> Result<ConstraintMap<JointConstraint>, BuildError> {
        ConstraintMap::try_from_iter([(Self::JOINT, JointConstraint::new(-1.0, 1.0, 1.0))])
    }

    fn hard_constraints(&self) -> Result<ConstraintMap<HardConstraint>, BuildError> {
        Ok(ConstraintMap::new())
    }

    fn end_effectors(&self) -> Vec<String> {
        vec![Self::END_EFFECTOR.to_owned()]
    }

    fn end_effector_frame(&self, name: &str) -> Option<Frame> {
        if name != Self::END_EFFECTOR {
            return None;
        }
        let q = Expr::from(Symbol::new(Self::JOINT));
        let rotation = rotation_from_axis_angle(&Vector3::z(), &q);
        let link = vector3(Expr::one(), Expr::zero(), Expr::zero());
        Some(Frame::from_parts(&rotation, &rotation.matmul(&link)))
    }

    fn observables(&self) -> HashMap<String, f64> {
        HashMap::from([(Self::JOINT.to_owned(), self.position)])
    }

    fn joint_symbol(&self, name: &str) -> Option<Symbol> {
        (name == Self::JOINT).then(|| Symbol::new(name))
    }
}

// ---------------------------------------------------------------------------
// InfeasibleSolver
// ---------------------------------------------------------------------------

/// A solver that reports every problem as infeasible.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfeasibleSolver;

impl QpSolver for InfeasibleSolver {
    fn solve(&mut self, _qp: &QpMatrices) -> Result<QpSolution, SolveError> {
        Err(SolveError::Infeasible("PrimalInfeasible".into()))
    }
}

// ---------------------------------------------------------------------------
// RecordingSolver
// ---------------------------------------------------------------------------

/// Records every problem it is handed, then delegates to an inner solver.
#[derive(Debug, Clone, Default)]
pub struct RecordingSolver<S = ClarabelSolver> {
    inner: S,
    problems: Vec<QpMatrices>,
}

impl<S> RecordingSolver<S> {
    pub const fn new(inner: S) -> Self {
        Self {
            inner,
            problems: Vec::new(),
        }
    }

    /// Every problem seen so far, oldest first.
    pub fn problems(&self) -> &[QpMatrices] {
        &self.problems
    }

    pub fn last(&self) -> Option<&QpMatrices> {
        self.problems.last()
    }
}

impl<S: QpSolver> QpSolver for RecordingSolver<S> {
    fn solve(&mut self, qp: &QpMatrices) -> Result<QpSolution, SolveError> {
        self.problems.push(qp.clone());
        self.inner.solve(qp)
    }
}
