//! Compilation of a constraint model into a per-cycle QP.
//!
//! # Layout
//!
//! Decision variables: `x = [v_1 .. v_n, s_1 .. s_m]`, joint velocities in
//! joint-constraint order followed by one slack per soft constraint.
//!
//! ```text
//! H   = diag(w_joint_1 .. w_joint_n, w_soft_1 .. w_soft_m)
//! lb  = [joint lower .., -slack_bound ..]     ub  = [joint upper .., slack_bound ..]
//! A   = [ J_hard | 0 ]                        lbA = [hard lower .., soft lower ..]
//!       [ J_soft | I ]                        ubA = [hard upper .., soft upper ..]
//! ```
//!
//! `J_*` are Jacobians of the constraint expressions with respect to the
//! controlled-joint symbols. Each artifact is compiled once and evaluated
//! every cycle from only the observables it depends on.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};
use taskqp_core::{BuildError, BuilderConfig, CycleError, EvalError};
use taskqp_expr::{CompiledFunction, Expr, ExprMatrix, Symbol};
use tracing::{debug, trace, warn};

use crate::constraint::{ConstraintMap, HardConstraint, JointConstraint, SoftConstraint};
use crate::solver::{ClarabelSolver, QpSolver};
use crate::types::{JointVelocities, QpMatrices, QpSolution};

/// The six per-cycle artifacts. The cost vector `g` is always zero and is not compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QpArtifact {
    H,
    A,
    Lb,
    Ub,
    LbA,
    UbA,
}

impl QpArtifact {
    pub const ALL: [Self; 6] = [Self::H, Self::A, Self::Lb, Self::Ub, Self::LbA, Self::UbA];

    pub const fn name(self) -> &'static str {
        match self {
            Self::H => "H",
            Self::A => "A",
            Self::Lb => "lb",
            Self::Ub => "ub",
            Self::LbA => "lbA",
            Self::UbA => "ubA",
        }
    }
}

/// Symbolic form of every artifact, before compilation.
#[derive(Debug, Clone)]
pub struct SymbolicQp {
    pub h: ExprMatrix,
    pub a: ExprMatrix,
    pub lb: ExprMatrix,
    pub ub: ExprMatrix,
    pub lba: ExprMatrix,
    pub uba: ExprMatrix,
}

impl SymbolicQp {
    pub const fn get(&self, artifact: QpArtifact) -> &ExprMatrix {
        match artifact {
            QpArtifact::H => &self.h,
            QpArtifact::A => &self.a,
            QpArtifact::Lb => &self.lb,
            QpArtifact::Ub => &self.ub,
            QpArtifact::LbA => &self.lba,
            QpArtifact::UbA => &self.uba,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledQp {
    h: CompiledFunction,
    a: CompiledFunction,
    lb: CompiledFunction,
    ub: CompiledFunction,
    lba: CompiledFunction,
    uba: CompiledFunction,
}

impl CompiledQp {
    const fn get(&self, artifact: QpArtifact) -> &CompiledFunction {
        match artifact {
            QpArtifact::H => &self.h,
            QpArtifact::A => &self.a,
            QpArtifact::Lb => &self.lb,
            QpArtifact::Ub => &self.ub,
            QpArtifact::LbA => &self.lba,
            QpArtifact::UbA => &self.uba,
        }
    }
}

/// Compiles joint, hard and soft constraints into a QP and solves it every cycle.
///
/// Row and column order is fixed at construction and never changes.
pub struct QpProblemBuilder<S = ClarabelSolver> {
    joint_names: Vec<String>,
    hard_names: Vec<String>,
    soft_names: Vec<String>,
    symbolic: SymbolicQp,
    compiled: CompiledQp,
    solver: S,
    last_matrices: Option<QpMatrices>,
    last_solution: Option<QpSolution>,
}

fn check_weight(name: &str, weight: &Expr) -> Result<(), BuildError> {
    match weight.as_const() {
        Some(w) if w < 0.0 || w.is_nan() => Err(BuildError::NegativeWeight {
            name: name.to_string(),
            weight: w,
        }),
        _ => Ok(()),
    }
}

fn check_shape(
    artifact: QpArtifact,
    m: &ExprMatrix,
    expected: (usize, usize),
) -> Result<(), BuildError> {
    if m.shape() == expected {
        Ok(())
    } else {
        Err(BuildError::ShapeMismatch {
            artifact: artifact.name(),
            expected,
            got: m.shape(),
        })
    }
}

fn to_vector(m: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_column_slice(m.as_slice())
}

impl<S: QpSolver> QpProblemBuilder<S> {
    /// Assemble and compile the QP for a constraint model.
    ///
    /// The controlled joints are the keys of `joints`, in order; each joint's
    /// position symbol carries the joint's name.
    pub fn new(
        joints: &ConstraintMap<JointConstraint>,
        hard: &ConstraintMap<HardConstraint>,
        soft: &ConstraintMap<SoftConstraint>,
        config: &BuilderConfig,
        solver: S,
    ) -> Result<Self, BuildError> {
        if joints.is_empty() {
            return Err(BuildError::NoControlledJoints);
        }
        let slack_bound = config.slack_bound;
        if !(slack_bound.is_finite() && slack_bound > 0.0) {
            return Err(BuildError::InvalidSlackBound(slack_bound));
        }
        for (name, c) in joints.iter() {
            check_weight(name, &c.weight)?;
        }
        for (name, c) in soft.iter() {
            check_weight(name, &c.weight)?;
        }
        if let Some(name) = hard.names().find(|n| soft.contains(n)) {
            return Err(BuildError::DuplicateConstraint(name.to_string()));
        }

        let joint_symbols: Vec<Symbol> = joints.names().map(Symbol::new).collect();
        let n_joints = joints.len();
        let n_hard = hard.len();
        let n_soft = soft.len();
        let n_vars = n_joints + n_soft;
        let n_rows = n_hard + n_soft;

        // Cost: joint weights, then soft weights
        let weights: Vec<Expr> = joints
            .values()
            .map(|c| c.weight.clone())
            .chain(soft.values().map(|c| c.weight.clone()))
            .collect();
        let h = ExprMatrix::diag(&weights);

        // Variable bounds: joints, then open slack bounds
        let lb = ExprMatrix::column(
            joints
                .values()
                .map(|c| c.lower.clone())
                .chain((0..n_soft).map(|_| Expr::constant(-slack_bound)))
                .collect(),
        );
        let ub = ExprMatrix::column(
            joints
                .values()
                .map(|c| c.upper.clone())
                .chain((0..n_soft).map(|_| Expr::constant(slack_bound)))
                .collect(),
        );

        // Constraint matrix: [J_hard | 0; J_soft | I]
        let hard_exprs = ExprMatrix::column(hard.values().map(|c| c.expression.clone()).collect());
        let soft_exprs = ExprMatrix::column(soft.values().map(|c| c.expression.clone()).collect());
        let a_hard = hard_exprs
            .jacobian(&joint_symbols)
            .row_join(&ExprMatrix::zeros(n_hard, n_soft));
        let a_soft = soft_exprs
            .jacobian(&joint_symbols)
            .row_join(&ExprMatrix::identity(n_soft));
        let a = a_hard.vstack(&a_soft);

        let lba = ExprMatrix::column(
            hard.values()
                .map(|c| c.lower.clone())
                .chain(soft.values().map(|c| c.lower.clone()))
                .collect(),
        );
        let uba = ExprMatrix::column(
            hard.values()
                .map(|c| c.upper.clone())
                .chain(soft.values().map(|c| c.upper.clone()))
                .collect(),
        );

        let symbolic = SymbolicQp {
            h,
            a,
            lb,
            ub,
            lba,
            uba,
        };
        for (artifact, expected) in [
            (QpArtifact::H, (n_vars, n_vars)),
            (QpArtifact::A, (n_rows, n_vars)),
            (QpArtifact::Lb, (n_vars, 1)),
            (QpArtifact::Ub, (n_vars, 1)),
            (QpArtifact::LbA, (n_rows, 1)),
            (QpArtifact::UbA, (n_rows, 1)),
        ] {
            check_shape(artifact, symbolic.get(artifact), expected)?;
        }

        let compiled = CompiledQp {
            h: CompiledFunction::compile(&symbolic.h),
            a: CompiledFunction::compile(&symbolic.a),
            lb: CompiledFunction::compile(&symbolic.lb),
            ub: CompiledFunction::compile(&symbolic.ub),
            lba: CompiledFunction::compile(&symbolic.lba),
            uba: CompiledFunction::compile(&symbolic.uba),
        };

        for artifact in QpArtifact::ALL {
            let f = compiled.get(artifact);
            debug!(
                artifact = artifact.name(),
                rows = f.shape().0,
                cols = f.shape().1,
                free_symbols = f.symbols().len(),
                tape = f.tape_len(),
                "compiled QP artifact"
            );
        }
        debug!(
            joints = n_joints,
            hard = n_hard,
            soft = n_soft,
            "QP problem built"
        );

        Ok(Self {
            joint_names: joints.names().map(str::to_string).collect(),
            hard_names: hard.names().map(str::to_string).collect(),
            soft_names: soft.names().map(str::to_string).collect(),
            symbolic,
            compiled,
            solver,
            last_matrices: None,
            last_solution: None,
        })
    }

    /// Evaluate all artifacts from `observables` without solving.
    pub fn evaluate(&self, observables: &HashMap<String, f64>) -> Result<QpMatrices, EvalError> {
        let eval = |artifact: QpArtifact| self.compiled.get(artifact).eval_map(observables);

        let h = eval(QpArtifact::H)?;
        if let Some((index, value)) = h
            .diagonal()
            .iter()
            .copied()
            .enumerate()
            .find(|(_, w)| *w < 0.0 || w.is_nan())
        {
            return Err(EvalError::NegativeWeight { index, value });
        }
        let n_vars = h.ncols();

        Ok(QpMatrices {
            h,
            g: DVector::zeros(n_vars),
            a: eval(QpArtifact::A)?,
            lb: to_vector(&eval(QpArtifact::Lb)?),
            ub: to_vector(&eval(QpArtifact::Ub)?),
            lba: to_vector(&eval(QpArtifact::LbA)?),
            uba: to_vector(&eval(QpArtifact::UbA)?),
        })
    }

    /// Run one cycle: evaluate, solve, and name the joint velocities.
    pub fn update(
        &mut self,
        observables: &HashMap<String, f64>,
    ) -> Result<JointVelocities, CycleError> {
        let matrices = self.evaluate(observables)?;
        trace!(
            vars = matrices.n_vars(),
            rows = matrices.n_constraints(),
            "solving QP"
        );
        let result = self.solver.solve(&matrices);
        self.last_matrices = Some(matrices);

        let solution = match result {
            Ok(solution) => solution,
            Err(e) => {
                warn!(error = %e, "QP solve failed");
                self.last_solution = None;
                return Err(e.into());
            }
        };
        if solution.x.len() < self.joint_names.len() {
            self.last_solution = None;
            return Err(CycleError::Solve(taskqp_core::SolveError::NumericalFailure(
                format!(
                    "solution has {} entries, expected at least {}",
                    solution.x.len(),
                    self.joint_names.len()
                ),
            )));
        }

        let velocities = JointVelocities::new(
            self.joint_names
                .iter()
                .cloned()
                .zip(solution.x.iter().copied())
                .collect(),
        );
        trace!(
            iterations = solution.iterations,
            solve_time_us = solution.solve_time_us,
            "QP solved"
        );
        self.last_solution = Some(solution);
        Ok(velocities)
    }

    /// Controlled joints, in column order.
    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    pub fn hard_names(&self) -> &[String] {
        &self.hard_names
    }

    pub fn soft_names(&self) -> &[String] {
        &self.soft_names
    }

    pub fn symbolic(&self) -> &SymbolicQp {
        &self.symbolic
    }

    /// Names of the observables an artifact's evaluator reads.
    pub fn artifact_symbols(&self, artifact: QpArtifact) -> Vec<&str> {
        self.compiled.get(artifact).symbol_names()
    }

    /// Union of all observables the builder needs each cycle, sorted.
    pub fn required_observables(&self) -> Vec<Symbol> {
        taskqp_expr::union_symbols(QpArtifact::ALL.iter().map(|a| self.compiled.get(*a)))
    }

    /// Matrices of the most recent cycle that got past evaluation.
    pub fn last_matrices(&self) -> Option<&QpMatrices> {
        self.last_matrices.as_ref()
    }

    /// Full solution of the most recent successful cycle, slacks included.
    pub fn last_solution(&self) -> Option<&QpSolution> {
        self.last_solution.as_ref()
    }

    /// Slack value per soft constraint from the most recent successful cycle.
    pub fn slack_values(&self) -> Option<Vec<(&str, f64)>> {
        let solution = self.last_solution.as_ref()?;
        let offset = self.joint_names.len();
        Some(
            self.soft_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.as_str(), solution.x.get(offset + i).copied().unwrap_or(0.0)))
                .collect(),
        )
    }

    pub const fn solver(&self) -> &S {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use taskqp_core::SolveError;

    fn values(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    fn single_joint_model() -> (
        ConstraintMap<JointConstraint>,
        ConstraintMap<HardConstraint>,
        ConstraintMap<SoftConstraint>,
    ) {
        let q = Symbol::new("j");
        let joints = ConstraintMap::try_from_iter([("j", JointConstraint::new(-1.0, 1.0, 1.0))]).unwrap();
        let soft = ConstraintMap::try_from_iter([("track", SoftConstraint::new(0.5, 0.5, 10.0, &q))]).unwrap();
        (joints, ConstraintMap::new(), soft)
    }

    struct FailingSolver;

    impl QpSolver for FailingSolver {
        fn solve(&mut self, _qp: &QpMatrices) -> Result<QpSolution, SolveError> {
            Err(SolveError::Infeasible("always".into()))
        }
    }

    #[test]
    fn single_joint_scenario_matrices() {
        let (joints, hard, soft) = single_joint_model();
        let builder =
            QpProblemBuilder::new(&joints, &hard, &soft, &BuilderConfig::default(), ClarabelSolver::default())
                .unwrap();
        let m = builder.evaluate(&values(&[("j", 0.0)])).unwrap();

        assert_eq!(m.h, DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 10.0]));
        assert_eq!(m.a, DMatrix::from_row_slice(1, 2, &[1.0, 1.0]));
        assert_eq!(m.lb.as_slice(), &[-1.0, -1e9]);
        assert_eq!(m.ub.as_slice(), &[1.0, 1e9]);
        assert_eq!(m.lba.as_slice(), &[0.5]);
        assert_eq!(m.uba.as_slice(), &[0.5]);
        assert_eq!(m.g, DVector::zeros(2));
    }

    #[test]
    fn single_joint_scenario_solves() {
        let (joints, hard, soft) = single_joint_model();
        let mut builder =
            QpProblemBuilder::new(&joints, &hard, &soft, &BuilderConfig::default(), ClarabelSolver::default())
                .unwrap();
        let cmd = builder.update(&values(&[("j", 0.0)])).unwrap();

        assert_eq!(cmd.len(), 1);
        let v = cmd.get("j").unwrap();
        assert_relative_eq!(v, 5.0 / 11.0, epsilon = 1e-5);

        let slacks = builder.slack_values().unwrap();
        assert_eq!(slacks[0].0, "track");
        assert_relative_eq!(v + slacks[0].1, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn constant_artifacts_need_no_observables() {
        let (joints, hard, soft) = single_joint_model();
        let builder =
            QpProblemBuilder::new(&joints, &hard, &soft, &BuilderConfig::default(), ClarabelSolver::default())
                .unwrap();
        // d(j)/dj is constant, so nothing reads the joint position.
        for artifact in QpArtifact::ALL {
            assert!(builder.artifact_symbols(artifact).is_empty(), "{}", artifact.name());
        }
        assert!(builder.evaluate(&HashMap::new()).is_ok());
    }

    #[test]
    fn artifacts_depend_only_on_their_own_symbols() {
        let q = Symbol::new("q");
        let goal = Symbol::new("goal");
        let w = Symbol::new("w");
        let joints = ConstraintMap::try_from_iter([("q", JointConstraint::new(-1.0, 1.0, 0.1))]).unwrap();
        let soft = ConstraintMap::try_from_iter([(
            "reach",
            SoftConstraint::new(
                Expr::from(&goal) - Expr::from(&q),
                Expr::from(&goal) - Expr::from(&q),
                &w,
                Expr::from(&q).sin(),
            ),
        )])
        .unwrap();
        let builder = QpProblemBuilder::new(
            &joints,
            &ConstraintMap::new(),
            &soft,
            &BuilderConfig::default(),
            ClarabelSolver::default(),
        )
        .unwrap();

        assert_eq!(builder.artifact_symbols(QpArtifact::H), vec!["w"]);
        assert_eq!(builder.artifact_symbols(QpArtifact::A), vec!["q"]);
        assert!(builder.artifact_symbols(QpArtifact::Lb).is_empty());
        assert_eq!(builder.artifact_symbols(QpArtifact::LbA), vec!["goal", "q"]);
        let names: Vec<String> = builder
            .required_observables()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["goal", "q", "w"]);
    }

    #[test]
    fn missing_observable_is_eval_error() {
        let q = Symbol::new("q");
        let joints = ConstraintMap::try_from_iter([("q", JointConstraint::new(-1.0, 1.0, 1.0))]).unwrap();
        let soft = ConstraintMap::try_from_iter([(
            "s",
            SoftConstraint::new(Symbol::new("target"), Symbol::new("target"), 1.0, &q),
        )])
        .unwrap();
        let mut builder = QpProblemBuilder::new(
            &joints,
            &ConstraintMap::new(),
            &soft,
            &BuilderConfig::default(),
            ClarabelSolver::default(),
        )
        .unwrap();
        let err = builder.update(&values(&[("q", 0.0)])).unwrap_err();
        assert_eq!(err, CycleError::Eval(EvalError::MissingObservable("target".into())));
        assert!(!err.is_solve_failure());
        assert!(builder.last_matrices().is_none());
    }

    #[test]
    fn solver_failure_is_reported_once() {
        let (joints, hard, soft) = single_joint_model();
        let mut builder =
            QpProblemBuilder::new(&joints, &hard, &soft, &BuilderConfig::default(), FailingSolver).unwrap();
        let err = builder.update(&values(&[("j", 0.0)])).unwrap_err();
        assert!(err.is_solve_failure());
        assert!(builder.last_solution().is_none());
        assert!(builder.slack_values().is_none());
        assert!(builder.last_matrices().is_some());
    }

    #[test]
    fn constant_negative_weight_rejected_at_build() {
        let joints = ConstraintMap::try_from_iter([("q", JointConstraint::new(-1.0, 1.0, -0.5))]).unwrap();
        let err = QpProblemBuilder::new(
            &joints,
            &ConstraintMap::new(),
            &ConstraintMap::new(),
            &BuilderConfig::default(),
            ClarabelSolver::default(),
        )
        .err()
        .unwrap();
        assert_eq!(
            err,
            BuildError::NegativeWeight {
                name: "q".into(),
                weight: -0.5
            }
        );
    }

    #[test]
    fn symbolic_negative_weight_rejected_per_cycle() {
        let q = Symbol::new("q");
        let joints = ConstraintMap::try_from_iter([("q", JointConstraint::new(-1.0, 1.0, 1.0))]).unwrap();
        let soft = ConstraintMap::try_from_iter([("s", SoftConstraint::new(0.0, 0.0, Symbol::new("w"), &q))])
            .unwrap();
        let builder = QpProblemBuilder::new(
            &joints,
            &ConstraintMap::new(),
            &soft,
            &BuilderConfig::default(),
            ClarabelSolver::default(),
        )
        .unwrap();
        let err = builder.evaluate(&values(&[("w", -2.0)])).unwrap_err();
        assert_eq!(err, EvalError::NegativeWeight { index: 1, value: -2.0 });
    }

    #[test]
    fn empty_joint_set_rejected() {
        let err = QpProblemBuilder::new(
            &ConstraintMap::new(),
            &ConstraintMap::new(),
            &ConstraintMap::new(),
            &BuilderConfig::default(),
            ClarabelSolver::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err, BuildError::NoControlledJoints);
    }

    #[test]
    fn invalid_slack_bound_rejected() {
        let (joints, hard, soft) = single_joint_model();
        let config = BuilderConfig {
            slack_bound: f64::INFINITY,
        };
        let err = QpProblemBuilder::new(&joints, &hard, &soft, &config, ClarabelSolver::default())
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::InvalidSlackBound(_)));
    }

    #[test]
    fn hard_and_soft_names_must_differ() {
        let q = Symbol::new("q");
        let joints = ConstraintMap::try_from_iter([("q", JointConstraint::new(-1.0, 1.0, 1.0))]).unwrap();
        let hard = ConstraintMap::try_from_iter([("limit", HardConstraint::new(-1.0, 1.0, &q))]).unwrap();
        let soft = ConstraintMap::try_from_iter([("limit", SoftConstraint::new(0.0, 0.0, 1.0, &q))]).unwrap();
        let err = QpProblemBuilder::new(&joints, &hard, &soft, &BuilderConfig::default(), ClarabelSolver::default())
            .err()
            .unwrap();
        assert_eq!(err, BuildError::DuplicateConstraint("limit".into()));
    }

    #[test]
    fn hard_constraint_rows_come_first() {
        let q = Symbol::new("q");
        let p = Symbol::new("p");
        let joints = ConstraintMap::try_from_iter([
            ("q", JointConstraint::new(-1.0, 1.0, 1.0)),
            ("p", JointConstraint::new(-2.0, 2.0, 2.0)),
        ])
        .unwrap();
        let hard = ConstraintMap::try_from_iter([(
            "sum",
            HardConstraint::new(-0.1, 0.1, Expr::from(&q) + Expr::from(&p) * 3.0),
        )])
        .unwrap();
        let soft = ConstraintMap::try_from_iter([("p only", SoftConstraint::new(0.2, 0.3, 5.0, &p))]).unwrap();
        let builder =
            QpProblemBuilder::new(&joints, &hard, &soft, &BuilderConfig::default(), ClarabelSolver::default())
                .unwrap();
        let m = builder.evaluate(&HashMap::new()).unwrap();

        assert_eq!(m.a, DMatrix::from_row_slice(2, 3, &[1.0, 3.0, 0.0, 0.0, 1.0, 1.0]));
        assert_eq!(m.lba.as_slice(), &[-0.1, 0.2]);
        assert_eq!(m.uba.as_slice(), &[0.1, 0.3]);
        assert_eq!(m.h.diagonal().as_slice(), &[1.0, 2.0, 5.0]);
        assert_eq!(builder.joint_names(), &["q".to_string(), "p".to_string()]);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let q = Symbol::new("q");
        let joints = ConstraintMap::try_from_iter([("q", JointConstraint::new(-1.0, 1.0, 1.0))]).unwrap();
        let soft = ConstraintMap::try_from_iter([(
            "s",
            SoftConstraint::new(0.0, 0.0, 1.0, Expr::from(&q).sin() * Expr::from(&q).cos()),
        )])
        .unwrap();
        let builder = QpProblemBuilder::new(
            &joints,
            &ConstraintMap::new(),
            &soft,
            &BuilderConfig::default(),
            ClarabelSolver::default(),
        )
        .unwrap();
        let obs = values(&[("q", 0.731)]);
        assert_eq!(builder.evaluate(&obs).unwrap(), builder.evaluate(&obs).unwrap());
    }
}
