//! QP solver seam and the Clarabel backend.
//!
//! Clarabel solves
//!
//! ```text
//! minimize    ½ xᵀ P x + qᵀ x
//! subject to  A x + s = b,  s ∈ K
//! ```
//!
//! Box bounds become rows: `x <= u` is `e_i x + s = u` with `s >= 0`, and
//! `x >= l` is `-e_i x + s = -l`. Rows with `l == u` go into the zero cone.
//! Bounds whose magnitude reaches `unbounded_threshold` are dropped.

use std::time::Instant;

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{NonnegativeConeT, ZeroConeT},
};
use nalgebra::{DMatrix, DVector};
use taskqp_core::{SolveError, SolverConfig};
use tracing::trace;

use crate::types::{QpMatrices, QpSolution};

/// A dense QP solver.
pub trait QpSolver {
    /// Solve `qp`. Infeasibility and numerical failure are errors.
    fn solve(&mut self, qp: &QpMatrices) -> Result<QpSolution, SolveError>;
}

/// Interior-point backend using Clarabel.
#[derive(Debug, Clone, Default)]
pub struct ClarabelSolver {
    config: SolverConfig,
}

impl ClarabelSolver {
    pub const fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &SolverConfig {
        &self.config
    }
}

/// One linear row `coeffs · x (= or <=) rhs`.
struct Row {
    coeffs: Vec<(usize, f64)>,
    rhs: f64,
}

#[derive(Default)]
struct RowSet {
    eq: Vec<Row>,
    ineq: Vec<Row>,
}

impl RowSet {
    /// Add `lower <= coeffs · x <= upper`.
    fn push_range(&mut self, coeffs: &[(usize, f64)], lower: f64, upper: f64, threshold: f64) {
        let has_lower = lower.abs() < threshold;
        let has_upper = upper.abs() < threshold;
        if has_lower && has_upper && (upper - lower).abs() <= f64::EPSILON * upper.abs().max(1.0) {
            self.eq.push(Row {
                coeffs: coeffs.to_vec(),
                rhs: upper,
            });
            return;
        }
        if has_upper {
            self.ineq.push(Row {
                coeffs: coeffs.to_vec(),
                rhs: upper,
            });
        }
        if has_lower {
            self.ineq.push(Row {
                coeffs: coeffs.iter().map(|&(j, v)| (j, -v)).collect(),
                rhs: -lower,
            });
        }
    }

    fn len(&self) -> usize {
        self.eq.len() + self.ineq.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dense `(A, b)` with equality rows first.
    fn assemble(&self, n_vars: usize) -> (DMatrix<f64>, Vec<f64>) {
        let mut a = DMatrix::zeros(self.len(), n_vars);
        let mut b = Vec::with_capacity(self.len());
        for (i, row) in self.eq.iter().chain(&self.ineq).enumerate() {
            for &(j, v) in &row.coeffs {
                a[(i, j)] = v;
            }
            b.push(row.rhs);
        }
        (a, b)
    }
}

fn check_bounds(name: &str, lower: &DVector<f64>, upper: &DVector<f64>) -> Result<(), SolveError> {
    for (i, (l, u)) in lower.iter().zip(upper.iter()).enumerate() {
        if l > u {
            return Err(SolveError::Infeasible(format!(
                "{name}[{i}]: lower bound {l} exceeds upper bound {u}"
            )));
        }
    }
    Ok(())
}

impl QpSolver for ClarabelSolver {
    fn solve(&mut self, qp: &QpMatrices) -> Result<QpSolution, SolveError> {
        let start = Instant::now();
        let n = qp.n_vars();

        check_bounds("lb/ub", &qp.lb, &qp.ub)?;
        check_bounds("lbA/ubA", &qp.lba, &qp.uba)?;

        // 1. Rows from variable bounds and constraint bounds
        let threshold = self.config.unbounded_threshold;
        let mut rows = RowSet::default();
        for i in 0..n {
            rows.push_range(&[(i, 1.0)], qp.lb[i], qp.ub[i], threshold);
        }
        for r in 0..qp.n_constraints() {
            let coeffs: Vec<(usize, f64)> = (0..n)
                .filter_map(|j| {
                    let v = qp.a[(r, j)];
                    (v.abs() > 1e-15).then_some((j, v))
                })
                .collect();
            rows.push_range(&coeffs, qp.lba[r], qp.uba[r], threshold);
        }

        if rows.is_empty() && qp.g.iter().all(|v| v.abs() < f64::MIN_POSITIVE) {
            return Ok(QpSolution {
                x: DVector::zeros(n),
                iterations: 0,
                solve_time_us: 0,
            });
        }

        // 2. Convert to Clarabel format
        let (a_all, b_all) = rows.assemble(n);
        let p_csc = dmatrix_to_csc_upper_tri(&qp.h);
        let a_csc = dmatrix_to_csc(&a_all);
        let q: Vec<f64> = qp.g.iter().copied().collect();
        let mut cones = Vec::with_capacity(2);
        if !rows.eq.is_empty() {
            cones.push(ZeroConeT(rows.eq.len()));
        }
        if !rows.ineq.is_empty() {
            cones.push(NonnegativeConeT(rows.ineq.len()));
        }

        // 3. Solve
        let settings = DefaultSettingsBuilder::default()
            .max_iter(self.config.max_iter)
            .verbose(self.config.verbose)
            .tol_gap_abs(self.config.tol_gap_abs)
            .tol_gap_rel(self.config.tol_gap_rel)
            .tol_feas(self.config.tol_feas)
            .build()
            .map_err(|e| SolveError::Setup(e.to_string()))?;

        let mut solver = DefaultSolver::new(&p_csc, &q, &a_csc, &b_all, &cones, settings)
            .map_err(|e| SolveError::Setup(e.to_string()))?;
        solver.solve();
        let sol = &solver.solution;

        trace!(status = ?sol.status, iterations = sol.iterations, "clarabel finished");

        match &sol.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => Ok(QpSolution {
                x: DVector::from_column_slice(&sol.x),
                iterations: sol.iterations,
                solve_time_us: u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
            }),
            SolverStatus::PrimalInfeasible
            | SolverStatus::DualInfeasible
            | SolverStatus::AlmostPrimalInfeasible
            | SolverStatus::AlmostDualInfeasible => {
                Err(SolveError::Infeasible(format!("{:?}", sol.status)))
            }
            other => Err(SolveError::NumericalFailure(format!("{other:?}"))),
        }
    }
}

/// Convert a nalgebra `DMatrix<f64>` to a Clarabel `CscMatrix<f64>` (full matrix).
fn dmatrix_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v.abs() > 1e-15 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Upper triangle of a symmetric `DMatrix<f64>` as a `CscMatrix<f64>`.
fn dmatrix_to_csc_upper_tri(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..nrows.min(j + 1) {
            let v = m[(i, j)];
            if v.abs() > 1e-15 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}
