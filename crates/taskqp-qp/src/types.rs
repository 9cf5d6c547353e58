use nalgebra::{DMatrix, DVector};

/// Numeric QP for one control cycle.
///
/// ```text
/// minimize    ½ xᵀ H x + gᵀ x
/// subject to  lb  <=  x  <= ub
///             lbA <= A x <= ubA
/// ```
///
/// `x` is joint velocities followed by one slack per soft constraint.
#[derive(Clone, Debug, PartialEq)]
pub struct QpMatrices {
    pub h: DMatrix<f64>,
    pub g: DVector<f64>,
    pub a: DMatrix<f64>,
    pub lb: DVector<f64>,
    pub ub: DVector<f64>,
    pub lba: DVector<f64>,
    pub uba: DVector<f64>,
}

impl QpMatrices {
    /// Number of decision variables.
    pub fn n_vars(&self) -> usize {
        self.h.ncols()
    }

    /// Number of rows of `A`.
    pub fn n_constraints(&self) -> usize {
        self.a.nrows()
    }
}

/// Raw solver output.
#[derive(Clone, Debug)]
pub struct QpSolution {
    /// Full decision vector, slacks included.
    pub x: DVector<f64>,
    /// Interior-point iterations used.
    pub iterations: u32,
    /// Solve time in microseconds.
    pub solve_time_us: u64,
}

/// Velocity command, one entry per controlled joint in build order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JointVelocities(Vec<(String, f64)>);

impl JointVelocities {
    pub fn new(entries: Vec<(String, f64)>) -> Self {
        Self(entries)
    }

    /// Velocity of the named joint.
    pub fn get(&self, joint: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == joint).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<(String, f64)> {
        self.0
    }
}
