use thiserror::Error;

/// Top-level error type for taskqp.
#[derive(Debug, Error)]
pub enum TaskQpError {
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("Solve error: {0}")]
    Solve(#[from] SolveError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<CycleError> for TaskQpError {
    fn from(err: CycleError) -> Self {
        match err {
            CycleError::Eval(e) => Self::Eval(e),
            CycleError::Solve(e) => Self::Solve(e),
        }
    }
}

/// Structural errors in a constraint model, detected before any cycle runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("Negative weight {weight} on constraint '{name}'")]
    NegativeWeight { name: String, weight: f64 },

    #[error("Duplicate constraint name: {0}")]
    DuplicateConstraint(String),

    #[error("Duplicate symbol name: {0}")]
    DuplicateSymbol(String),

    #[error("Unknown joint: {0}")]
    UnknownJoint(String),

    #[error("Unknown end-effector: {0}")]
    UnknownEndEffector(String),

    #[error("Shape mismatch in {artifact}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        artifact: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Slack bound must be finite and positive, got {0}")]
    InvalidSlackBound(f64),

    #[error("No controlled joints")]
    NoControlledJoints,
}

/// Errors raised while evaluating expressions against observable values.
///
/// These are caller contract violations and are never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("Missing observable: {0}")]
    MissingObservable(String),

    #[error("Argument count mismatch: expected {expected}, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("Negative cost weight {value} at index {index}")]
    NegativeWeight { index: usize, value: f64 },
}

/// Outcome of a QP solve that produced no usable command.
///
/// A solve failure is an expected runtime outcome, reported once per cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    #[error("QP infeasible: {0}")]
    Infeasible(String),

    #[error("QP numerical failure: {0}")]
    NumericalFailure(String),

    #[error("QP setup failed: {0}")]
    Setup(String),
}

/// Error of a single control cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CycleError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Solve(#[from] SolveError),
}

impl CycleError {
    /// Whether this is a solver-side failure (as opposed to a caller contract violation).
    pub const fn is_solve_failure(&self) -> bool {
        matches!(self, Self::Solve(_))
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
