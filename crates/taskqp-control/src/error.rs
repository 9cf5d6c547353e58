use taskqp_core::{BuildError, ConfigError, EvalError, TaskQpError};
use thiserror::Error;

/// Errors raised while building a controller or pushing goals into it.
///
/// Per-cycle outcomes are reported as [`taskqp_core::CycleError`] instead.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unknown end-effector: {0}")]
    UnknownEndEffector(String),

    #[error("Invalid weight {weight} for end-effector '{end_effector}'")]
    InvalidWeight { end_effector: String, weight: f64 },
}

impl From<ControlError> for TaskQpError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::Build(e) => Self::Build(e),
            ControlError::Eval(e) => Self::Eval(e),
            ControlError::Config(e) => Self::Config(e),
            ControlError::UnknownEndEffector(name) => {
                Self::Build(BuildError::UnknownEndEffector(name))
            }
            ControlError::InvalidWeight {
                end_effector,
                weight,
            } => Self::Build(BuildError::NegativeWeight {
                name: end_effector,
                weight,
            }),
        }
    }
}
