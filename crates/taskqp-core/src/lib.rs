//! Shared error taxonomy and configuration for taskqp.

pub mod config;
pub mod error;

pub use config::{
    BuilderConfig, CartesianConfig, DEFAULT_SLACK_BOUND, RobotConfig, SolverConfig, TaskQpConfig,
};
pub use error::{BuildError, ConfigError, CycleError, EvalError, SolveError, TaskQpError};
