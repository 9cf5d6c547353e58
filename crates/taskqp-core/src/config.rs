use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default "effectively unbounded" bound for slack variables.
///
/// Finite so that every array handed to a solver stays finite.
pub const DEFAULT_SLACK_BOUND: f64 = 1e9;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_slack_bound() -> f64 {
    DEFAULT_SLACK_BOUND
}
const fn default_max_iter() -> u32 {
    100
}
const fn default_tolerance() -> f64 {
    1e-8
}
const fn default_unbounded_threshold() -> f64 {
    DEFAULT_SLACK_BOUND
}
const fn default_one() -> f64 {
    1.0
}
const fn default_joint_weight() -> f64 {
    0.001
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

fn check_positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be finite and > 0, got {value}")))
    }
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be finite and >= 0, got {value}")))
    }
}

// ---------------------------------------------------------------------------
// BuilderConfig
// ---------------------------------------------------------------------------

/// QP problem builder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Box bound placed on every slack variable (default: 1e9).
    #[serde(default = "default_slack_bound")]
    pub slack_bound: f64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            slack_bound: default_slack_bound(),
        }
    }
}

impl BuilderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("builder.slack_bound", self.slack_bound)
    }
}

// ---------------------------------------------------------------------------
// SolverConfig
// ---------------------------------------------------------------------------

/// Settings for the interior-point QP backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Maximum solver iterations.
    #[serde(default = "default_max_iter")]
    pub max_iter: u32,

    /// Absolute duality gap tolerance.
    #[serde(default = "default_tolerance")]
    pub tol_gap_abs: f64,

    /// Relative duality gap tolerance.
    #[serde(default = "default_tolerance")]
    pub tol_gap_rel: f64,

    /// Feasibility tolerance.
    #[serde(default = "default_tolerance")]
    pub tol_feas: f64,

    /// Bounds whose magnitude reaches this threshold are treated as absent.
    #[serde(default = "default_unbounded_threshold")]
    pub unbounded_threshold: f64,

    /// Print solver iterations.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iter: default_max_iter(),
            tol_gap_abs: default_tolerance(),
            tol_gap_rel: default_tolerance(),
            tol_feas: default_tolerance(),
            unbounded_threshold: default_unbounded_threshold(),
            verbose: false,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iter == 0 {
            return Err(invalid("solver.max_iter", "must be >= 1"));
        }
        check_positive("solver.tol_gap_abs", self.tol_gap_abs)?;
        check_positive("solver.tol_gap_rel", self.tol_gap_rel)?;
        check_positive("solver.tol_feas", self.tol_feas)?;
        check_positive("solver.unbounded_threshold", self.unbounded_threshold)
    }
}

// ---------------------------------------------------------------------------
// CartesianConfig
// ---------------------------------------------------------------------------

/// Cartesian end-effector controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartesianConfig {
    /// Initial tracking weight of every end-effector.
    #[serde(default = "default_one")]
    pub default_weight: f64,

    /// Proportional gain on the position error (1.0 cancels the error in one second).
    #[serde(default = "default_one")]
    pub position_gain: f64,

    /// Proportional gain on the rotation error.
    #[serde(default = "default_one")]
    pub rotation_gain: f64,
}

impl Default for CartesianConfig {
    fn default() -> Self {
        Self {
            default_weight: default_one(),
            position_gain: default_one(),
            rotation_gain: default_one(),
        }
    }
}

impl CartesianConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("cartesian.default_weight", self.default_weight)?;
        check_non_negative("cartesian.position_gain", self.position_gain)?;
        check_non_negative("cartesian.rotation_gain", self.rotation_gain)
    }
}

// ---------------------------------------------------------------------------
// RobotConfig
// ---------------------------------------------------------------------------

/// How joint constraints are derived from a robot description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Cost weight on every controlled joint's velocity.
    #[serde(default = "default_joint_weight")]
    pub joint_weight: f64,

    /// Velocity limit used when the description declares none (rad/s or m/s).
    #[serde(default = "default_one")]
    pub velocity_limit_fallback: f64,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            joint_weight: default_joint_weight(),
            velocity_limit_fallback: default_one(),
        }
    }
}

impl RobotConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("robot.joint_weight", self.joint_weight)?;
        check_positive("robot.velocity_limit_fallback", self.velocity_limit_fallback)
    }
}

// ---------------------------------------------------------------------------
// TaskQpConfig
// ---------------------------------------------------------------------------

/// Complete configuration, one section per concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskQpConfig {
    #[serde(default)]
    pub builder: BuilderConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub cartesian: CartesianConfig,
    #[serde(default)]
    pub robot: RobotConfig,
}

impl TaskQpConfig {
    /// Validate every section. Returns the first error found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.builder.validate()?;
        self.solver.validate()?;
        self.cartesian.validate()?;
        self.robot.validate()
    }

    /// Parse and validate from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
