use taskqp_core::ConfigError;
use taskqp_urdf::UrdfError;
use thiserror::Error;

/// Errors raised while building or driving a robot model.
#[derive(Debug, Error)]
pub enum RobotError {
    #[error("URDF error: {0}")]
    Urdf(#[from] UrdfError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown joint: {0}")]
    UnknownJoint(String),

    #[error("Unknown end-effector: {0}")]
    UnknownEndEffector(String),

    #[error("No end-effector links given")]
    NoEndEffectors,

    #[error("End-effector '{0}' has no actuated joint on its chain")]
    EmptyChain(String),

    #[error("Non-finite value {value} for joint '{joint}'")]
    NonFinite { joint: String, value: f64 },
}
