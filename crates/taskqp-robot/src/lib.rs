//! Robot models for the taskqp velocity controller.
//!
//! # Architecture
//!
//! ```text
//! UrdfModel ──► KinematicChain ──► ChainRobot (impl RobotModel) ──► Controller
//! ```
//!
//! A [`KinematicChain`] turns the URDF path to an end-effector link into a
//! symbolic pose over joint-position symbols. [`ChainRobot`] combines one
//! chain per end-effector, owns the joint state and produces the joint
//! and hard constraints a controller starts from.

pub mod chain;
pub mod error;
pub mod model;
pub mod robot;

pub use chain::{ChainJoint, KinematicChain};
pub use error::RobotError;
pub use model::RobotModel;
pub use robot::{ChainRobot, ControlledJoint};
