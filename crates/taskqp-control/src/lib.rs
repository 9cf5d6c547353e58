//! Observable inputs, controllers and Cartesian end-effector control.
//!
//! A [`Controller`] pairs a [`RobotModel`](taskqp_robot::RobotModel) with a
//! [`ConstraintProducer`]. At construction it snapshots the robot's joint
//! and hard constraints and the producer's soft constraints into one
//! [`QpProblemBuilder`](taskqp_qp::QpProblemBuilder); afterwards only input
//! values change. [`CartesianTask`] is the producer for end-effector pose
//! tracking.

pub mod cartesian;
pub mod controller;
pub mod error;
pub mod input;

pub use cartesian::{CartesianController, CartesianTask, GOAL_SUFFIX, WEIGHT_SUFFIX};
pub use controller::{ConstraintProducer, Controller};
pub use error::ControlError;
pub use input::{
    FrameInput, FrameUpdate, InputArray, InputRegistry, ObservableInput, Point3Input,
    Point3Update, SEPARATOR, ScalarInput, ScalarUpdate, qualified_name,
};
