//! Cartesian end-effector tracking.
//!
//! For every end-effector the robot exposes, two soft constraints pull the
//! current pose toward a goal pose held in observable inputs:
//!
//! * `align {eef} position`: Euclidean distance between current and goal
//!   position.
//! * `align {eef} rotation`: Euclidean norm of the difference of the two
//!   flattened 3×3 rotation matrices.
//!
//! Both bound the rate of their distance to `-gain * distance`, a
//! proportional drive that cancels the error in `1 / gain` seconds. The goal
//! lives in a [`FrameInput`] (suffix `goal`) and the per-end-effector weight
//! in a [`ScalarInput`] (suffix `sc_w`), both prefixed with the end-effector
//! name. Goals and weights change through input values only; the
//! constraint set is never rebuilt.

use std::collections::HashMap;

use nalgebra::{Isometry3, Vector3};

use taskqp_core::{BuildError, CartesianConfig, TaskQpConfig};
use taskqp_qp::{ConstraintMap, QpSolver, SoftConstraint};
use taskqp_robot::RobotModel;

use crate::controller::{ConstraintProducer, Controller};
use crate::error::ControlError;
use crate::input::{
    FrameInput, FrameUpdate, InputRegistry, ObservableInput, ScalarInput, ScalarUpdate,
};

/// Suffix of goal pose inputs.
pub const GOAL_SUFFIX: &str = "goal";
/// Suffix of tracking weight inputs.
pub const WEIGHT_SUFFIX: &str = "sc_w";

#[derive(Debug, Clone)]
struct EndEffectorTask {
    name: String,
    goal: FrameInput,
    weight: ScalarInput,
}

/// Goal and weight inputs plus alignment constraints for every end-effector.
#[derive(Debug, Clone)]
pub struct CartesianTask {
    config: CartesianConfig,
    end_effectors: Vec<EndEffectorTask>,
}

impl CartesianTask {
    pub fn new<R: RobotModel>(robot: &R, config: CartesianConfig) -> Self {
        let end_effectors = robot
            .end_effectors()
            .into_iter()
            .map(|name| EndEffectorTask {
                goal: FrameInput::new(&name, GOAL_SUFFIX),
                weight: ScalarInput::new(&name, WEIGHT_SUFFIX),
                name,
            })
            .collect();
        Self {
            config,
            end_effectors,
        }
    }

    pub fn config(&self) -> &CartesianConfig {
        &self.config
    }

    pub fn end_effectors(&self) -> impl Iterator<Item = &str> {
        self.end_effectors.iter().map(|e| e.name.as_str())
    }

    pub fn goal_input(&self, end_effector: &str) -> Option<&FrameInput> {
        self.task(end_effector).ok().map(|e| &e.goal)
    }

    pub fn weight_input(&self, end_effector: &str) -> Option<&ScalarInput> {
        self.task(end_effector).ok().map(|e| &e.weight)
    }

    /// Name of the position soft constraint of an end-effector.
    pub fn position_constraint(end_effector: &str) -> String {
        format!("align {end_effector} position")
    }

    /// Name of the rotation soft constraint of an end-effector.
    pub fn rotation_constraint(end_effector: &str) -> String {
        format!("align {end_effector} rotation")
    }

    /// Input values placing the goal of `end_effector` at `pose`.
    pub fn goal_update(
        &self,
        end_effector: &str,
        pose: &Isometry3<f64>,
    ) -> Result<HashMap<String, f64>, ControlError> {
        Ok(self
            .task(end_effector)?
            .goal
            .update(FrameUpdate::from_isometry(pose)))
    }

    /// Input values setting the tracking weight of `end_effector`.
    pub fn weight_update(
        &self,
        end_effector: &str,
        weight: f64,
    ) -> Result<HashMap<String, f64>, ControlError> {
        if !(weight.is_finite() && weight >= 0.0) {
            return Err(ControlError::InvalidWeight {
                end_effector: end_effector.to_owned(),
                weight,
            });
        }
        Ok(self
            .task(end_effector)?
            .weight
            .update(ScalarUpdate { v: weight }))
    }

    fn task(&self, end_effector: &str) -> Result<&EndEffectorTask, ControlError> {
        self.end_effectors
            .iter()
            .find(|e| e.name == end_effector)
            .ok_or_else(|| ControlError::UnknownEndEffector(end_effector.to_owned()))
    }
}

impl ConstraintProducer for CartesianTask {
    fn register_inputs(&self, registry: &mut InputRegistry) -> Result<(), BuildError> {
        for eef in &self.end_effectors {
            registry.register(&eef.goal)?;
            registry.register(&eef.weight)?;
        }
        Ok(())
    }

    fn make_constraints<R: RobotModel>(
        &self,
        robot: &R,
    ) -> Result<ConstraintMap<SoftConstraint>, ControlError> {
        let mut constraints = ConstraintMap::new();
        for eef in &self.end_effectors {
            let frame = robot
                .end_effector_frame(&eef.name)
                .ok_or_else(|| BuildError::UnknownEndEffector(eef.name.clone()))?;
            let weight = eef.weight.expression();

            let dist = frame.position().sub(&eef.goal.position()).norm();
            let bound = &dist * -self.config.position_gain;
            constraints.insert(
                Self::position_constraint(&eef.name),
                SoftConstraint::new(bound.clone(), bound, weight.clone(), dist),
            )?;

            let current = frame.rotation().reshape(9, 1);
            let goal = eef.goal.rotation().reshape(9, 1);
            let dist_r = current.sub(&goal).norm();
            let bound_r = &dist_r * -self.config.rotation_gain;
            constraints.insert(
                Self::rotation_constraint(&eef.name),
                SoftConstraint::new(bound_r.clone(), bound_r, weight, dist_r),
            )?;
        }
        Ok(constraints)
    }

    /// Every weight starts at the configured default and every goal at the
    /// current pose, so the first cycle holds still.
    fn initial_observables<R: RobotModel>(
        &self,
        robot: &R,
    ) -> Result<HashMap<String, f64>, ControlError> {
        let state = robot.observables();
        let mut values = HashMap::new();
        for eef in &self.end_effectors {
            let frame = robot
                .end_effector_frame(&eef.name)
                .ok_or_else(|| BuildError::UnknownEndEffector(eef.name.clone()))?;
            let pose = frame.eval_isometry(&state)?;
            values.extend(eef.goal.update(FrameUpdate::from_isometry(&pose)));
            values.extend(eef.weight.update(ScalarUpdate {
                v: self.config.default_weight,
            }));
        }
        Ok(values)
    }
}

/// Controller tracking end-effector goal poses.
pub type CartesianController<R, S = taskqp_qp::ClarabelSolver> = Controller<R, CartesianTask, S>;

impl<R: RobotModel> Controller<R, CartesianTask> {
    /// Build a Cartesian controller with the Clarabel backend.
    pub fn cartesian(robot: R, config: &TaskQpConfig) -> Result<Self, ControlError> {
        let task = CartesianTask::new(&robot, config.cartesian.clone());
        Self::with_config(robot, task, config)
    }
}

impl<R: RobotModel, S: QpSolver> Controller<R, CartesianTask, S> {
    /// Retarget end-effectors. Takes effect on the next cycle.
    ///
    /// Nothing is changed if any end-effector is unknown.
    pub fn set_goal<'a>(
        &mut self,
        goals: impl IntoIterator<Item = (&'a str, Isometry3<f64>)>,
    ) -> Result<(), ControlError> {
        let mut updates = HashMap::new();
        for (eef, pose) in goals {
            updates.extend(self.producer().goal_update(eef, &pose)?);
        }
        self.set_observables(updates);
        Ok(())
    }

    /// Move only the goal position of an end-effector, keeping its rotation.
    pub fn set_goal_position(
        &mut self,
        end_effector: &str,
        position: &Vector3<f64>,
    ) -> Result<(), ControlError> {
        self.set_goal_components(
            end_effector,
            &[("x", position.x), ("y", position.y), ("z", position.z)],
        )
    }

    /// Update goal components by name (`qx`, `qy`, `qz`, `qw`, `x`, `y`, `z`).
    ///
    /// Unknown component names are ignored.
    pub fn set_goal_components(
        &mut self,
        end_effector: &str,
        components: &[(&str, f64)],
    ) -> Result<(), ControlError> {
        let updates = self
            .producer()
            .goal_input(end_effector)
            .ok_or_else(|| ControlError::UnknownEndEffector(end_effector.to_owned()))?
            .update_request(components);
        self.set_observables(updates);
        Ok(())
    }

    /// Change the tracking weight of an end-effector. Takes effect on the next cycle.
    pub fn set_weight(&mut self, end_effector: &str, weight: f64) -> Result<(), ControlError> {
        let updates = self.producer().weight_update(end_effector, weight)?;
        self.set_observables(updates);
        Ok(())
    }

    /// Goal pose currently held for an end-effector.
    pub fn goal(&self, end_effector: &str) -> Option<Isometry3<f64>> {
        self.producer()
            .goal_input(end_effector)?
            .read(&self.observables())
    }

    /// Current pose of an end-effector, from the robot state.
    pub fn end_effector_pose(&self, end_effector: &str) -> Result<Isometry3<f64>, ControlError> {
        let frame = self
            .robot()
            .end_effector_frame(end_effector)
            .ok_or_else(|| ControlError::UnknownEndEffector(end_effector.to_owned()))?;
        Ok(frame.eval_isometry(&self.robot().observables())?)
    }

    /// Distance between current and goal position of an end-effector.
    pub fn position_error(&self, end_effector: &str) -> Result<f64, ControlError> {
        let goal = self
            .goal(end_effector)
            .ok_or_else(|| ControlError::UnknownEndEffector(end_effector.to_owned()))?;
        let current = self.end_effector_pose(end_effector)?;
        Ok((current.translation.vector - goal.translation.vector).norm())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskqp_test_utils::SingleJointRobot;

    fn task() -> CartesianTask {
        CartesianTask::new(&SingleJointRobot::new(0.0), CartesianConfig::default())
    }

    #[test]
    fn inputs_are_namespaced_by_end_effector() {
        let task = task();
        let eef = SingleJointRobot::END_EFFECTOR;
        assert_eq!(task.end_effectors().collect::<Vec<_>>(), vec![eef]);
        assert_eq!(
            task.weight_input(eef).unwrap().symbol_name(),
            format!("{eef}__v__sc_w")
        );
        let goal_symbols: Vec<String> = task
            .goal_input(eef)
            .unwrap()
            .array()
            .symbols()
            .map(|s| s.name().to_owned())
            .collect();
        assert_eq!(goal_symbols[0], format!("{eef}__qx__goal"));
        assert_eq!(goal_symbols[6], format!("{eef}__z__goal"));
    }

    #[test]
    fn two_constraints_per_end_effector() {
        let robot = SingleJointRobot::new(0.0);
        let constraints = task().make_constraints(&robot).unwrap();
        let names: Vec<&str> = constraints.names().collect();
        assert_eq!(names, vec!["align tip position", "align tip rotation"]);
    }

    #[test]
    fn initial_goal_is_current_pose() {
        let robot = SingleJointRobot::new(0.3);
        let task = CartesianTask::new(&robot, CartesianConfig::default());
        let values = task.initial_observables(&robot).unwrap();
        let goal = task.goal_input("tip").unwrap().read(&values).unwrap();
        let current = robot
            .end_effector_frame("tip")
            .unwrap()
            .eval_isometry(&robot.observables())
            .unwrap();
        approx::assert_relative_eq!(
            goal.to_homogeneous(),
            current.to_homogeneous(),
            epsilon = 1e-12
        );
        approx::assert_relative_eq!(values["tip__v__sc_w"], 1.0);
    }

    #[test]
    fn negative_weight_rejected() {
        let err = task().weight_update("tip", -1.0).unwrap_err();
        assert!(matches!(err, ControlError::InvalidWeight { .. }));
    }

    #[test]
    fn unknown_end_effector_rejected() {
        let err = task()
            .goal_update("gripper", &Isometry3::identity())
            .unwrap_err();
        assert!(matches!(err, ControlError::UnknownEndEffector(_)));
    }

    #[test]
    fn gain_scales_bounds() {
        let robot = SingleJointRobot::new(0.0);
        let config = CartesianConfig {
            position_gain: 2.0,
            ..CartesianConfig::default()
        };
        let task = CartesianTask::new(&robot, config);
        let constraints = task.make_constraints(&robot).unwrap();
        let mut values = robot.observables();
        values.extend(task.weight_update("tip", 1.0).unwrap());
        let goal = Isometry3::translation(0.0, 0.0, 0.0);
        values.extend(task.goal_update("tip", &goal).unwrap());

        let position = constraints.get("align tip position").unwrap();
        let dist = position.expression.eval(&values).unwrap();
        let lower = position.lower.eval(&values).unwrap();
        assert!(dist > 0.0);
        approx::assert_relative_eq!(lower, -2.0 * dist, epsilon = 1e-12);
    }
}
