//! A [`RobotModel`] backed by URDF kinematic chains.

use std::collections::HashMap;
use std::path::Path;

use nalgebra::Isometry3;
use tracing::debug;

use taskqp_core::{BuildError, RobotConfig};
use taskqp_expr::{Expr, Frame, Symbol};
use taskqp_qp::{ConstraintMap, HardConstraint, JointConstraint, JointVelocities};
use taskqp_urdf::{JointType, UrdfModel};

use crate::chain::KinematicChain;
use crate::error::RobotError;
use crate::model::RobotModel;

/// A joint whose velocity the controller commands.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlledJoint {
    pub name: String,
    /// `(lower, upper)` position limits. `None` for continuous joints.
    pub position_limits: Option<(f64, f64)>,
    /// Symmetric velocity limit (rad/s or m/s).
    pub velocity_limit: f64,
}

impl ControlledJoint {
    fn clamp(&self, position: f64) -> f64 {
        match self.position_limits {
            Some((lower, upper)) => position.clamp(lower, upper),
            None => position,
        }
    }
}

#[derive(Debug, Clone)]
struct EndEffector {
    chain: KinematicChain,
    frame: Frame,
    /// Index into `ChainRobot::joints` of every chain joint, in chain order.
    joint_indices: Vec<usize>,
}

/// Serial chains from a URDF root to one or more end-effector links.
///
/// Every actuated joint on any end-effector chain is controlled. Joints are
/// ordered by first appearance, walking the end-effectors in the order given.
#[derive(Debug, Clone)]
pub struct ChainRobot {
    name: String,
    joints: Vec<ControlledJoint>,
    end_effectors: Vec<EndEffector>,
    positions: Vec<f64>,
    joint_weight: f64,
}

impl ChainRobot {
    /// Build from a parsed URDF and the end-effector link names.
    ///
    /// Joint positions start at zero, clamped into their limits.
    pub fn from_urdf<I, S>(
        model: &UrdfModel,
        end_effector_links: I,
        config: &RobotConfig,
    ) -> Result<Self, RobotError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        config.validate()?;

        let mut joints: Vec<ControlledJoint> = Vec::new();
        let mut end_effectors: Vec<EndEffector> = Vec::new();

        for link in end_effector_links {
            let link = link.as_ref();
            if end_effectors.iter().any(|e| e.chain.tip() == link) {
                continue;
            }
            let chain = KinematicChain::from_model(model, link)?;
            if chain.dof() == 0 {
                return Err(RobotError::EmptyChain(link.to_owned()));
            }

            let mut joint_indices = Vec::with_capacity(chain.dof());
            for name in chain.joint_names() {
                let index = match joints.iter().position(|j| j.name == name) {
                    Some(index) => index,
                    None => {
                        joints.push(controlled_joint(model, name, config)?);
                        joints.len() - 1
                    }
                };
                joint_indices.push(index);
            }

            let frame = chain.symbolic_frame();
            end_effectors.push(EndEffector {
                chain,
                frame,
                joint_indices,
            });
        }

        if end_effectors.is_empty() {
            return Err(RobotError::NoEndEffectors);
        }

        let positions = joints.iter().map(|j| j.clamp(0.0)).collect();

        debug!(
            robot = %model.name,
            joints = joints.len(),
            end_effectors = end_effectors.len(),
            "built chain robot"
        );

        Ok(Self {
            name: model.name.clone(),
            joints,
            end_effectors,
            positions,
            joint_weight: config.joint_weight,
        })
    }

    /// Parse a URDF string and build.
    pub fn from_urdf_str<I, S>(
        xml: &str,
        end_effector_links: I,
        config: &RobotConfig,
    ) -> Result<Self, RobotError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let model = taskqp_urdf::parse_string(xml)?;
        Self::from_urdf(&model, end_effector_links, config)
    }

    /// Load a URDF file and build.
    pub fn from_urdf_file<I, S>(
        path: impl AsRef<Path>,
        end_effector_links: I,
        config: &RobotConfig,
    ) -> Result<Self, RobotError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let model = taskqp_urdf::parse_file(path)?;
        Self::from_urdf(&model, end_effector_links, config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Controlled joints, in QP column order.
    pub fn joints(&self) -> &[ControlledJoint] {
        &self.joints
    }

    pub fn dof(&self) -> usize {
        self.joints.len()
    }

    /// Current position of a controlled joint.
    pub fn position(&self, joint: &str) -> Option<f64> {
        self.index_of(joint).map(|i| self.positions[i])
    }

    /// Current positions, in QP column order.
    pub fn positions(&self) -> Vec<(&str, f64)> {
        self.joints
            .iter()
            .zip(&self.positions)
            .map(|(j, &q)| (j.name.as_str(), q))
            .collect()
    }

    /// Overwrite joint positions. Values are taken as given, without clamping.
    pub fn set_joint_positions<'a>(
        &mut self,
        positions: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> Result<(), RobotError> {
        for (joint, value) in positions {
            let index = self.checked_index(joint, value)?;
            self.positions[index] = value;
        }
        Ok(())
    }

    /// Advance joint positions by `velocity * dt`, clamped into position limits.
    pub fn integrate(&mut self, velocities: &JointVelocities, dt: f64) -> Result<(), RobotError> {
        for (joint, velocity) in velocities.iter() {
            let index = self.checked_index(joint, velocity)?;
            let next = self.positions[index] + velocity * dt;
            self.positions[index] = self.joints[index].clamp(next);
        }
        Ok(())
    }

    /// Numeric pose of an end-effector at the current joint positions.
    pub fn end_effector_pose(&self, name: &str) -> Option<Isometry3<f64>> {
        let eef = self.end_effector(name)?;
        let q: Vec<f64> = eef.joint_indices.iter().map(|&i| self.positions[i]).collect();
        Some(eef.chain.forward_kinematics(&q))
    }

    /// Kinematic chain ending at an end-effector.
    pub fn chain(&self, name: &str) -> Option<&KinematicChain> {
        self.end_effector(name).map(|e| &e.chain)
    }

    fn end_effector(&self, name: &str) -> Option<&EndEffector> {
        self.end_effectors.iter().find(|e| e.chain.tip() == name)
    }

    fn index_of(&self, joint: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == joint)
    }

    fn checked_index(&self, joint: &str, value: f64) -> Result<usize, RobotError> {
        let index = self
            .index_of(joint)
            .ok_or_else(|| RobotError::UnknownJoint(joint.to_owned()))?;
        if !value.is_finite() {
            return Err(RobotError::NonFinite {
                joint: joint.to_owned(),
                value,
            });
        }
        Ok(index)
    }
}

fn controlled_joint(
    model: &UrdfModel,
    name: &str,
    config: &RobotConfig,
) -> Result<ControlledJoint, RobotError> {
    let data = model.joint(name)?;
    let position_limits = match data.joint_type {
        JointType::Continuous => None,
        _ => data.limits.position(),
    };
    Ok(ControlledJoint {
        name: name.to_owned(),
        position_limits,
        velocity_limit: data
            .limits
            .velocity
            .unwrap_or(config.velocity_limit_fallback),
    })
}

impl RobotModel for ChainRobot {
    fn joint_constraints(&self) -> Result<ConstraintMap<JointConstraint>, BuildError> {
        ConstraintMap::try_from_iter(self.joints.iter().map(|j| {
            (
                j.name.clone(),
                JointConstraint::new(-j.velocity_limit, j.velocity_limit, self.joint_weight),
            )
        }))
    }

    /// One position-limit constraint per limited joint: the velocity step
    /// may not carry the joint past either limit.
    fn hard_constraints(&self) -> Result<ConstraintMap<HardConstraint>, BuildError> {
        ConstraintMap::try_from_iter(self.joints.iter().filter_map(|j| {
            let (lower, upper) = j.position_limits?;
            let q = Expr::from(Symbol::new(&j.name));
            Some((
                format!("{} position limits", j.name),
                HardConstraint::new(lower - &q, upper - &q, q),
            ))
        }))
    }

    fn end_effectors(&self) -> Vec<String> {
        self.end_effectors
            .iter()
            .map(|e| e.chain.tip().to_owned())
            .collect()
    }

    fn end_effector_frame(&self, name: &str) -> Option<Frame> {
        self.end_effector(name).map(|e| e.frame.clone())
    }

    fn observables(&self) -> HashMap<String, f64> {
        self.joints
            .iter()
            .zip(&self.positions)
            .map(|(j, &q)| (j.name.clone(), q))
            .collect()
    }

    fn joint_symbol(&self, name: &str) -> Option<Symbol> {
        self.index_of(name).map(|_| Symbol::new(name))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use taskqp_test_utils::Y_ARM_URDF as Y_ARM;

    fn robot() -> ChainRobot {
        ChainRobot::from_urdf_str(Y_ARM, ["left_tip", "right"], &RobotConfig::default()).unwrap()
    }

    #[test]
    fn joints_in_first_appearance_order() {
        let robot = robot();
        let names: Vec<&str> = robot.joints().iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["waist", "left_joint", "right_joint"]);
        assert_eq!(robot.dof(), 3);
        assert_eq!(robot.end_effectors(), vec!["left_tip", "right"]);
    }

    #[test]
    fn initial_positions_clamped_into_limits() {
        let robot = robot();
        assert_eq!(robot.position("waist"), Some(0.0));
        assert_eq!(robot.position("left_joint"), Some(0.1));
        assert_eq!(robot.position("right_joint"), Some(0.0));
    }

    #[test]
    fn joint_constraints_use_velocity_limits() {
        let robot = robot();
        let joints = robot.joint_constraints().unwrap();
        let names: Vec<&str> = joints.names().collect();
        assert_eq!(names, vec!["waist", "left_joint", "right_joint"]);

        let empty = HashMap::new();
        let waist = joints.get("waist").unwrap();
        // No velocity in the URDF: the configured fallback applies.
        assert_relative_eq!(waist.upper.eval(&empty).unwrap(), 1.0);
        assert_relative_eq!(waist.weight.eval(&empty).unwrap(), 0.001);
        let right = joints.get("right_joint").unwrap();
        assert_relative_eq!(right.lower.eval(&empty).unwrap(), -0.25);
    }

    #[test]
    fn hard_constraints_only_for_limited_joints() {
        let mut robot = robot();
        robot.set_joint_positions([("left_joint", 0.4)]).unwrap();
        let hard = robot.hard_constraints().unwrap();
        let names: Vec<&str> = hard.names().collect();
        assert_eq!(
            names,
            vec!["left_joint position limits", "right_joint position limits"]
        );

        let obs = robot.observables();
        let c = hard.get("left_joint position limits").unwrap();
        assert_relative_eq!(c.lower.eval(&obs).unwrap(), 0.1 - 0.4);
        assert_relative_eq!(c.upper.eval(&obs).unwrap(), 1.0 - 0.4);
        assert_eq!(c.expression.as_symbol().map(Symbol::name), Some("left_joint"));
    }

    #[test]
    fn symbolic_frame_tracks_state() {
        let mut robot = robot();
        robot
            .set_joint_positions([("waist", 0.3), ("left_joint", 0.7)])
            .unwrap();
        let frame = robot.end_effector_frame("left_tip").unwrap();
        let symbolic = frame.eval_isometry(&robot.observables()).unwrap();
        let numeric = robot.end_effector_pose("left_tip").unwrap();
        assert_relative_eq!(
            symbolic.to_homogeneous(),
            numeric.to_homogeneous(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn integrate_clamps_to_limits() {
        let mut robot = robot();
        let v = JointVelocities::new(vec![
            ("waist".into(), 10.0),
            ("right_joint".into(), 1.0),
        ]);
        robot.integrate(&v, 1.0).unwrap();
        assert_relative_eq!(robot.position("waist").unwrap(), 10.0);
        assert_relative_eq!(robot.position("right_joint").unwrap(), 0.5);
    }

    #[test]
    fn unknown_joint_rejected() {
        let mut robot = robot();
        assert!(matches!(
            robot.set_joint_positions([("neck", 0.0)]),
            Err(RobotError::UnknownJoint(_))
        ));
        assert!(robot.joint_symbol("neck").is_none());
        assert_eq!(robot.joint_symbol("waist"), Some(Symbol::new("waist")));
    }

    #[test]
    fn non_finite_position_rejected() {
        let mut robot = robot();
        assert!(matches!(
            robot.set_joint_positions([("waist", f64::NAN)]),
            Err(RobotError::NonFinite { .. })
        ));
    }

    #[test]
    fn no_end_effectors_rejected() {
        let err = ChainRobot::from_urdf_str(Y_ARM, Vec::<&str>::new(), &RobotConfig::default())
            .unwrap_err();
        assert!(matches!(err, RobotError::NoEndEffectors));
    }

    #[test]
    fn root_as_end_effector_rejected() {
        let err = ChainRobot::from_urdf_str(Y_ARM, ["base"], &RobotConfig::default()).unwrap_err();
        assert!(matches!(err, RobotError::EmptyChain(_)));
    }

    #[test]
    fn duplicate_end_effector_collapsed() {
        let robot =
            ChainRobot::from_urdf_str(Y_ARM, ["right", "right"], &RobotConfig::default()).unwrap();
        assert_eq!(robot.end_effectors(), vec!["right"]);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = RobotConfig {
            velocity_limit_fallback: 0.0,
            ..RobotConfig::default()
        };
        assert!(matches!(
            ChainRobot::from_urdf_str(Y_ARM, ["right"], &config),
            Err(RobotError::Config(_))
        ));
    }
}
