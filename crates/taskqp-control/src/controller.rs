//! Controller orchestration: one QP builder per session, one solve per cycle.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use taskqp_core::{BuildError, BuilderConfig, CycleError, TaskQpConfig};
use taskqp_qp::{ClarabelSolver, ConstraintMap, JointVelocities, QpProblemBuilder, QpSolver, SoftConstraint};
use taskqp_robot::RobotModel;

use crate::error::ControlError;
use crate::input::InputRegistry;

/// Task-specific part of a controller: its inputs and soft constraints.
pub trait ConstraintProducer {
    /// Claim the symbols of every observable input this producer declares.
    fn register_inputs(&self, registry: &mut InputRegistry) -> Result<(), BuildError>;

    /// Soft constraints over robot joint symbols and this producer's inputs.
    fn make_constraints<R: RobotModel>(
        &self,
        robot: &R,
    ) -> Result<ConstraintMap<SoftConstraint>, ControlError>;

    /// Input values in place before the first cycle.
    fn initial_observables<R: RobotModel>(
        &self,
        _robot: &R,
    ) -> Result<HashMap<String, f64>, ControlError> {
        Ok(HashMap::new())
    }
}

/// A robot, a constraint producer and the QP built from both.
///
/// The constraint set is fixed at construction. Each call to
/// [`update_observables`](Self::update_observables) is one control cycle.
pub struct Controller<R, P, S = ClarabelSolver> {
    robot: R,
    producer: P,
    builder: QpProblemBuilder<S>,
    registry: InputRegistry,
    /// Names a caller may set: registered inputs plus every symbol the QP reads.
    accepted: HashSet<String>,
    /// Observable values set by callers; persist across cycles.
    values: HashMap<String, f64>,
    cycles: u64,
}

impl<R: RobotModel, P: ConstraintProducer> Controller<R, P> {
    /// Build with the Clarabel backend, validating `config` first.
    pub fn with_config(robot: R, producer: P, config: &TaskQpConfig) -> Result<Self, ControlError> {
        config.validate()?;
        Self::new(
            robot,
            producer,
            &config.builder,
            ClarabelSolver::new(config.solver.clone()),
        )
    }
}

impl<R: RobotModel, P: ConstraintProducer, S: QpSolver> Controller<R, P, S> {
    /// Snapshot the robot's joint and hard constraints together with the
    /// producer's soft constraints into one QP builder.
    pub fn new(
        robot: R,
        producer: P,
        config: &BuilderConfig,
        solver: S,
    ) -> Result<Self, ControlError> {
        let mut registry = InputRegistry::new();
        producer.register_inputs(&mut registry)?;
        if let Some(name) = robot
            .observables()
            .into_keys()
            .filter(|n| registry.contains(n))
            .min()
        {
            return Err(BuildError::DuplicateSymbol(name).into());
        }

        let joints = robot.joint_constraints()?;
        let hard = robot.hard_constraints()?;
        let soft = producer.make_constraints(&robot)?;
        let builder = QpProblemBuilder::new(&joints, &hard, &soft, config, solver)?;
        let accepted: HashSet<String> = registry
            .names()
            .map(str::to_owned)
            .chain(
                builder
                    .required_observables()
                    .iter()
                    .map(|s| s.name().to_owned()),
            )
            .collect();
        let mut values = producer.initial_observables(&robot)?;
        values.retain(|name, _| accepted.contains(name));

        debug!(
            joints = joints.len(),
            hard = hard.len(),
            soft = soft.len(),
            inputs = registry.len(),
            "controller built"
        );

        Ok(Self {
            robot,
            producer,
            builder,
            registry,
            accepted,
            values,
            cycles: 0,
        })
    }

    /// Run one control cycle.
    ///
    /// `updates` are merged into the stored observable values and kept for
    /// later cycles. Names that are neither a registered input nor read by
    /// the QP are dropped. The robot's current observables are applied last,
    /// so they override anything with the same name.
    pub fn update_observables(
        &mut self,
        updates: impl IntoIterator<Item = (String, f64)>,
    ) -> Result<JointVelocities, CycleError> {
        self.set_observables(updates);
        let observables = self.observables();
        self.cycles += 1;
        trace!(cycle = self.cycles, observables = observables.len(), "control cycle");
        self.builder.update(&observables)
    }

    /// Store observable values without running a cycle.
    ///
    /// Unknown names are dropped, as in [`update_observables`](Self::update_observables).
    pub fn set_observables(&mut self, updates: impl IntoIterator<Item = (String, f64)>) {
        let accepted = &self.accepted;
        self.values
            .extend(updates.into_iter().filter(|(name, _)| accepted.contains(name)));
    }

    /// Stored value of an observable (robot state not included).
    pub fn observable(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Everything the next cycle would read: stored values, then robot state.
    pub fn observables(&self) -> HashMap<String, f64> {
        let mut observables = self.values.clone();
        observables.extend(self.robot.observables());
        observables
    }

    pub fn robot(&self) -> &R {
        &self.robot
    }

    /// Mutable robot access, e.g. to advance its state between cycles.
    pub fn robot_mut(&mut self) -> &mut R {
        &mut self.robot
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    pub fn builder(&self) -> &QpProblemBuilder<S> {
        &self.builder
    }

    pub fn registry(&self) -> &InputRegistry {
        &self.registry
    }

    /// Number of cycles run so far.
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }
}
