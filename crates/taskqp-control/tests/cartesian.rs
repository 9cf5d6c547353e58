//! End-to-end Cartesian control on URDF arms.

use approx::assert_relative_eq;
use nalgebra::{Isometry3, Translation3, Vector3};
use taskqp_control::{CartesianController, CartesianTask, ControlError};
use taskqp_core::{BuilderConfig, CartesianConfig, CycleError, SolveError, TaskQpConfig};
use taskqp_qp::ClarabelSolver;
use taskqp_robot::{ChainRobot, RobotModel};
use taskqp_test_utils::{InfeasibleSolver, RecordingSolver, planar_arm, y_arm};

const EEF: &str = "tool";

/// Soft rows follow the two position-limit rows of the planar arm.
const POSITION_ROW: usize = 2;
const ROTATION_ROW: usize = 3;

fn arm_at(shoulder: f64, elbow: f64) -> ChainRobot {
    let mut robot = planar_arm();
    robot
        .set_joint_positions([("shoulder", shoulder), ("elbow", elbow)])
        .unwrap();
    robot
}

fn controller(robot: ChainRobot) -> CartesianController<ChainRobot> {
    CartesianController::cartesian(robot, &TaskQpConfig::default()).unwrap()
}

fn recording(robot: ChainRobot) -> CartesianController<ChainRobot, RecordingSolver> {
    let task = CartesianTask::new(&robot, CartesianConfig::default());
    CartesianController::new(
        robot,
        task,
        &BuilderConfig::default(),
        RecordingSolver::new(ClarabelSolver::default()),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Goal equals current pose
// ---------------------------------------------------------------------------

#[test]
fn goal_at_current_pose_gives_zero_bounds() {
    let mut c = controller(arm_at(0.0, 0.0));
    let v = c.update_observables([]).unwrap();

    let m = c.builder().last_matrices().unwrap();
    for row in [POSITION_ROW, ROTATION_ROW] {
        assert_eq!(m.lba[row], 0.0);
        assert_eq!(m.uba[row], 0.0);
    }
    for (_, velocity) in v.iter() {
        assert!(velocity.abs() < 1e-6);
    }
}

/// Away from the zero configuration the goal passes through a quaternion and
/// back, so the bounds are zero only up to rounding (checked to 1e-12).
#[test]
fn goal_at_current_pose_away_from_zero() {
    let mut c = controller(arm_at(0.4, -1.1));
    c.update_observables([]).unwrap();

    let m = c.builder().last_matrices().unwrap();
    for row in [POSITION_ROW, ROTATION_ROW] {
        assert!(m.lba[row].abs() < 1e-12);
        assert!(m.uba[row].abs() < 1e-12);
    }
}

#[test]
fn constraint_names_and_layout() {
    let c = controller(arm_at(0.0, 0.0));
    assert_eq!(c.builder().joint_names(), ["shoulder", "elbow"]);
    assert_eq!(
        c.builder().hard_names(),
        ["shoulder position limits", "elbow position limits"]
    );
    assert_eq!(
        c.builder().soft_names(),
        ["align tool position", "align tool rotation"]
    );
    assert_eq!(c.registry().len(), 8);
}

// ---------------------------------------------------------------------------
// Goal updates
// ---------------------------------------------------------------------------

#[test]
fn set_goal_is_reflected_next_cycle() {
    let mut c = controller(arm_at(0.3, 0.6));
    let current = c.end_effector_pose(EEF).unwrap();
    let goal = Translation3::new(0.0, 0.25, 0.0) * current;
    c.set_goal([(EEF, goal)]).unwrap();

    c.update_observables([]).unwrap();
    let m = c.builder().last_matrices().unwrap();
    assert_relative_eq!(m.lba[POSITION_ROW], -0.25, epsilon = 1e-12);
    assert_relative_eq!(m.uba[POSITION_ROW], -0.25, epsilon = 1e-12);
    assert!(m.lba[ROTATION_ROW].abs() < 1e-12);
    assert_relative_eq!(c.position_error(EEF).unwrap(), 0.25, epsilon = 1e-12);
}

#[test]
fn unknown_goal_component_is_ignored() {
    let mut c = controller(arm_at(0.0, 0.0));
    let before = c.goal(EEF).unwrap();

    c.set_goal_components(EEF, &[("x", 1.5), ("w", 9.0)]).unwrap();

    let after = c.goal(EEF).unwrap();
    assert_relative_eq!(after.translation.x, 1.5);
    assert_relative_eq!(after.translation.y, before.translation.y);
    assert_relative_eq!(after.translation.z, before.translation.z);
    assert!(c.observable("tool__w__goal").is_none());
    assert!(c.update_observables([]).is_ok());
}

#[test]
fn scaled_goal_quaternion_tracks_same_rotation() {
    let mut c = controller(arm_at(0.3, 0.6));
    let q = c.end_effector_pose(EEF).unwrap().rotation;
    c.set_goal_components(
        EEF,
        &[("qx", 2.0 * q.i), ("qy", 2.0 * q.j), ("qz", 2.0 * q.k), ("qw", 2.0 * q.w)],
    )
    .unwrap();

    c.update_observables([]).unwrap();
    let m = c.builder().last_matrices().unwrap();
    assert!(m.lba[ROTATION_ROW].abs() < 1e-12);
    assert!(m.uba[ROTATION_ROW].abs() < 1e-12);
    assert!(c.goal(EEF).unwrap().rotation.angle_to(&q) < 1e-9);
}

#[test]
fn partial_quaternion_update_matches_reported_goal() {
    let mut c = controller(arm_at(0.3, 0.6));
    c.set_goal_components(EEF, &[("qw", 1.0)]).unwrap();
    c.update_observables([]).unwrap();

    let goal = c.goal(EEF).unwrap().rotation.to_rotation_matrix();
    let current = c.end_effector_pose(EEF).unwrap().rotation.to_rotation_matrix();
    let distance = (current.matrix() - goal.matrix()).norm();
    assert!(distance > 0.01);

    let m = c.builder().last_matrices().unwrap();
    assert_relative_eq!(m.lba[ROTATION_ROW], -distance, epsilon = 1e-12);
    assert_relative_eq!(m.uba[ROTATION_ROW], -distance, epsilon = 1e-12);
}

#[test]
fn set_goal_position_keeps_rotation() {
    let mut c = controller(arm_at(0.5, 0.5));
    let before = c.goal(EEF).unwrap();
    c.set_goal_position(EEF, &Vector3::new(1.0, 1.0, 0.0)).unwrap();
    let after = c.goal(EEF).unwrap();
    assert_relative_eq!(after.rotation, before.rotation, epsilon = 1e-15);
    assert_relative_eq!(after.translation.vector, Vector3::new(1.0, 1.0, 0.0));
}

#[test]
fn unknown_end_effector_changes_nothing() {
    let mut c = controller(arm_at(0.0, 0.0));
    let before = c.goal(EEF).unwrap();
    let shifted = Isometry3::translation(0.0, 1.0, 0.0);
    let err = c
        .set_goal([(EEF, shifted), ("gripper", shifted)])
        .unwrap_err();
    assert!(matches!(err, ControlError::UnknownEndEffector(ref n) if n == "gripper"));
    assert_eq!(c.goal(EEF).unwrap(), before);
}

#[test]
fn set_weight_is_reflected_in_cost() {
    let mut c = recording(arm_at(0.2, 0.2));
    c.update_observables([]).unwrap();
    c.set_weight(EEF, 7.5).unwrap();
    c.update_observables([]).unwrap();

    let problems = c.builder().solver().problems();
    assert_eq!(problems.len(), 2);
    assert_relative_eq!(problems[0].h[(2, 2)], 1.0);
    assert_relative_eq!(problems[1].h[(2, 2)], 7.5);
    assert_relative_eq!(problems[1].h[(3, 3)], 7.5);
    // Joint regularization is untouched.
    assert_relative_eq!(problems[1].h[(0, 0)], 0.001);
    assert!(matches!(
        c.set_weight(EEF, f64::NAN),
        Err(ControlError::InvalidWeight { .. })
    ));
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

#[test]
fn infeasible_solve_produces_no_command() {
    let robot = arm_at(0.1, 0.2);
    let task = CartesianTask::new(&robot, CartesianConfig::default());
    let mut c =
        CartesianController::new(robot, task, &BuilderConfig::default(), InfeasibleSolver).unwrap();

    let err = c.update_observables([]).unwrap_err();
    assert!(matches!(err, CycleError::Solve(SolveError::Infeasible(_))));
    assert!(err.is_solve_failure());
    assert!(c.builder().last_solution().is_none());
    // The next cycle starts fresh and fails the same way.
    assert!(c.update_observables([]).is_err());
    assert_eq!(c.cycles(), 2);
}

// ---------------------------------------------------------------------------
// Closed loop
// ---------------------------------------------------------------------------

#[test]
fn closed_loop_reaches_goal() {
    let target = arm_at(0.8, 0.2).end_effector_pose(EEF).unwrap();
    let mut c = controller(arm_at(0.3, 0.9));
    c.set_goal([(EEF, target)]).unwrap();
    let initial_error = c.position_error(EEF).unwrap();
    assert!(initial_error > 0.1);

    let dt = 0.05;
    for _ in 0..300 {
        let v = c.update_observables([]).unwrap();
        c.robot_mut().integrate(&v, dt).unwrap();
    }

    assert!(c.position_error(EEF).unwrap() < 1e-3);
    assert_relative_eq!(c.robot().position("shoulder").unwrap(), 0.8, epsilon = 1e-2);
    assert_relative_eq!(c.robot().position("elbow").unwrap(), 0.2, epsilon = 1e-2);
}

#[test]
fn distance_shrinks_every_cycle() {
    let target = arm_at(-0.2, 1.1).end_effector_pose(EEF).unwrap();
    let mut c = controller(arm_at(0.0, 1.4));
    c.set_goal([(EEF, target)]).unwrap();

    let mut previous = c.position_error(EEF).unwrap();
    for _ in 0..20 {
        let v = c.update_observables([]).unwrap();
        c.robot_mut().integrate(&v, 0.05).unwrap();
        let error = c.position_error(EEF).unwrap();
        assert!(error < previous);
        previous = error;
    }
}

#[test]
fn observables_cover_every_required_symbol() {
    let c = controller(arm_at(0.0, 0.0));
    let observables = c.observables();
    for symbol in c.builder().required_observables() {
        assert!(observables.contains_key(symbol.name()), "missing {symbol}");
    }
    assert_eq!(
        c.robot().observables().len() + c.registry().len(),
        observables.len()
    );
}

// ---------------------------------------------------------------------------
// Several end-effectors
// ---------------------------------------------------------------------------

#[test]
fn inputs_and_constraints_per_end_effector() {
    let c = controller(y_arm());

    let names: Vec<&str> = c.registry().names().collect();
    assert_eq!(names.len(), 16);
    assert_eq!(
        names.iter().filter(|n| n.starts_with("left_tip__")).count(),
        8
    );
    assert_eq!(names.iter().filter(|n| n.starts_with("right__")).count(), 8);
    assert!(c.registry().contains("left_tip__qw__goal"));
    assert!(c.registry().contains("right__v__sc_w"));

    assert_eq!(
        c.builder().soft_names(),
        [
            "align left_tip position",
            "align left_tip rotation",
            "align right position",
            "align right rotation",
        ]
    );
    assert_eq!(
        c.builder().hard_names(),
        ["left_joint position limits", "right_joint position limits"]
    );
}

#[test]
fn retargeting_one_end_effector_leaves_the_other() {
    let mut c = controller(y_arm());
    let left_goal = c.goal("left_tip").unwrap();
    let right = c.end_effector_pose("right").unwrap();
    c.set_goal([("right", Translation3::new(0.1, 0.0, 0.0) * right)])
        .unwrap();

    c.update_observables([]).unwrap();
    let m = c.builder().last_matrices().unwrap();
    // Rows: two hard limits, then left position, left rotation, right
    // position, right rotation.
    assert_eq!(m.lba.len(), 6);
    for row in [2, 3, 5] {
        assert!(m.lba[row].abs() < 1e-12, "row {row}: {}", m.lba[row]);
        assert!(m.uba[row].abs() < 1e-12, "row {row}: {}", m.uba[row]);
    }
    assert_relative_eq!(m.lba[4], -0.1, epsilon = 1e-12);
    assert_relative_eq!(m.uba[4], -0.1, epsilon = 1e-12);
    assert_eq!(c.goal("left_tip").unwrap(), left_goal);
}
