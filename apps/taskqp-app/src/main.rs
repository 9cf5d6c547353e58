//! taskqp command-line demo.
//!
//! Provides two modes of operation:
//! - `run`: Drive a URDF arm's end-effector to a goal position in a
//!   kinematic closed loop and print the remaining distance every step
//! - `info`: Print workspace crate versions

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use nalgebra::Vector3;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taskqp_control::{CartesianController, ControlError};
use taskqp_core::{ConfigError, CycleError, TaskQpConfig};
use taskqp_robot::{ChainRobot, RobotError};

/// Six-joint arm used when no URDF is given. The origins carry a bend so
/// that the zero configuration is away from the stretched-out singularity.
const DEMO_ARM_URDF: &str = r#"
<robot name="demo_arm">
    <link name="base"/>
    <link name="turret"/>
    <link name="upper_arm"/>
    <link name="forearm"/>
    <link name="wrist_1"/>
    <link name="wrist_2"/>
    <link name="flange"/>
    <link name="tool"/>
    <joint name="base_yaw" type="revolute">
        <parent link="base"/><child link="turret"/>
        <origin xyz="0 0 0.1"/>
        <axis xyz="0 0 1"/>
        <limit lower="-3.0" upper="3.0" effort="40" velocity="1.5"/>
    </joint>
    <joint name="shoulder" type="revolute">
        <parent link="turret"/><child link="upper_arm"/>
        <origin xyz="0 0 0.1" rpy="0 0.4 0"/>
        <axis xyz="0 1 0"/>
        <limit lower="-2.5" upper="2.5" effort="40" velocity="1.5"/>
    </joint>
    <joint name="elbow" type="revolute">
        <parent link="upper_arm"/><child link="forearm"/>
        <origin xyz="0 0 0.4" rpy="0 0.9 0"/>
        <axis xyz="0 1 0"/>
        <limit lower="-2.5" upper="2.5" effort="30" velocity="1.5"/>
    </joint>
    <joint name="wrist_roll" type="revolute">
        <parent link="forearm"/><child link="wrist_1"/>
        <origin xyz="0 0 0.3"/>
        <axis xyz="0 0 1"/>
        <limit lower="-3.0" upper="3.0" effort="10" velocity="2.0"/>
    </joint>
    <joint name="wrist_pitch" type="revolute">
        <parent link="wrist_1"/><child link="wrist_2"/>
        <origin xyz="0 0 0.05" rpy="0 0.5 0"/>
        <axis xyz="0 1 0"/>
        <limit lower="-2.5" upper="2.5" effort="10" velocity="2.0"/>
    </joint>
    <joint name="wrist_yaw" type="revolute">
        <parent link="wrist_2"/><child link="flange"/>
        <origin xyz="0 0 0.05"/>
        <axis xyz="0 0 1"/>
        <limit lower="-3.0" upper="3.0" effort="10" velocity="2.0"/>
    </joint>
    <joint name="tool_fixed" type="fixed">
        <parent link="flange"/><child link="tool"/>
        <origin xyz="0 0 0.08"/>
    </joint>
</robot>
"#;

const DEMO_END_EFFECTOR: &str = "tool";

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Joint-velocity control of robot end-effectors by quadratic programming.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive an end-effector to a goal position and print the distance per step.
    Run(RunArgs),

    /// Print crate information.
    Info,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// URDF file to load. A built-in six-joint arm is used when omitted.
    #[arg(short, long)]
    urdf: Option<PathBuf>,

    /// End-effector link names. The first one is driven to the goal.
    #[arg(short, long = "ee", num_args = 1..)]
    end_effectors: Vec<String>,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Goal position `x y z` in the root frame. Defaults to a small offset
    /// from the current end-effector position.
    #[arg(short, long, num_args = 3, allow_negative_numbers = true)]
    goal: Option<Vec<f64>>,

    /// Number of control cycles.
    #[arg(short, long, default_value_t = 200)]
    steps: u32,

    /// Integration step in seconds.
    #[arg(long, default_value_t = 0.05)]
    dt: f64,

    /// Stop early once the distance drops below this value.
    #[arg(short, long, default_value_t = 1e-4)]
    tolerance: f64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Robot(#[from] RobotError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("cycle {cycle} produced no command: {source}")]
    Cycle { cycle: u32, source: CycleError },

    #[error("invalid argument: {0}")]
    Argument(String),
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn load_robot(args: &RunArgs, config: &TaskQpConfig) -> Result<ChainRobot, AppError> {
    match &args.urdf {
        Some(path) => {
            if args.end_effectors.is_empty() {
                return Err(AppError::Argument(
                    "--ee is required together with --urdf".into(),
                ));
            }
            Ok(ChainRobot::from_urdf_file(
                path,
                &args.end_effectors,
                &config.robot,
            )?)
        }
        None => {
            let links = if args.end_effectors.is_empty() {
                vec![DEMO_END_EFFECTOR.to_owned()]
            } else {
                args.end_effectors.clone()
            };
            Ok(ChainRobot::from_urdf_str(
                DEMO_ARM_URDF,
                &links,
                &config.robot,
            )?)
        }
    }
}

fn run(args: &RunArgs) -> Result<(), AppError> {
    if !(args.dt.is_finite() && args.dt > 0.0) {
        return Err(AppError::Argument(format!(
            "--dt must be positive, got {}",
            args.dt
        )));
    }

    let config = match &args.config {
        Some(path) => TaskQpConfig::from_file(path)?,
        None => TaskQpConfig::default(),
    };

    let robot = load_robot(args, &config)?;
    let eef = args
        .end_effectors
        .first()
        .map_or(DEMO_END_EFFECTOR, String::as_str)
        .to_owned();

    let mut controller = CartesianController::cartesian(robot, &config)?;

    let start = controller.end_effector_pose(&eef)?.translation.vector;
    let goal = match args.goal.as_deref() {
        Some(&[x, y, z]) => Vector3::new(x, y, z),
        Some(other) => {
            return Err(AppError::Argument(format!(
                "--goal takes 3 values, got {}",
                other.len()
            )));
        }
        None => start + Vector3::new(0.1, 0.1, -0.05),
    };
    controller.set_goal_position(&eef, &goal)?;

    println!(
        "robot {}: {} joints, end-effector {eef}",
        controller.robot().name(),
        controller.robot().dof()
    );
    println!(
        "start ({:.4}, {:.4}, {:.4}) -> goal ({:.4}, {:.4}, {:.4})",
        start.x, start.y, start.z, goal.x, goal.y, goal.z
    );
    info!(steps = args.steps, dt = args.dt, "closed loop started");

    let mut distance = controller.position_error(&eef)?;
    for step in 1..=args.steps {
        let velocities = controller
            .update_observables([])
            .map_err(|source| AppError::Cycle {
                cycle: step,
                source,
            })?;
        controller.robot_mut().integrate(&velocities, args.dt)?;

        distance = controller.position_error(&eef)?;
        println!("step {step}: distance={distance:.6}");
        if distance < args.tolerance {
            break;
        }
    }

    if distance >= args.tolerance {
        warn!(distance, "goal not reached after the last step");
    }
    println!("\nfinal joint positions:");
    for (joint, position) in controller.robot().positions() {
        println!("  {joint:<16} {position:+.5}");
    }
    Ok(())
}

fn run_info() {
    println!("taskqp v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("crates:");
    println!("  taskqp-core     {}", env!("CARGO_PKG_VERSION"));
    println!("  taskqp-expr     {}", env!("CARGO_PKG_VERSION"));
    println!("  taskqp-qp       {}", env!("CARGO_PKG_VERSION"));
    println!("  taskqp-urdf     {}", env!("CARGO_PKG_VERSION"));
    println!("  taskqp-robot    {}", env!("CARGO_PKG_VERSION"));
    println!("  taskqp-control  {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("qp backend: clarabel (interior point)");
    println!("edition: 2024");
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Run(args)) => run(&args),
        Some(Commands::Info) => {
            run_info();
            Ok(())
        }
        // Default: run the built-in arm with defaults
        None => run(&RunArgs::parse_from(["run"])),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_args_parse() {
        let cli = Cli::parse_from([
            "taskqp", "run", "--ee", "tool", "--goal", "0.1", "-0.2", "0.5", "--steps", "10",
        ]);
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.end_effectors, vec!["tool"]);
        assert_eq!(args.goal, Some(vec![0.1, -0.2, 0.5]));
        assert_eq!(args.steps, 10);
    }

    #[test]
    fn demo_arm_builds() {
        let args = RunArgs::parse_from(["run"]);
        let robot = load_robot(&args, &TaskQpConfig::default()).unwrap();
        assert_eq!(robot.dof(), 6);
    }

    #[test]
    fn urdf_without_end_effector_rejected() {
        let args = RunArgs::parse_from(["run", "--urdf", "arm.urdf"]);
        assert!(matches!(
            load_robot(&args, &TaskQpConfig::default()),
            Err(AppError::Argument(_))
        ));
    }

    #[test]
    fn demo_run_completes() {
        let args = RunArgs::parse_from(["run", "--steps", "5"]);
        run(&args).unwrap();
    }
}
