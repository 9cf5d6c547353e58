//! URDF descriptions shared by tests.

use taskqp_core::RobotConfig;
use taskqp_robot::ChainRobot;

/// Two revolute joints about z with unit-length links in the xy-plane.
///
/// End-effector link: `tool`. At zero the tool sits at `(2, 0, 0)`.
pub const PLANAR_ARM_URDF: &str = r#"
<robot name="planar_arm">
    <link name="base"/>
    <link name="upper"/>
    <link name="lower"/>
    <link name="tool"/>
    <joint name="shoulder" type="revolute">
        <parent link="base"/><child link="upper"/>
        <axis xyz="0 0 1"/>
        <limit lower="-3" upper="3" effort="10" velocity="2"/>
    </joint>
    <joint name="elbow" type="revolute">
        <parent link="upper"/><child link="lower"/>
        <origin xyz="1 0 0"/>
        <axis xyz="0 0 1"/>
        <limit lower="-3" upper="3" effort="10" velocity="2"/>
    </joint>
    <joint name="tool_fixed" type="fixed">
        <parent link="lower"/><child link="tool"/>
        <origin xyz="1 0 0"/>
    </joint>
</robot>
"#;

/// Vertical two-link arm with z-axis joints (tool at `z = 0.6` at zero).
pub const TWO_LINK_ARM_URDF: &str = r#"
<robot name="two_link_arm">
    <link name="base"/>
    <link name="upper_arm"/>
    <link name="forearm"/>
    <link name="end_effector"/>
    <joint name="shoulder" type="revolute">
        <parent link="base"/><child link="upper_arm"/>
        <origin xyz="0 0 0.05" rpy="0 0 0"/>
        <axis xyz="0 0 1"/>
        <limit lower="-2.617" upper="2.617" effort="50" velocity="3"/>
    </joint>
    <joint name="elbow" type="revolute">
        <parent link="upper_arm"/><child link="forearm"/>
        <origin xyz="0 0 0.3" rpy="0 0 0"/>
        <axis xyz="0 1 0"/>
        <limit lower="-2.094" upper="2.094" effort="30" velocity="5"/>
    </joint>
    <joint name="ee_fixed" type="fixed">
        <parent link="forearm"/><child link="end_effector"/>
        <origin xyz="0 0 0.25"/>
    </joint>
</robot>
"#;

/// Branching robot with two end-effectors on a shared continuous waist.
///
/// `left_tip` hangs off a revolute joint limited to `[0.1, 1.0]`, and `right`
/// rides a prismatic joint along x. Only the two branch joints have position
/// limits.
pub const Y_ARM_URDF: &str = r#"
<robot name="y_arm">
    <link name="base"/>
    <link name="torso"/>
    <link name="left"/>
    <link name="right"/>
    <link name="left_tip"/>
    <joint name="waist" type="continuous">
        <parent link="base"/><child link="torso"/>
        <axis xyz="0 0 1"/>
    </joint>
    <joint name="left_joint" type="revolute">
        <parent link="torso"/><child link="left"/>
        <origin xyz="0 0.2 0"/>
        <axis xyz="0 0 1"/>
        <limit lower="0.1" upper="1.0" effort="10" velocity="2"/>
    </joint>
    <joint name="right_joint" type="prismatic">
        <parent link="torso"/><child link="right"/>
        <origin xyz="0 -0.2 0"/>
        <axis xyz="1 0 0"/>
        <limit lower="-0.5" upper="0.5" effort="10" velocity="0.25"/>
    </joint>
    <joint name="left_fixed" type="fixed">
        <parent link="left"/><child link="left_tip"/>
        <origin xyz="0.5 0 0"/>
    </joint>
</robot>
"#;

/// [`PLANAR_ARM_URDF`] as a [`ChainRobot`] with end-effector `tool`.
///
/// # Panics
///
/// Never for the embedded description.
pub fn planar_arm() -> ChainRobot {
    ChainRobot::from_urdf_str(PLANAR_ARM_URDF, ["tool"], &RobotConfig::default())
        .expect("planar arm fixture is valid")
}

/// [`Y_ARM_URDF`] as a [`ChainRobot`] with end-effectors `left_tip` and `right`.
///
/// # Panics
///
/// Never for the embedded description.
pub fn y_arm() -> ChainRobot {
    ChainRobot::from_urdf_str(Y_ARM_URDF, ["left_tip", "right"], &RobotConfig::default())
        .expect("y arm fixture is valid")
}
