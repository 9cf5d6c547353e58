//! URDF XML parsing using `urdf-rs`.
//!
//! Converts `urdf_rs` types into the crate's [`UrdfModel`].

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use tracing::debug;

use crate::error::UrdfError;
use crate::types::{JointData, JointLimits, JointType, Origin, UrdfModel};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a URDF file from disk.
pub fn parse_file(path: impl AsRef<Path>) -> Result<UrdfModel, UrdfError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| UrdfError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_string(&content)
}

/// Parse a URDF XML string.
pub fn parse_string(xml: &str) -> Result<UrdfModel, UrdfError> {
    let robot = urdf_rs::read_from_string(xml).map_err(|e| UrdfError::Parse(e.to_string()))?;
    let model = convert_robot(&robot)?;
    debug!(
        robot = %model.name,
        links = model.links.len(),
        joints = model.joints.len(),
        dof = model.dof(),
        root = %model.root_link,
        "parsed URDF"
    );
    Ok(model)
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

fn convert_robot(robot: &urdf_rs::Robot) -> Result<UrdfModel, UrdfError> {
    let links: BTreeSet<String> = robot.links.iter().map(|l| l.name.clone()).collect();

    let joints: BTreeMap<String, JointData> = robot
        .joints
        .iter()
        .map(|j| convert_joint(j).map(|jd| (jd.name.clone(), jd)))
        .collect::<Result<_, _>>()?;

    for joint in joints.values() {
        for link in [&joint.parent, &joint.child] {
            if !links.contains(link) {
                return Err(UrdfError::MissingLink(link.clone()));
            }
        }
    }

    // Root link = the first link (by name) that is never a child of any joint.
    let child_links: HashSet<&str> = joints.values().map(|j| j.child.as_str()).collect();
    let root_link = links
        .iter()
        .find(|name| !child_links.contains(name.as_str()))
        .ok_or(UrdfError::NoRootLink)?
        .clone();

    Ok(UrdfModel {
        name: robot.name.clone(),
        links,
        joints,
        root_link,
    })
}

fn convert_joint(joint: &urdf_rs::Joint) -> Result<JointData, UrdfError> {
    Ok(JointData {
        name: joint.name.clone(),
        joint_type: convert_joint_type(&joint.joint_type)?,
        parent: joint.parent.link.clone(),
        child: joint.child.link.clone(),
        origin: convert_pose(&joint.origin),
        axis: vec3(&joint.axis.xyz),
        limits: convert_limits(&joint.limit),
    })
}

fn convert_joint_type(jt: &urdf_rs::JointType) -> Result<JointType, UrdfError> {
    match jt {
        urdf_rs::JointType::Revolute => Ok(JointType::Revolute),
        urdf_rs::JointType::Continuous => Ok(JointType::Continuous),
        urdf_rs::JointType::Prismatic => Ok(JointType::Prismatic),
        urdf_rs::JointType::Fixed => Ok(JointType::Fixed),
        urdf_rs::JointType::Floating => Ok(JointType::Floating),
        urdf_rs::JointType::Planar => Ok(JointType::Planar),
        urdf_rs::JointType::Spherical => Err(UrdfError::UnsupportedJointType("Spherical".into())),
    }
}

fn convert_limits(limit: &urdf_rs::JointLimit) -> JointLimits {
    // urdf-rs defaults lower/upper to 0.0 for joints without limits.
    // Equal bounds are read as "no position limits".
    let has_limits = (limit.lower - limit.upper).abs() > f64::EPSILON;
    JointLimits {
        lower: has_limits.then_some(limit.lower),
        upper: has_limits.then_some(limit.upper),
        effort: limit.effort,
        velocity: (limit.velocity > 0.0).then_some(limit.velocity),
    }
}

fn convert_pose(pose: &urdf_rs::Pose) -> Origin {
    Origin {
        xyz: vec3(&pose.xyz),
        rpy: vec3(&pose.rpy),
    }
}

const fn vec3(v: &[f64; 3]) -> [f64; 3] {
    [v[0], v[1], v[2]]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_URDF: &str = r#"
        <robot name="test_robot">
            <link name="base_link"/>
        </robot>
    "#;

    const ARM_URDF: &str = r#"
        <robot name="arm">
            <link name="base"/>
            <link name="link1"/>
            <link name="link2"/>
            <link name="tool"/>
            <joint name="joint1" type="revolute">
                <parent link="base"/>
                <child link="link1"/>
                <origin xyz="0 0 0.5" rpy="0 0 0"/>
                <axis xyz="0 0 1"/>
                <limit lower="-1.57" upper="1.57" effort="100" velocity="5"/>
            </joint>
            <joint name="joint2" type="continuous">
                <parent link="link1"/>
                <child link="link2"/>
                <axis xyz="0 1 0"/>
            </joint>
            <joint name="tool_fixed" type="fixed">
                <parent link="link2"/>
                <child link="tool"/>
                <origin xyz="0.1 0 0"/>
            </joint>
        </robot>
    "#;

    #[test]
    fn parse_minimal_urdf() {
        let model = parse_string(MINIMAL_URDF).unwrap();
        assert_eq!(model.name, "test_robot");
        assert_eq!(model.links.len(), 1);
        assert!(model.joints.is_empty());
        assert_eq!(model.root_link, "base_link");
    }

    #[test]
    fn parse_arm() {
        let model = parse_string(ARM_URDF).unwrap();
        assert_eq!(model.links.len(), 4);
        assert_eq!(model.joints.len(), 3);
        assert_eq!(model.dof(), 2);
        assert_eq!(model.root_link, "base");
    }

    #[test]
    fn joint_types_parsed() {
        let model = parse_string(ARM_URDF).unwrap();
        assert_eq!(model.joint("joint1").unwrap().joint_type, JointType::Revolute);
        assert_eq!(model.joint("joint2").unwrap().joint_type, JointType::Continuous);
        assert_eq!(model.joint("tool_fixed").unwrap().joint_type, JointType::Fixed);
    }

    #[test]
    fn limits_origin_and_axis_parsed() {
        let model = parse_string(ARM_URDF).unwrap();
        let joint = model.joint("joint1").unwrap();
        assert_eq!(joint.limits.position(), Some((-1.57, 1.57)));
        assert_eq!(joint.limits.velocity, Some(5.0));
        assert!((joint.origin.xyz[2] - 0.5).abs() < f64::EPSILON);
        assert!((joint.axis[2] - 1.0).abs() < f64::EPSILON);
        assert_eq!(joint.parent, "base");
        assert_eq!(joint.child, "link1");
    }

    #[test]
    fn continuous_joint_has_no_limits() {
        let model = parse_string(ARM_URDF).unwrap();
        let joint = model.joint("joint2").unwrap();
        assert!(joint.limits.position().is_none());
        assert!(joint.limits.velocity.is_none());
    }

    #[test]
    fn path_through_fixed_joint() {
        let model = parse_string(ARM_URDF).unwrap();
        let names: Vec<&str> = model
            .path_to_link("tool")
            .unwrap()
            .iter()
            .map(|j| j.name.as_str())
            .collect();
        assert_eq!(names, vec!["joint1", "joint2", "tool_fixed"]);
    }

    #[test]
    fn parse_invalid_xml() {
        assert!(matches!(parse_string("<not valid urdf>"), Err(UrdfError::Parse(_))));
    }

    #[test]
    fn parse_file_not_found() {
        let err = parse_file("/nonexistent/robot.urdf").unwrap_err();
        assert!(matches!(err, UrdfError::Io { .. }));
    }
}
