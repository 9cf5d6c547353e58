//! In-memory kinematic tree of a URDF robot.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::UrdfError;

// ---------------------------------------------------------------------------
// JointType
// ---------------------------------------------------------------------------

/// URDF joint type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointType {
    /// Rotation about a single axis, with position limits.
    Revolute,
    /// Unlimited rotation about a single axis.
    Continuous,
    /// Translation along an axis, with position limits.
    Prismatic,
    /// No relative motion between parent and child.
    Fixed,
    Floating,
    Planar,
}

impl JointType {
    /// Whether this joint type has a single controllable degree of freedom.
    pub const fn is_actuated(self) -> bool {
        matches!(self, Self::Revolute | Self::Continuous | Self::Prismatic)
    }
}

// ---------------------------------------------------------------------------
// JointLimits
// ---------------------------------------------------------------------------

/// Position and velocity limits of a joint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointLimits {
    /// Lower position limit (rad or m). `None` means unbounded.
    pub lower: Option<f64>,
    /// Upper position limit (rad or m). `None` means unbounded.
    pub upper: Option<f64>,
    /// Maximum effort (Nm or N).
    pub effort: f64,
    /// Maximum velocity (rad/s or m/s). `None` when the description gives none.
    pub velocity: Option<f64>,
}

impl JointLimits {
    /// Both position limits, if the joint has them.
    pub fn position(&self) -> Option<(f64, f64)> {
        self.lower.zip(self.upper)
    }
}

// ---------------------------------------------------------------------------
// Origin
// ---------------------------------------------------------------------------

/// A pose given as translation plus roll-pitch-yaw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Origin {
    /// Translation `[x, y, z]` in meters.
    pub xyz: [f64; 3],
    /// Rotation `[roll, pitch, yaw]` in radians.
    pub rpy: [f64; 3],
}

// ---------------------------------------------------------------------------
// JointData
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct JointData {
    pub name: String,
    pub joint_type: JointType,
    /// Parent link name.
    pub parent: String,
    /// Child link name.
    pub child: String,
    /// Joint frame relative to the parent link.
    pub origin: Origin,
    /// Joint axis in the joint frame (default `[1, 0, 0]` per URDF).
    pub axis: [f64; 3],
    pub limits: JointLimits,
}

// ---------------------------------------------------------------------------
// UrdfModel
// ---------------------------------------------------------------------------

/// Kinematic tree of a URDF robot.
#[derive(Debug, Clone)]
pub struct UrdfModel {
    pub name: String,
    pub links: BTreeSet<String>,
    /// All joints, keyed by name.
    pub joints: BTreeMap<String, JointData>,
    /// The link that is never a child.
    pub root_link: String,
}

impl UrdfModel {
    pub fn has_link(&self, name: &str) -> bool {
        self.links.contains(name)
    }

    /// Get a joint by name.
    pub fn joint(&self, name: &str) -> Result<&JointData, UrdfError> {
        self.joints
            .get(name)
            .ok_or_else(|| UrdfError::MissingJoint(name.into()))
    }

    /// Actuated joints, in name order.
    pub fn actuated_joints(&self) -> impl Iterator<Item = &JointData> {
        self.joints.values().filter(|j| j.joint_type.is_actuated())
    }

    /// Number of actuated degrees of freedom.
    pub fn dof(&self) -> usize {
        self.actuated_joints().count()
    }

    /// Joints from the root link down to `link`, in traversal order.
    pub fn path_to_link(&self, link: &str) -> Result<Vec<&JointData>, UrdfError> {
        if !self.has_link(link) {
            return Err(UrdfError::MissingLink(link.into()));
        }
        // Walk up from the target; every link has at most one parent joint.
        let mut path = Vec::new();
        let mut current = link;
        while current != self.root_link {
            let joint = self
                .joints
                .values()
                .find(|j| j.child == current)
                .ok_or_else(|| UrdfError::Unreachable {
                    root: self.root_link.clone(),
                    link: link.into(),
                })?;
            if path.len() > self.joints.len() {
                return Err(UrdfError::Unreachable {
                    root: self.root_link.clone(),
                    link: link.into(),
                });
            }
            path.push(joint);
            current = joint.parent.as_str();
        }
        path.reverse();
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
