//! Kinematic chain extracted from a URDF [`UrdfModel`].
//!
//! A [`KinematicChain`] is an ordered list of actuated joints from the root
//! link to an end-effector link, with fixed joints folded into the static
//! transforms. It yields the end-effector pose both as a symbolic [`Frame`]
//! over joint symbols and numerically for given joint positions.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, UnitVector3, Vector3};

use taskqp_expr::{Expr, Frame, Symbol, rotation_from_axis_angle};
use taskqp_urdf::{JointType, Origin, UrdfError, UrdfModel};

/// A single actuated joint in the kinematic chain.
#[derive(Debug, Clone)]
pub struct ChainJoint {
    /// Name of this joint (from URDF). Also the name of its position symbol.
    pub name: String,
    /// Static transform from the previous joint's child link to this joint frame.
    pub origin: Isometry3<f64>,
    /// Joint axis in the joint's local frame.
    pub axis: UnitVector3<f64>,
    /// Whether this is a prismatic joint (false = revolute).
    pub is_prismatic: bool,
}

impl ChainJoint {
    /// Symbol carrying this joint's position.
    pub fn symbol(&self) -> Symbol {
        Symbol::new(&self.name)
    }

    /// Symbolic motion transform for the joint position `q`.
    fn motion(&self, q: &Expr) -> Frame {
        if self.is_prismatic {
            Frame::translation_along(&self.axis, q)
        } else {
            Frame::from_parts(
                &rotation_from_axis_angle(&self.axis, q),
                &taskqp_expr::point3(Expr::zero(), Expr::zero(), Expr::zero()),
            )
        }
    }
}

/// An ordered kinematic chain from the root link to an end-effector.
#[derive(Debug, Clone)]
pub struct KinematicChain {
    /// Link the chain ends at.
    tip: String,
    /// Ordered joints from root to tip.
    joints: Vec<ChainJoint>,
    /// Transform from the last joint's child link to the tip link.
    tip_offset: Isometry3<f64>,
}

impl KinematicChain {
    /// Trace the tree from the root link to `tip_link`.
    ///
    /// Non-actuated joints have their origins folded into the next actuated
    /// joint, or into the tip offset when they trail the last one.
    pub fn from_model(model: &UrdfModel, tip_link: &str) -> Result<Self, UrdfError> {
        let path = model.path_to_link(tip_link)?;

        let mut joints = Vec::new();
        let mut accumulated_fixed = Isometry3::identity();

        for joint in path {
            let joint_origin = origin_to_isometry(&joint.origin);

            if joint.joint_type.is_actuated() {
                let combined_origin = accumulated_fixed * joint_origin;
                accumulated_fixed = Isometry3::identity();

                let axis = Vector3::new(joint.axis[0], joint.axis[1], joint.axis[2]);
                joints.push(ChainJoint {
                    name: joint.name.clone(),
                    origin: combined_origin,
                    axis: UnitVector3::new_normalize(axis),
                    is_prismatic: joint.joint_type == JointType::Prismatic,
                });
            } else {
                accumulated_fixed *= joint_origin;
            }
        }

        Ok(Self {
            tip: tip_link.to_owned(),
            joints,
            tip_offset: accumulated_fixed,
        })
    }

    pub fn tip(&self) -> &str {
        &self.tip
    }

    /// Number of actuated degrees of freedom.
    pub fn dof(&self) -> usize {
        self.joints.len()
    }

    /// Joint names in chain order.
    pub fn joint_names(&self) -> Vec<&str> {
        self.joints.iter().map(|j| j.name.as_str()).collect()
    }

    pub fn joints(&self) -> &[ChainJoint] {
        &self.joints
    }

    pub fn tip_offset(&self) -> &Isometry3<f64> {
        &self.tip_offset
    }

    /// Tip pose in the root frame as an expression over the joint symbols.
    pub fn symbolic_frame(&self) -> Frame {
        let mut frame = Frame::identity();
        for joint in &self.joints {
            let q = Expr::from(joint.symbol());
            frame = frame
                .compose(&Frame::constant(&joint.origin))
                .compose(&joint.motion(&q));
        }
        frame.compose(&Frame::constant(&self.tip_offset))
    }

    /// Tip pose in the root frame for joint positions `q` (chain order).
    ///
    /// # Panics
    ///
    /// Panics if `q.len() != self.dof()`.
    pub fn forward_kinematics(&self, q: &[f64]) -> Isometry3<f64> {
        assert_eq!(q.len(), self.dof(), "q.len() must equal chain DOF");

        let mut transform = Isometry3::identity();
        for (joint, &position) in self.joints.iter().zip(q) {
            transform *= joint.origin;
            transform *= joint_transform(&joint.axis, joint.is_prismatic, position);
        }
        transform * self.tip_offset
    }
}

/// Convert a URDF [`Origin`] (xyz + rpy) to an [`Isometry3`].
fn origin_to_isometry(origin: &Origin) -> Isometry3<f64> {
    let translation = Translation3::new(origin.xyz[0], origin.xyz[1], origin.xyz[2]);
    let rotation = UnitQuaternion::from_euler_angles(origin.rpy[0], origin.rpy[1], origin.rpy[2]);
    Isometry3::from_parts(translation, rotation)
}

/// Transform of a single joint at a given position.
fn joint_transform(axis: &UnitVector3<f64>, is_prismatic: bool, position: f64) -> Isometry3<f64> {
    if is_prismatic {
        Isometry3::from_parts(
            Translation3::from(axis.into_inner() * position),
            UnitQuaternion::identity(),
        )
    } else {
        Isometry3::from_parts(
            Translation3::identity(),
            UnitQuaternion::from_axis_angle(axis, position),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
