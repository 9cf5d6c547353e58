//! URDF parsing into a kinematic tree.
//!
//! Only what velocity control needs is kept: joints with their origins,
//! axes and limits, the link set, and the root link. Maps are ordered so
//! that every traversal is deterministic.

pub mod error;
pub mod parser;
pub mod types;

pub use error::UrdfError;
pub use parser::{parse_file, parse_string};
pub use types::{JointData, JointLimits, JointType, Origin, UrdfModel};
