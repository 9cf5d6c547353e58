//! Error types for URDF parsing and tree queries.

use std::path::PathBuf;

/// Errors that can occur during URDF processing.
#[derive(Debug, thiserror::Error)]
pub enum UrdfError {
    /// Failed to read the URDF file.
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse URDF XML content.
    #[error("URDF parse error: {0}")]
    Parse(String),

    #[error("missing link: {0}")]
    MissingLink(String),

    #[error("missing joint: {0}")]
    MissingJoint(String),

    #[error("unsupported joint type: {0}")]
    UnsupportedJointType(String),

    /// The URDF has no root link (no link that is never a child).
    #[error("no root link found")]
    NoRootLink,

    /// `link` exists but is not below `root` in the tree.
    #[error("link {link} is not reachable from {root}")]
    Unreachable { root: String, link: String },
}
