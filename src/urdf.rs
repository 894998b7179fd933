use tracing::info;
use urdf_rs::read_from_string;

use super::error::ModelError;
use super::utils::*;
use super::SegmentTree;

impl SegmentTree {
    pub fn from_urdf_str(str: &str) -> Result<Self, ModelError> {
        let robot = read_from_string(str)?;
        Self::from_urdf_robot(&robot)
    }

    /// Build from an already parsed robot description.
    pub fn from_urdf_robot(robot: &urdf_rs::Robot) -> Result<Self, ModelError> {
        let tree = Self::from_segments(segment_descriptions(robot)?)?;
        info!(
            robot = %robot.name,
            segments = tree.len(),
            joints = tree.joint_count(),
            "loaded robot description"
        );
        Ok(tree)
    }

    pub fn from_urdf_file(path: &str) -> Result<Self, ModelError> {
        if !url_is_urdf_file(path) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{path} is not a urdf file"),
            )
            .into());
        }
        let str = std::fs::read_to_string(path)?;
        Self::from_urdf_str(&str)
    }
}
