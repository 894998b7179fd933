use std::ops::Index;

use hashbrown::HashMap;
use nalgebra::{Isometry3, Translation3, UnitQuaternion};

use crate::coordinates::GeneralizedCoordinates;
use crate::error::ModelError;
use crate::{JointType, Segment, SegmentTree};

/// Root-frame pose of every segment, indexed like the tree arena.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFrames {
    frames: Vec<Isometry3<f64>>,
}

impl SegmentFrames {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn by_name(&self, tree: &SegmentTree, name: &str) -> Result<&Isometry3<f64>, ModelError> {
        Ok(&self.frames[tree.require(name)?])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Isometry3<f64>> + '_ {
        self.frames.iter()
    }

    /// Segment name -> frame.
    pub fn to_map(&self, tree: &SegmentTree) -> HashMap<String, Isometry3<f64>> {
        tree.segments
            .iter()
            .zip(&self.frames)
            .map(|(segment, frame)| (segment.name.clone(), *frame))
            .collect()
    }
}

impl Index<usize> for SegmentFrames {
    type Output = Isometry3<f64>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.frames[index]
    }
}

/// Forward kinematics over the segment tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct KinematicTreeEvaluator;

impl KinematicTreeEvaluator {
    /// Compose `parent * offset * joint motion` down the tree.
    ///
    /// The root sits at the identity. Pure function of its inputs.
    pub fn evaluate(
        tree: &SegmentTree,
        coordinates: &GeneralizedCoordinates,
    ) -> Result<SegmentFrames, ModelError> {
        if coordinates.len() != tree.joint_count() {
            return Err(ModelError::DimensionMismatch {
                expected: tree.joint_count(),
                got: coordinates.len(),
            });
        }

        let mut frames = vec![Isometry3::identity(); tree.len()];
        for &id in &tree.bfs {
            let segment = tree.segment(id);
            if let Some(parent) = segment.parent {
                frames[id] = frames[parent] * segment.parent_offset * joint_motion(segment, coordinates);
            }
        }
        Ok(SegmentFrames { frames })
    }
}

fn joint_motion(segment: &Segment, coordinates: &GeneralizedCoordinates) -> Isometry3<f64> {
    match segment.joint.joint_type {
        JointType::Revolute { axis } => {
            let q = segment.coordinate().map_or(0.0, |c| coordinates.get(c));
            Isometry3::from_parts(Translation3::identity(), UnitQuaternion::from_axis_angle(&axis, q))
        }
        JointType::Fixed | JointType::Floating | JointType::Rotor { .. } => Isometry3::identity(),
    }
}
