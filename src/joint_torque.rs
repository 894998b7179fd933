use nalgebra::{DVector, UnitQuaternion, Vector3};

use crate::kinematics::SegmentFrames;
use crate::{JointType, SegmentTree};

/// Revolute joint axis and origin in the level frame (root origin,
/// CoG-frame axes).
#[derive(Debug, Clone, PartialEq)]
pub struct JointAxis {
    pub coordinate: usize,
    pub segment: usize,
    pub axis: Vector3<f64>,
    pub origin: Vector3<f64>,
}

pub fn joint_axes(
    tree: &SegmentTree,
    frames: &SegmentFrames,
    level: &UnitQuaternion<f64>,
) -> Vec<JointAxis> {
    (0..tree.joint_count())
        .filter_map(|coordinate| {
            let segment = tree.joint_segment(coordinate);
            match tree.segment(segment).joint.joint_type {
                JointType::Revolute { axis } => {
                    let frame = &frames[segment];
                    Some(JointAxis {
                        coordinate,
                        segment,
                        axis: level * (frame.rotation * axis.into_inner()),
                        origin: level * frame.translation.vector,
                    })
                }
                _ => None,
            }
        })
        .collect()
}

/// Force and pure moment applied at a point rigidly attached to `segment`,
/// level frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PointLoad {
    pub segment: usize,
    pub point: Vector3<f64>,
    pub force: Vector3<f64>,
    pub moment: Vector3<f64>,
}

impl PointLoad {
    /// Moment of the load about `origin`.
    pub fn moment_about(&self, origin: &Vector3<f64>) -> Vector3<f64> {
        (self.point - origin).cross(&self.force) + self.moment
    }
}

/// Torque each joint motor holds against the loads on its subtree.
///
/// `τ_j = -a_j · Σ (x - o_j) × f + m` over loads beyond joint `j`.
pub fn static_joint_torque(
    tree: &SegmentTree,
    joints: &[JointAxis],
    loads: &[PointLoad],
) -> DVector<f64> {
    DVector::from_iterator(
        joints.len(),
        joints.iter().map(|joint| -joint.axis.dot(&subtree_moment(tree, joint, loads))),
    )
}

fn subtree_moment(tree: &SegmentTree, joint: &JointAxis, loads: &[PointLoad]) -> Vector3<f64> {
    loads
        .iter()
        .filter(|load| tree.segment(load.segment).joint_path.contains(&joint.coordinate))
        .map(|load| load.moment_about(&joint.origin))
        .sum()
}
