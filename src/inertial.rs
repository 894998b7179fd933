use hashbrown::HashMap;
use nalgebra::{Isometry3, Matrix3, Translation3, UnitQuaternion, Vector3};
use tracing::debug;

use crate::error::ModelError;
use crate::extra_module::ExtraModuleRegistry;
use crate::kinematics::SegmentFrames;
use crate::spatial_inertial::RigidBodyInertia;
use crate::SegmentTree;

/// Consolidated inertia of one base link and every descendant reached
/// without crossing another revolute joint, in the base link frame.
#[derive(Debug, Clone)]
pub struct InertiaGroup {
    pub base: usize,
    pub name: String,
    pub inertia: RigidBodyInertia,
}

/// Centre-of-gravity frame and whole-body inertia.
#[derive(Debug, Clone, PartialEq)]
pub struct CogState {
    /// CoG pose in the root frame. The rotation is the baselink attitude
    /// composed with the inverse of the desired CoG orientation.
    pub frame: Isometry3<f64>,
    pub mass: f64,
    /// Rotational inertia about the CoG, CoG-frame axes.
    pub inertia: Matrix3<f64>,
    /// Baselink pose seen from the CoG frame.
    pub cog_to_baselink: Isometry3<f64>,
}

impl CogState {
    /// Rotation taking root-frame vectors into the CoG frame.
    pub fn level_rotation(&self) -> UnitQuaternion<f64> {
        self.frame.rotation.inverse()
    }

    /// CoG position in the root frame.
    pub fn position(&self) -> Vector3<f64> {
        self.frame.translation.vector
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InertialState {
    pub cog: CogState,
    /// Per-group inertia including attached extra modules, base link frame,
    /// same order as [`InertialAggregator::groups`].
    pub groups: Vec<RigidBodyInertia>,
}

/// Post-order fold of the segment inertias into base-link groups.
///
/// A group opens at the root and at every segment attached by a revolute
/// joint. Groups are fixed for the life of the tree since only revolute
/// joints move, so the fold runs once at construction.
#[derive(Debug, Clone)]
pub struct InertialAggregator {
    groups: Vec<InertiaGroup>,
    group_index: HashMap<String, usize>,
}

impl InertialAggregator {
    pub fn new(tree: &SegmentTree) -> Result<Self, ModelError> {
        // inertia carried from each segment to its parent
        let mut carry = vec![RigidBodyInertia::zero(); tree.len()];
        let mut groups = Vec::new();
        for id in tree.post_order() {
            let segment = tree.segment(id);
            let mut acc = segment.inertia;
            for &child in &segment.children {
                acc += carry[child].transformed(&tree.segment(child).parent_offset);
            }
            if segment.parent.is_none() || segment.joint.joint_type.is_revolute() {
                groups.push(InertiaGroup {
                    base: id,
                    name: segment.name.clone(),
                    inertia: acc,
                });
            } else {
                carry[id] = acc;
            }
        }
        // root group first
        groups.reverse();

        let roots = groups
            .iter()
            .filter(|g| tree.segment(g.base).parent.is_none())
            .count();
        if roots != 1 {
            return Err(ModelError::InvalidTree(format!(
                "expected one root inertia group, found {roots}"
            )));
        }

        let group_index = groups
            .iter()
            .enumerate()
            .map(|(index, group)| (group.name.clone(), index))
            .collect();

        debug!(
            groups = ?groups.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(),
            "inertia groups"
        );

        Ok(Self {
            groups,
            group_index,
        })
    }

    pub fn groups(&self) -> &[InertiaGroup] {
        &self.groups
    }

    pub fn group_of(&self, name: &str) -> Option<usize> {
        self.group_index.get(name).copied()
    }

    pub fn is_base_link(&self, name: &str) -> bool {
        self.group_index.contains_key(name)
    }

    /// Sum the groups (plus extra modules) at their current frames.
    pub fn aggregate(
        &self,
        frames: &SegmentFrames,
        extras: &ExtraModuleRegistry,
        baselink: usize,
        desire_orientation: &UnitQuaternion<f64>,
    ) -> Result<InertialState, ModelError> {
        let mut buckets: Vec<_> = self.groups.iter().map(|g| g.inertia).collect();
        for module in extras.iter() {
            let index = self
                .group_of(&module.parent)
                .ok_or_else(|| ModelError::UnknownSegment(module.parent.clone()))?;
            buckets[index] += module.local_inertia();
        }

        let total = self
            .groups
            .iter()
            .zip(&buckets)
            .fold(RigidBodyInertia::zero(), |acc, (group, bucket)| {
                acc + bucket.transformed(&frames[group.base])
            });
        if !total.mass().is_finite() || total.mass() <= 0.0 {
            return Err(ModelError::InvalidTree(format!(
                "total mass {} is not positive and finite",
                total.mass()
            )));
        }
        if total.cog().iter().any(|c| !c.is_finite()) {
            return Err(ModelError::InvalidTree(format!(
                "centre of gravity {:?} is not finite",
                total.cog().as_slice()
            )));
        }

        let rotation = frames[baselink].rotation * desire_orientation.inverse();
        let frame = Isometry3::from_parts(Translation3::from(total.cog()), rotation);
        let r = rotation.to_rotation_matrix();
        let inertia = r.matrix().transpose() * total.inertia_about_cog() * r.matrix();
        let cog_to_baselink = frame.inverse() * frames[baselink];

        Ok(InertialState {
            cog: CogState {
                frame,
                mass: total.mass(),
                inertia,
                cog_to_baselink,
            },
            groups: buckets,
        })
    }
}
