//! Kinematic, inertial and static model of a transformable multi-rotor.
//!
//! Given a segment tree and the current joint angles, [`RobotModel`] answers
//! where every segment and rotor is, where the centre of gravity is, which
//! rotor thrusts hover the vehicle, how far the hover wrench is from the
//! actuator limits, and how all of that changes with the six floating-base
//! coordinates plus the joint angles.

use hashbrown::HashMap;
use nalgebra::{Isometry3, Unit, Vector3};
use petgraph::prelude::*;

mod bfs;
mod tree;
mod urdf;
mod utils;

pub mod allocation;
pub mod config;
pub mod coordinates;
pub mod error;
pub mod extra_module;
pub mod feasibility;
pub mod inertial;
pub mod jacobian;
pub mod joint_torque;
pub mod kinematics;
pub mod model;
pub mod pipeline;
pub mod rotor;
pub mod spatial_inertial;

#[cfg(test)]
mod test_robots;

pub use allocation::{AllocationStrategy, StaticThrust, WrenchAllocationMatrix, WrenchAllocationSolver};
pub use config::{JacobianConfig, ModelConfig};
pub use coordinates::GeneralizedCoordinates;
pub use error::{ConfigError, ExtraModuleError, ModelError};
pub use extra_module::{ExtraModule, ExtraModuleRegistry};
pub use feasibility::{FaceMargins, FeasibilityMargins, FeasibleControlAnalyzer, StabilityCriteria, StabilityVerdict};
pub use inertial::{CogState, InertiaGroup, InertialAggregator, InertialState};
pub use jacobian::{DesireOrientationScope, JacobianEngine, JacobianQuantity, JacobianReport, JacobianSet};
pub use kinematics::{KinematicTreeEvaluator, SegmentFrames};
pub use model::{ModelSnapshot, RobotModel};
pub use pipeline::{ModelPipeline, ModelState};
pub use rotor::{Rotor, RotorGeometryExtractor};
pub use spatial_inertial::RigidBodyInertia;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointType {
    Fixed,
    /// Free attachment of the root; carries no coordinate.
    Floating,
    Revolute { axis: Unit<Vector3<f64>> },
    /// Propeller spin joint. Carries no coordinate and never opens an
    /// inertia group; the sign of `axis.z` is the default spin direction.
    Rotor { axis: Unit<Vector3<f64>> },
}

impl JointType {
    pub fn is_revolute(&self) -> bool {
        matches!(self, JointType::Revolute { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    pub joint_type: JointType,
}

/// Input record for building a [`SegmentTree`].
#[derive(Debug, Clone)]
pub struct SegmentDescription {
    pub name: String,
    pub parent: Option<String>,
    /// Pose of the joint frame in the parent segment frame.
    pub parent_offset: Isometry3<f64>,
    pub joint: Joint,
    /// Inertia in the segment frame.
    pub inertia: RigidBodyInertia,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,

    // joint frame relative to parent segment
    pub parent_offset: Isometry3<f64>,

    pub joint: Joint,

    // segment frame inertia
    pub inertia: RigidBodyInertia,

    // coordinate indices of the revolute joints between the root and this
    // segment, this segment's own joint included
    pub joint_path: Vec<usize>,
}

impl Segment {
    /// Coordinate index of this segment's own revolute joint.
    pub fn coordinate(&self) -> Option<usize> {
        if self.joint.joint_type.is_revolute() {
            self.joint_path.last().copied()
        } else {
            None
        }
    }
}

/// Arena-indexed segment tree.
#[derive(Debug, Clone)]
pub struct SegmentTree {
    pub segments: Vec<Segment>,
    pub link_graph: DiGraphMap<usize, ()>,
    // parents always precede their children
    pub bfs: Vec<usize>,

    root: usize,
    name_index: HashMap<String, usize>,
    joint_index: HashMap<String, usize>,
    // segment carrying each revolute coordinate
    joint_segments: Vec<usize>,
}
