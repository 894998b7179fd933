//! Robot fixtures shared by the unit tests.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_3};

use nalgebra::{DVector, Isometry3, Matrix3, Translation3, UnitQuaternion, Vector3};

use crate::allocation::AllocationStrategy;
use crate::config::ModelConfig;
use crate::coordinates::GeneralizedCoordinates;
use crate::spatial_inertial::RigidBodyInertia;
use crate::{Joint, JointType, SegmentDescription, SegmentTree};

fn inertia(mass: f64, cog: [f64; 3], diagonal: [f64; 3]) -> RigidBodyInertia {
    RigidBodyInertia::new(
        mass,
        Vector3::from(cog),
        Matrix3::from_diagonal(&Vector3::from(diagonal)),
    )
}

fn at(x: f64, y: f64, z: f64) -> Isometry3<f64> {
    Isometry3::translation(x, y, z)
}

fn segment(
    name: &str,
    parent: Option<&str>,
    parent_offset: Isometry3<f64>,
    joint: Joint,
    inertia: RigidBodyInertia,
) -> SegmentDescription {
    SegmentDescription {
        name: name.into(),
        parent: parent.map(Into::into),
        parent_offset,
        joint,
        inertia,
    }
}

fn root(name: &str, inertia: RigidBodyInertia) -> SegmentDescription {
    let joint = Joint {
        name: format!("{name}_root"),
        joint_type: JointType::Floating,
    };
    segment(name, None, Isometry3::identity(), joint, inertia)
}

fn revolute_z(name: impl Into<String>) -> Joint {
    Joint {
        name: name.into(),
        joint_type: JointType::Revolute {
            axis: Vector3::z_axis(),
        },
    }
}

fn fixed(name: impl Into<String>) -> Joint {
    Joint {
        name: name.into(),
        joint_type: JointType::Fixed,
    }
}

fn rotor(index: usize, spin: f64) -> Joint {
    Joint {
        name: format!("rotor{index}"),
        joint_type: JointType::Rotor {
            axis: nalgebra::Unit::new_normalize(Vector3::new(0.0, 0.0, spin)),
        },
    }
}

fn spin(i: usize) -> f64 {
    if i % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

fn rotor_inertia(cog_z: f64) -> RigidBodyInertia {
    inertia(0.05, [0.0, 0.0, cog_z], [1e-5, 1e-5, 2e-5])
}

/// Symmetric planar quad, rotors at radius 0.25 m. 1.2 kg, no joints.
pub(crate) fn quad_tree() -> SegmentTree {
    let mut segments = vec![root("fc", inertia(1.0, [0.0; 3], [0.01, 0.01, 0.02]))];
    for i in 0..4 {
        let phi = i as f64 * FRAC_PI_2;
        segments.push(segment(
            &format!("thrust{}", i + 1),
            Some("fc"),
            at(0.25 * phi.cos(), 0.25 * phi.sin(), 0.0),
            rotor(i + 1, spin(i)),
            rotor_inertia(0.0),
        ));
    }
    SegmentTree::from_segments(segments).unwrap()
}

/// Four links in a row joined by vertical revolute joints, one rotor per
/// link and the flight controller on link2. 2.0 kg, three joints.
pub(crate) fn hydrus_tree() -> SegmentTree {
    let link = || inertia(0.4, [0.3, 0.0, 0.0], [5e-4, 0.012, 0.012]);
    let mut segments = vec![
        root("link1", link()),
        segment("thrust1", Some("link1"), at(0.3, 0.0, 0.05), rotor(1, 1.0), rotor_inertia(0.01)),
    ];
    for k in 2..=4 {
        segments.push(segment(
            &format!("link{k}"),
            Some(&format!("link{}", k - 1)),
            at(0.6, 0.0, 0.0),
            revolute_z(format!("joint{}", k - 1)),
            link(),
        ));
        segments.push(segment(
            &format!("thrust{k}"),
            Some(&format!("link{k}")),
            at(0.3, 0.0, 0.05),
            rotor(k, spin(k - 1)),
            rotor_inertia(0.01),
        ));
    }
    segments.push(segment(
        "fc",
        Some("link2"),
        at(0.3, 0.0, 0.02),
        fixed("fc_joint"),
        inertia(0.2, [0.0; 3], [1e-4, 1e-4, 1e-4]),
    ));
    SegmentTree::from_segments(segments).unwrap()
}

pub(crate) fn hydrus_config() -> ModelConfig {
    ModelConfig {
        thrust_max: 8.0,
        ..ModelConfig::default()
    }
}

/// Hexarotor with every thrust axis tilted outward and sideways, arms 2 and
/// 5 folding about vertical joints. 1.9 kg, two joints.
pub(crate) fn hexa_tree() -> SegmentTree {
    let mut segments = vec![root("fc", inertia(1.0, [0.0; 3], [0.01, 0.01, 0.02]))];
    for i in 0..6 {
        let phi = i as f64 * FRAC_PI_3;
        let s = spin(i);
        let arm = format!("arm{}", i + 1);
        let joint = if i == 1 || i == 4 {
            revolute_z(format!("arm_joint{}", i + 1))
        } else {
            fixed(format!("arm_joint{}", i + 1))
        };
        segments.push(segment(
            &arm,
            Some("fc"),
            Isometry3::from_parts(
                Translation3::new(0.05 * phi.cos(), 0.05 * phi.sin(), 0.0),
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), phi),
            ),
            joint,
            inertia(0.1, [0.12, 0.0, 0.0], [1e-5, 5e-4, 5e-4]),
        ));
        segments.push(segment(
            &format!("thrust{}", i + 1),
            Some(&arm),
            Isometry3::from_parts(
                Translation3::new(0.25, 0.0, 0.02),
                UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.25)
                    * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), s * 0.3),
            ),
            rotor(i + 1, s),
            rotor_inertia(0.01),
        ));
    }
    SegmentTree::from_segments(segments).unwrap()
}

pub(crate) fn hexa_config() -> ModelConfig {
    ModelConfig {
        strategy: AllocationStrategy::FullyActuated,
        thrust_max: 8.0,
        ..ModelConfig::default()
    }
}

pub(crate) fn coordinates(tree: &SegmentTree, values: &[f64]) -> GeneralizedCoordinates {
    GeneralizedCoordinates::from_vector(tree, DVector::from_column_slice(values)).unwrap()
}
