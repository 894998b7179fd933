use nalgebra::{Isometry3, Matrix3, Translation3, Unit, UnitQuaternion, Vector3};

use super::error::ModelError;
use super::spatial_inertial::RigidBodyInertia;
use super::{Joint, JointType, SegmentDescription};

pub(super) fn url_is_urdf_file(url: &str) -> bool {
    std::path::Path::new(url).exists() && (url.ends_with(".urdf") || url.ends_with(".URDF"))
}

pub(super) fn pose_to_isometry(pose: &urdf_rs::Pose) -> Isometry3<f64> {
    let rpy = &pose.rpy;
    Isometry3::from_parts(
        Translation3::new(pose.xyz[0], pose.xyz[1], pose.xyz[2]),
        UnitQuaternion::from_euler_angles(rpy[0], rpy[1], rpy[2]),
    )
}

pub(super) fn link_inertia(link: &urdf_rs::Link) -> RigidBodyInertia {
    let i = &link.inertial.inertia;
    let inertia = Matrix3::new(
        i.ixx, i.ixy, i.ixz, i.ixy, i.iyy, i.iyz, i.ixz, i.iyz, i.izz,
    );
    let mass = link.inertial.mass.value;
    RigidBodyInertia::from_inertial_frame(mass, &pose_to_isometry(&link.inertial.origin), &inertia)
}

fn joint_axis(joint: &urdf_rs::Joint) -> Result<Unit<Vector3<f64>>, ModelError> {
    let xyz = &joint.axis.xyz;
    Unit::try_new(Vector3::new(xyz[0], xyz[1], xyz[2]), 1e-12)
        .ok_or_else(|| ModelError::InvalidTree(format!("joint {} has a zero axis", joint.name)))
}

pub(super) fn joint_type(joint: &urdf_rs::Joint) -> Result<JointType, ModelError> {
    match joint.joint_type {
        urdf_rs::JointType::Revolute | urdf_rs::JointType::Continuous => {
            let axis = joint_axis(joint)?;
            if joint.name.contains("rotor") {
                Ok(JointType::Rotor { axis })
            } else {
                Ok(JointType::Revolute { axis })
            }
        }
        urdf_rs::JointType::Fixed => Ok(JointType::Fixed),
        urdf_rs::JointType::Floating => Ok(JointType::Floating),
        ref other => Err(ModelError::UnsupportedJoint {
            joint: joint.name.clone(),
            kind: format!("{other:?}").to_lowercase(),
        }),
    }
}

// one description per link, the joint that has it as child attached
pub(super) fn segment_descriptions(
    robot: &urdf_rs::Robot,
) -> Result<Vec<SegmentDescription>, ModelError> {
    robot
        .links
        .iter()
        .map(|link| {
            let joint = robot
                .joints
                .iter()
                .find(|joint| joint.child.link == link.name);
            let description = match joint {
                Some(joint) => SegmentDescription {
                    name: link.name.clone(),
                    parent: Some(joint.parent.link.clone()),
                    parent_offset: pose_to_isometry(&joint.origin),
                    joint: Joint {
                        name: joint.name.clone(),
                        joint_type: joint_type(joint)?,
                    },
                    inertia: link_inertia(link),
                },
                None => SegmentDescription {
                    name: link.name.clone(),
                    parent: None,
                    parent_offset: Isometry3::identity(),
                    joint: Joint {
                        name: format!("{}_root", link.name),
                        joint_type: JointType::Floating,
                    },
                    inertia: link_inertia(link),
                },
            };
            Ok(description)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn url_is_file_test() {
        assert!(!url_is_urdf_file("./does/not/exist.urdf"));
        assert!(!url_is_urdf_file("Cargo.toml"));
    }

    #[test]
    fn pose_to_isometry_test() {
        let pose = urdf_rs::Pose {
            xyz: urdf_rs::Vec3([0.1, 0.2, 0.3]),
            rpy: urdf_rs::Vec3([0.0, 0.0, std::f64::consts::FRAC_PI_2]),
        };
        let iso = pose_to_isometry(&pose);
        assert_relative_eq!(iso.translation.vector, Vector3::new(0.1, 0.2, 0.3));
        assert_relative_eq!(
            iso.rotation * Vector3::x(),
            Vector3::y(),
            epsilon = 1e-12
        );
    }
}
