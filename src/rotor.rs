use nalgebra::{Unit, Vector3};

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::inertial::CogState;
use crate::kinematics::SegmentFrames;
use crate::{JointType, SegmentTree};

/// One rotor, expressed in the CoG frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Rotor {
    /// 1-based rotor number.
    pub index: usize,
    pub segment: usize,
    pub origin: Vector3<f64>,
    pub axis: Unit<Vector3<f64>>,
    /// Spin direction, +1 or -1.
    pub direction: f64,
    pub m_f_rate: f64,
}

impl Rotor {
    /// Torque produced per unit thrust: lever arm plus drag reaction.
    pub fn torque_generator(&self) -> Vector3<f64> {
        self.origin.cross(&self.axis) + self.axis.into_inner() * (self.m_f_rate * self.direction)
    }
}

/// Resolves the rotor segments once and places them every update.
#[derive(Debug, Clone)]
pub struct RotorGeometryExtractor {
    segments: Vec<usize>,
    directions: Vec<f64>,
    m_f_rate: f64,
}

impl RotorGeometryExtractor {
    /// Rotor `i` is the segment `{thrust_link}{i}`. Without a configured
    /// rotor count, rotors are counted from 1 until a name is missing.
    pub fn new(tree: &SegmentTree, config: &ModelConfig) -> Result<Self, ModelError> {
        let name = |i: usize| format!("{}{}", config.thrust_link, i);

        let segments = match config.rotor_num {
            Some(count) => (1..=count)
                .map(|i| {
                    tree.index_of(&name(i))
                        .ok_or_else(|| ModelError::RotorNotFound { name: name(i) })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => (1..).map_while(|i| tree.index_of(&name(i))).collect(),
        };
        if segments.is_empty() {
            return Err(ModelError::RotorNotFound { name: name(1) });
        }

        let directions = match &config.rotor_directions {
            Some(directions) => {
                if directions.len() != segments.len() {
                    return Err(ModelError::DimensionMismatch {
                        expected: segments.len(),
                        got: directions.len(),
                    });
                }
                directions.clone()
            }
            None => segments
                .iter()
                .map(|&s| match tree.segment(s).joint.joint_type {
                    JointType::Rotor { axis } if axis.z < 0.0 => -1.0,
                    _ => 1.0,
                })
                .collect(),
        };

        Ok(Self {
            segments,
            directions,
            m_f_rate: config.m_f_rate,
        })
    }

    pub fn rotor_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[usize] {
        &self.segments
    }

    pub fn directions(&self) -> &[f64] {
        &self.directions
    }

    /// Origin and +Z thrust axis of every rotor in the CoG frame.
    pub fn extract(&self, frames: &SegmentFrames, cog: &CogState) -> Vec<Rotor> {
        let to_cog = cog.frame.inverse();
        self.segments
            .iter()
            .zip(&self.directions)
            .enumerate()
            .map(|(i, (&segment, &direction))| {
                let relative = to_cog * frames[segment];
                Rotor {
                    index: i + 1,
                    segment,
                    origin: relative.translation.vector,
                    axis: relative.rotation * Vector3::z_axis(),
                    direction,
                    m_f_rate: self.m_f_rate,
                }
            })
            .collect()
    }
}
