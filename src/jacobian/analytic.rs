use nalgebra::{DMatrix, DVector, Matrix3, Matrix3xX, Vector3};

use super::JacobianSet;
use crate::allocation::rank_and_condition;
use crate::error::ModelError;
use crate::feasibility::{hover_force, skew};
use crate::joint_torque::JointAxis;
use crate::pipeline::{ModelPipeline, ModelState};
use crate::SegmentTree;

/// Velocity maps in the level frame, one column per generalized coordinate.
struct Differentiator<'a> {
    tree: &'a SegmentTree,
    joints: &'a [JointAxis],
    level: Matrix3<f64>,
    dimension: usize,
}

impl Differentiator<'_> {
    fn moves(&self, segment: usize, joint: &JointAxis) -> bool {
        self.tree.segment(segment).joint_path.contains(&joint.coordinate)
    }

    /// Point rigidly attached to `segment`.
    fn point(&self, segment: usize, x: &Vector3<f64>) -> Matrix3xX<f64> {
        let mut jacobian = Matrix3xX::zeros(self.dimension);
        for k in 0..3 {
            let omega: Vector3<f64> = self.level.column(k).into_owned();
            jacobian.set_column(k, &omega);
            jacobian.set_column(3 + k, &omega.cross(x));
        }
        for joint in self.joints {
            if self.moves(segment, joint) {
                jacobian.set_column(6 + joint.coordinate, &joint.axis.cross(&(x - joint.origin)));
            }
        }
        jacobian
    }

    /// Free vector fixed in `segment`.
    fn direction(&self, segment: usize, v: &Vector3<f64>) -> Matrix3xX<f64> {
        let mut jacobian = Matrix3xX::zeros(self.dimension);
        for k in 0..3 {
            let omega: Vector3<f64> = self.level.column(k).into_owned();
            jacobian.set_column(3 + k, &omega.cross(v));
        }
        for joint in self.joints {
            if self.moves(segment, joint) {
                jacobian.set_column(6 + joint.coordinate, &joint.axis.cross(v));
            }
        }
        jacobian
    }

    /// Angular velocity of `segment`.
    fn angular(&self, segment: usize) -> Matrix3xX<f64> {
        let mut jacobian = Matrix3xX::zeros(self.dimension);
        for k in 0..3 {
            jacobian.set_column(3 + k, &self.level.column(k).into_owned());
        }
        for joint in self.joints {
            if self.moves(segment, joint) {
                jacobian.set_column(6 + joint.coordinate, &joint.axis);
            }
        }
        jacobian
    }
}

/// Point, force and moment rates of one static load.
struct LoadRate {
    point: Matrix3xX<f64>,
    force: Matrix3xX<f64>,
    moment: Matrix3xX<f64>,
}

pub(super) fn jacobians(pipeline: &ModelPipeline, state: &ModelState) -> Result<JacobianSet, ModelError> {
    let tree = pipeline.tree();
    let cog = &state.inertial.cog;
    let level = cog.level_rotation();
    let dimension = 6 + tree.joint_count();
    let d = Differentiator {
        tree,
        joints: &state.joint_axes,
        level: level.to_rotation_matrix().into_inner(),
        dimension,
    };
    let mut set = JacobianSet::zeros(state, dimension);

    // inertia groups: CoG point and its rate
    let centre = level * cog.position();
    let groups = pipeline.aggregator().groups();
    let mut group_points = Vec::with_capacity(groups.len());
    let mut j_cog = Matrix3xX::zeros(dimension);
    for (group, inertia) in groups.iter().zip(&state.inertial.groups) {
        let point = level * state.frames[group.base].transform_point(&inertia.cog().into()).coords;
        let jacobian = d.point(group.base, &point);
        j_cog += &jacobian * (inertia.mass() / cog.mass);
        group_points.push((point, jacobian));
    }

    let mut j_momentum = Matrix3xX::zeros(dimension);
    for ((group, inertia), (point, jacobian)) in groups.iter().zip(&state.inertial.groups).zip(&group_points) {
        let rotation = d.level * state.frames[group.base].rotation.to_rotation_matrix().into_inner();
        let world_inertia = rotation * inertia.inertia_about_cog() * rotation.transpose();
        j_momentum += skew(&(point - centre)) * jacobian * inertia.mass() + world_inertia * d.angular(group.base);
    }
    set.cog.copy_from(&j_cog);
    set.momentum.copy_from(&j_momentum);

    // rotor generators
    let mut d_positions = Vec::with_capacity(state.rotors.len());
    let mut d_forces = Vec::with_capacity(state.rotors.len());
    let mut d_torques = Vec::with_capacity(state.rotors.len());
    for rotor in &state.rotors {
        let u = rotor.axis.into_inner();
        let x = level * state.frames[rotor.segment].translation.vector;
        let dx = d.point(rotor.segment, &x);
        let dp = &dx - &j_cog;
        let du = d.direction(rotor.segment, &u);
        let dv = -skew(&u) * &dp + skew(&rotor.origin) * &du + &du * (rotor.m_f_rate * rotor.direction);
        d_positions.push(dx);
        d_forces.push(du);
        d_torques.push(dv);
    }

    // static thrust: λ = Q_r⁺ b_r with b_r constant
    let axes = pipeline.solver().strategy().controlled_axes();
    let q = state.allocation.controlled(axes);
    let lambda = &state.static_thrust.thrust;
    let b = DVector::from_iterator(axes.len(), axes.iter().map(|&axis| -state.gravity_wrench[axis]));
    let gram_inverse = (&q * q.transpose())
        .try_inverse()
        .ok_or_else(|| {
            let (rank, condition_number) = rank_and_condition(&q);
            ModelError::UnderconstrainedAllocation {
                rank,
                required: axes.len(),
                condition_number,
            }
        })?;
    let y = &gram_inverse * &b;
    let pseudo_inverse = q.transpose() * &gram_inverse;
    for column in 0..dimension {
        let dq = DMatrix::from_fn(axes.len(), state.rotors.len(), |row, i| {
            let axis = axes[row];
            if axis < 3 {
                d_forces[i][(axis, column)]
            } else {
                d_torques[i][(axis - 3, column)]
            }
        });
        let dq_t = dq.transpose();
        let d_lambda = &dq_t * &y - &pseudo_inverse * (&dq * lambda + &q * (&dq_t * &y));
        set.static_thrust.set_column(column, &d_lambda);
    }

    // joint torque, loads in `static_loads` order: groups then rotors
    let loads = state.static_loads(pipeline.aggregator(), pipeline.gravity());
    let mut rates: Vec<LoadRate> = group_points
        .into_iter()
        .map(|(_, jacobian)| LoadRate {
            point: jacobian,
            force: Matrix3xX::zeros(dimension),
            moment: Matrix3xX::zeros(dimension),
        })
        .collect();
    for (i, rotor) in state.rotors.iter().enumerate() {
        let force = &d_forces[i] * lambda[i] + rotor.axis.into_inner() * set.static_thrust.row(i);
        rates.push(LoadRate {
            point: d_positions[i].clone(),
            moment: &force * (rotor.m_f_rate * rotor.direction),
            force,
        });
    }
    for joint in &state.joint_axes {
        let d_axis = d.direction(joint.segment, &joint.axis);
        let d_origin = d.point(joint.segment, &joint.origin);
        let mut moment = Vector3::zeros();
        let mut d_moment = Matrix3xX::zeros(dimension);
        for (load, rate) in loads.iter().zip(&rates) {
            if !d.moves(load.segment, joint) {
                continue;
            }
            moment += load.moment_about(&joint.origin);
            d_moment += -skew(&load.force) * (&rate.point - &d_origin)
                + skew(&(load.point - joint.origin)) * &rate.force
                + &rate.moment;
        }
        let row = -(moment.transpose() * d_axis + joint.axis.transpose() * d_moment);
        set.joint_torque.row_mut(joint.coordinate).copy_from(&row);
    }

    // feasibility faces, fixed pair lists
    let analyzer = pipeline.analyzer();
    let feasibility = &state.feasibility;
    set.feasible_force = analyzer.face_jacobian(
        &state.allocation.force_generators(),
        &d_forces,
        &feasibility.force.pairs,
        &hover_force(cog.mass, pipeline.gravity()),
        dimension,
    );
    set.feasible_torque = analyzer.face_jacobian(
        &state.allocation.torque_generators(),
        &d_torques,
        &feasibility.torque.pairs,
        &Vector3::zeros(),
        dimension,
    );
    Ok(set)
}
