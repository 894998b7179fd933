use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

use super::{DesireOrientationScope, JacobianSet};
use crate::error::ModelError;
use crate::feasibility::{hover_force, FeasibleControlAnalyzer, Support};
use crate::kinematics::KinematicTreeEvaluator;
use crate::pipeline::{ModelPipeline, ModelState};
use crate::spatial_inertial::RigidBodyInertia;

/// Central differences of every quantity around one nominal state.
struct Differences<'a> {
    nominal: &'a ModelState,
    groups: Vec<(usize, RigidBodyInertia)>,
    analyzer: FeasibleControlAnalyzer,
    gravity: f64,
    delta: f64,
    centre: Vector3<f64>,
}

impl<'a> Differences<'a> {
    fn new(pipeline: &ModelPipeline, nominal: &'a ModelState, delta: f64) -> Self {
        let groups = pipeline
            .aggregator()
            .groups()
            .iter()
            .map(|group| group.base)
            .zip(nominal.inertial.groups.iter().copied())
            .collect();
        Self {
            nominal,
            groups,
            analyzer: *pipeline.analyzer(),
            gravity: pipeline.gravity(),
            delta,
            centre: level_cog(nominal),
        }
    }

    /// Column `column` from the states at `+δ` and `-δ`.
    fn fill(&self, set: &mut JacobianSet, column: usize, plus: &ModelState, minus: &ModelState) {
        let span = 2.0 * self.delta;

        set.cog
            .set_column(column, &((level_cog(plus) - level_cog(minus)) / span));
        set.momentum.set_column(column, &self.momentum(plus, minus));
        set.static_thrust.set_column(
            column,
            &((&plus.static_thrust.thrust - &minus.static_thrust.thrust) / span),
        );
        set.joint_torque
            .set_column(column, &((&plus.joint_torque - &minus.joint_torque) / span));

        let (force_plus, torque_plus) = self.face_distances(plus);
        let (force_minus, torque_minus) = self.face_distances(minus);
        for (row, (p, m)) in force_plus.iter().zip(&force_minus).enumerate() {
            set.feasible_force[(row, column)] = (p - m) / span;
        }
        for (row, (p, m)) in torque_plus.iter().zip(&torque_minus).enumerate() {
            set.feasible_torque[(row, column)] = (p - m) / span;
        }
    }

    /// `Σ (C_b - C) × m_b Ċ_b + I_b ω_b`, rates taken across the two
    /// states and levers and inertias at the nominal one.
    fn momentum(&self, plus: &ModelState, minus: &ModelState) -> Vector3<f64> {
        let span = 2.0 * self.delta;
        let nominal = self.nominal;
        let mut momentum = Vector3::zeros();
        for (base, inertia) in &self.groups {
            let cog: Point3<f64> = inertia.cog().into();
            let at = |state: &ModelState| {
                state.inertial.cog.level_rotation() * state.frames[*base].transform_point(&cog).coords
            };
            let linear = (at(plus) - at(minus)) * (inertia.mass() / span);
            momentum += (at(nominal) - self.centre).cross(&linear);

            let orientation = |state: &ModelState| {
                rotation(&(state.inertial.cog.level_rotation() * state.frames[*base].rotation))
            };
            let r0 = orientation(nominal);
            let w = (orientation(plus) - orientation(minus)) / span * r0.transpose();
            let omega = Vector3::new(w[(2, 1)], w[(0, 2)], w[(1, 0)]);
            momentum += r0 * inertia.inertia_about_cog() * r0.transpose() * omega;
        }
        momentum
    }

    /// Smooth distances of `state`'s generators over the nominal faces.
    fn face_distances(&self, state: &ModelState) -> (Vec<f64>, Vec<f64>) {
        let feasibility = &self.nominal.feasibility;
        let force = self.analyzer.face_distances(
            &state.allocation.force_generators(),
            &feasibility.force.pairs,
            &hover_force(state.inertial.cog.mass, self.gravity),
            Support::Smooth,
        );
        let torque = self.analyzer.face_distances(
            &state.allocation.torque_generators(),
            &feasibility.torque.pairs,
            &Vector3::zeros(),
            Support::Smooth,
        );
        (force, torque)
    }
}

fn rotation(q: &UnitQuaternion<f64>) -> Matrix3<f64> {
    q.to_rotation_matrix().into_inner()
}

fn level_cog(state: &ModelState) -> Vector3<f64> {
    state.inertial.cog.level_rotation() * state.inertial.cog.position()
}

pub(super) fn jacobians(
    pipeline: &mut ModelPipeline,
    nominal: &ModelState,
    delta: f64,
) -> Result<JacobianSet, ModelError> {
    let dimension = 6 + pipeline.tree().joint_count();
    let baselink = pipeline.baselink();
    let level = nominal.inertial.cog.level_rotation();
    let differences = Differences::new(pipeline, nominal, delta);
    let mut set = JacobianSet::zeros(nominal, dimension);

    // a root translation moves the CoG and nothing else
    set.cog
        .fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&rotation(&level));

    let mut scope = DesireOrientationScope::new(pipeline);

    // root rotation about each CoG-frame axis: the baselink turns and the
    // desired orientation turns with it
    let base_rotation = nominal.frames[baselink].rotation;
    for k in 0..3 {
        let mut turned = |step: f64| {
            let turn = UnitQuaternion::from_axis_angle(&Vector3::<f64>::ith_axis(k), step);
            scope.push(level * turn * base_rotation);
            scope.solve(&nominal.coordinates)
        };
        let plus = turned(delta)?;
        let minus = turned(-delta)?;
        differences.fill(&mut set, 3 + k, &plus, &minus);
    }

    // joints: hold the desired orientation to the perturbed baselink
    for j in 0..dimension - 6 {
        let mut bent = |step: f64| -> Result<ModelState, ModelError> {
            let coordinates = nominal.coordinates.perturbed(j, step);
            let frames = KinematicTreeEvaluator::evaluate(scope.tree(), &coordinates)?;
            scope.push(level * frames[baselink].rotation);
            scope.solve(&coordinates)
        };
        let plus = bent(delta)?;
        let minus = bent(-delta)?;
        differences.fill(&mut set, 6 + j, &plus, &minus);
    }
    Ok(set)
}
