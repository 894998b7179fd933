//! Sensitivities of the model with respect to the generalized coordinates.
//!
//! Columns are laid out as `6 + n`: root translation along the three CoG
//! frame axes, root rotation about them, then the revolute joints in
//! coordinate order. Every Jacobian is expressed in the level frame (root
//! origin, CoG-frame axes).

mod analytic;
mod numerical;

use std::fmt;
use std::ops::Deref;

use nalgebra::{DMatrix, UnitQuaternion};
use tracing::{debug, warn};

use crate::config::JacobianConfig;
use crate::error::ModelError;
use crate::pipeline::{ModelPipeline, ModelState};

#[derive(Debug, Clone, PartialEq)]
pub struct JacobianSet {
    /// 3 × D, CoG position.
    pub cog: DMatrix<f64>,
    /// 3 × D, angular momentum per unit coordinate rate.
    pub momentum: DMatrix<f64>,
    /// N × D
    pub static_thrust: DMatrix<f64>,
    /// n × D
    pub joint_torque: DMatrix<f64>,
    /// One row per force face, smooth distances.
    pub feasible_force: DMatrix<f64>,
    /// One row per torque face, smooth distances.
    pub feasible_torque: DMatrix<f64>,
}

impl JacobianSet {
    fn zeros(state: &ModelState, dimension: usize) -> Self {
        Self {
            cog: DMatrix::zeros(3, dimension),
            momentum: DMatrix::zeros(3, dimension),
            static_thrust: DMatrix::zeros(state.rotors.len(), dimension),
            joint_torque: DMatrix::zeros(state.joint_axes.len(), dimension),
            feasible_force: DMatrix::zeros(state.feasibility.force.pairs.len(), dimension),
            feasible_torque: DMatrix::zeros(state.feasibility.torque.pairs.len(), dimension),
        }
    }

    /// Number of columns, `6 + n`.
    pub fn dimension(&self) -> usize {
        self.cog.ncols()
    }

    pub fn get(&self, quantity: JacobianQuantity) -> &DMatrix<f64> {
        match quantity {
            JacobianQuantity::Cog => &self.cog,
            JacobianQuantity::Momentum => &self.momentum,
            JacobianQuantity::StaticThrust => &self.static_thrust,
            JacobianQuantity::JointTorque => &self.joint_torque,
            JacobianQuantity::FeasibleForce => &self.feasible_force,
            JacobianQuantity::FeasibleTorque => &self.feasible_torque,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JacobianQuantity {
    Cog,
    Momentum,
    StaticThrust,
    JointTorque,
    FeasibleForce,
    FeasibleTorque,
}

impl JacobianQuantity {
    pub const ALL: [JacobianQuantity; 6] = [
        JacobianQuantity::Cog,
        JacobianQuantity::Momentum,
        JacobianQuantity::StaticThrust,
        JacobianQuantity::JointTorque,
        JacobianQuantity::FeasibleForce,
        JacobianQuantity::FeasibleTorque,
    ];
}

impl fmt::Display for JacobianQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JacobianQuantity::Cog => "cog",
            JacobianQuantity::Momentum => "momentum",
            JacobianQuantity::StaticThrust => "static_thrust",
            JacobianQuantity::JointTorque => "joint_torque",
            JacobianQuantity::FeasibleForce => "feasible_force",
            JacobianQuantity::FeasibleTorque => "feasible_torque",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantityReport {
    pub quantity: JacobianQuantity,
    pub max_abs_diff: f64,
    pub passed: bool,
}

/// Analytic vs. finite-difference comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianReport {
    pub tolerance: f64,
    pub quantities: Vec<QuantityReport>,
}

impl JacobianReport {
    pub fn passed(&self) -> bool {
        self.quantities.iter().all(|q| q.passed)
    }

    pub fn get(&self, quantity: JacobianQuantity) -> Option<&QuantityReport> {
        self.quantities.iter().find(|q| q.quantity == quantity)
    }
}

/// Temporarily overrides the pipeline's desired CoG orientation.
///
/// The value held when the scope was opened is written back on drop, so
/// early returns and unwinding leave the pipeline at its nominal value.
pub struct DesireOrientationScope<'a> {
    pipeline: &'a mut ModelPipeline,
    nominal: UnitQuaternion<f64>,
}

impl<'a> DesireOrientationScope<'a> {
    pub fn new(pipeline: &'a mut ModelPipeline) -> Self {
        let nominal = pipeline.desire_orientation();
        Self { pipeline, nominal }
    }

    pub fn nominal(&self) -> UnitQuaternion<f64> {
        self.nominal
    }

    pub fn push(&mut self, orientation: UnitQuaternion<f64>) {
        self.pipeline.set_desire_orientation(orientation);
    }
}

impl Deref for DesireOrientationScope<'_> {
    type Target = ModelPipeline;

    fn deref(&self) -> &ModelPipeline {
        self.pipeline
    }
}

impl Drop for DesireOrientationScope<'_> {
    fn drop(&mut self) {
        self.pipeline.set_desire_orientation(self.nominal);
    }
}

/// Analytic Jacobians for the control path, finite differences for
/// self-checks.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianEngine {
    config: JacobianConfig,
}

impl JacobianEngine {
    pub fn new(config: JacobianConfig) -> Self {
        Self { config }
    }

    pub fn analytic(
        &self,
        pipeline: &ModelPipeline,
        state: &ModelState,
    ) -> Result<JacobianSet, ModelError> {
        analytic::jacobians(pipeline, state)
    }

    /// Perturb one coordinate at a time and difference against `nominal`.
    /// The pipeline's desired orientation is back at its nominal value on
    /// return, error or not.
    pub fn numerical(
        &self,
        pipeline: &mut ModelPipeline,
        nominal: &ModelState,
    ) -> Result<JacobianSet, ModelError> {
        numerical::jacobians(pipeline, nominal, self.config.perturbation)
    }

    pub fn compare(&self, analytic: &JacobianSet, numerical: &JacobianSet) -> JacobianReport {
        let quantities = JacobianQuantity::ALL
            .iter()
            .map(|&quantity| {
                let a = analytic.get(quantity);
                let n = numerical.get(quantity);
                let max_abs_diff = if a.shape() == n.shape() {
                    (a - n).iter().fold(0.0, |m: f64, d| m.max(d.abs()))
                } else {
                    f64::INFINITY
                };
                let passed = max_abs_diff < self.config.tolerance;
                if passed {
                    debug!(%quantity, max_abs_diff, "jacobian check passed");
                } else {
                    warn!(
                        %quantity,
                        max_abs_diff,
                        tolerance = self.config.tolerance,
                        "analytic jacobian disagrees with finite differences"
                    );
                }
                QuantityReport {
                    quantity,
                    max_abs_diff,
                    passed,
                }
            })
            .collect();
        JacobianReport {
            tolerance: self.config.tolerance,
            quantities,
        }
    }

    /// Analytic and numerical Jacobians at `nominal`, compared.
    pub fn validate(
        &self,
        pipeline: &mut ModelPipeline,
        nominal: &ModelState,
    ) -> Result<JacobianReport, ModelError> {
        let analytic = self.analytic(pipeline, nominal)?;
        let numerical = self.numerical(pipeline, nominal)?;
        Ok(self.compare(&analytic, &numerical))
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{DMatrix, UnitQuaternion};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::config::ModelConfig;
    use crate::coordinates::GeneralizedCoordinates;
    use crate::test_robots;

    fn engine() -> JacobianEngine {
        JacobianEngine::new(JacobianConfig::default())
    }

    fn with_desire(config: ModelConfig, desire: UnitQuaternion<f64>) -> ModelConfig {
        ModelConfig {
            cog_desire_orientation: [desire.i, desire.j, desire.k, desire.w],
            ..config
        }
    }

    fn check(pipeline: &mut ModelPipeline, q: &GeneralizedCoordinates) -> JacobianReport {
        let nominal = pipeline.solve(q).unwrap();
        let report = engine().validate(pipeline, &nominal).unwrap();
        for quantity in &report.quantities {
            assert!(
                quantity.passed,
                "{} differs by {:.3e}",
                quantity.quantity, quantity.max_abs_diff
            );
        }
        report
    }

    #[test]
    fn hydrus_jacobians_agree() {
        let mut pipeline = ModelPipeline::new(test_robots::hydrus_tree(), &test_robots::hydrus_config()).unwrap();
        let q = test_robots::coordinates(pipeline.tree(), &[0.9, 1.2, 0.7]);
        check(&mut pipeline, &q);

        let q = test_robots::coordinates(pipeline.tree(), &[1.5707963, 1.5707963, 1.5707963]);
        check(&mut pipeline, &q);
    }

    #[test]
    fn hydrus_jacobians_agree_with_tilted_desire() {
        let config = with_desire(
            test_robots::hydrus_config(),
            UnitQuaternion::from_axis_angle(&nalgebra::Vector3::x_axis(), 0.1),
        );
        let mut pipeline = ModelPipeline::new(test_robots::hydrus_tree(), &config).unwrap();
        let q = test_robots::coordinates(pipeline.tree(), &[0.9, 1.2, 0.7]);
        check(&mut pipeline, &q);
    }

    #[test]
    fn hexa_jacobians_agree() {
        let mut pipeline = ModelPipeline::new(test_robots::hexa_tree(), &test_robots::hexa_config()).unwrap();
        let zero = GeneralizedCoordinates::zeros(pipeline.tree());
        assert!(check(&mut pipeline, &zero).passed());

        let q = test_robots::coordinates(pipeline.tree(), &[0.2, -0.15]);
        let nominal = pipeline.solve(&q).unwrap();
        let analytic = engine().analytic(&pipeline, &nominal).unwrap();
        // a full-rank hexa exercises every family
        assert_eq!(analytic.dimension(), 8);
        assert!(analytic.feasible_force.nrows() > 0);
        assert!(analytic.feasible_torque.nrows() > 0);
        assert_eq!(analytic.joint_torque.shape(), (2, 8));
        check(&mut pipeline, &q);
    }

    #[test]
    fn hexa_jacobians_agree_with_tilted_desire() {
        let desire = UnitQuaternion::from_axis_angle(&nalgebra::Vector3::y_axis(), 0.05)
            * UnitQuaternion::from_axis_angle(&nalgebra::Vector3::z_axis(), 0.3);
        let config = with_desire(test_robots::hexa_config(), desire);
        let mut pipeline = ModelPipeline::new(test_robots::hexa_tree(), &config).unwrap();
        let q = test_robots::coordinates(pipeline.tree(), &[0.2, -0.15]);
        check(&mut pipeline, &q);
    }

    #[test]
    fn jacobians_agree_over_seeded_poses() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let mut hexa = ModelPipeline::new(test_robots::hexa_tree(), &test_robots::hexa_config()).unwrap();
        for _ in 0..6 {
            let q: Vec<f64> = (0..2).map(|_| rng.gen_range(-0.4..0.4)).collect();
            let q = test_robots::coordinates(hexa.tree(), &q);
            check(&mut hexa, &q);
        }

        // hydrus stays folded: a straight chain has no roll authority
        let mut hydrus = ModelPipeline::new(test_robots::hydrus_tree(), &test_robots::hydrus_config()).unwrap();
        for _ in 0..6 {
            let q: Vec<f64> = (0..3).map(|_| rng.gen_range(0.5..1.6)).collect();
            let q = test_robots::coordinates(hydrus.tree(), &q);
            check(&mut hydrus, &q);
        }
    }

    #[test]
    fn quad_jacobians_agree() {
        let mut pipeline = ModelPipeline::new(test_robots::quad_tree(), &ModelConfig::default()).unwrap();
        let zero = GeneralizedCoordinates::zeros(pipeline.tree());
        let report = check(&mut pipeline, &zero);
        assert_eq!(report.quantities.len(), 6);
    }

    #[test]
    fn translation_columns_of_cog_jacobian_are_the_level_rotation() {
        let pipeline = ModelPipeline::new(test_robots::hexa_tree(), &test_robots::hexa_config()).unwrap();
        let q = test_robots::coordinates(pipeline.tree(), &[0.2, -0.15]);
        let nominal = pipeline.solve(&q).unwrap();
        let analytic = engine().analytic(&pipeline, &nominal).unwrap();
        let level = nominal.inertial.cog.level_rotation().to_rotation_matrix().into_inner();
        for r in 0..3 {
            for c in 0..3 {
                assert!((analytic.cog[(r, c)] - level[(r, c)]).abs() < 1e-12);
            }
        }
        // a pure translation moves neither the thrusts nor the torques
        assert!(analytic.static_thrust.columns(0, 3).amax() < 1e-9);
        assert!(analytic.joint_torque.columns(0, 3).amax() < 1e-9);
    }

    #[test]
    fn numerical_path_restores_desire_orientation() {
        let desire = UnitQuaternion::from_axis_angle(&nalgebra::Vector3::z_axis(), 0.3);
        let config = with_desire(test_robots::hexa_config(), desire);
        let mut pipeline = ModelPipeline::new(test_robots::hexa_tree(), &config).unwrap();
        let q = test_robots::coordinates(pipeline.tree(), &[0.2, -0.15]);
        let nominal = pipeline.solve(&q).unwrap();
        let before = pipeline.desire_orientation();

        engine().numerical(&mut pipeline, &nominal).unwrap();
        assert_eq!(pipeline.desire_orientation(), before);
        assert_eq!(pipeline.solve(&q).unwrap(), nominal);
    }

    #[test]
    fn scope_restores_on_early_exit() {
        let mut pipeline = ModelPipeline::new(test_robots::quad_tree(), &ModelConfig::default()).unwrap();
        let nominal = pipeline.desire_orientation();

        let failing = |pipeline: &mut ModelPipeline| -> Result<(), ModelError> {
            let mut scope = DesireOrientationScope::new(pipeline);
            scope.push(UnitQuaternion::from_euler_angles(0.2, 0.1, 0.0));
            assert_ne!(scope.desire_orientation(), scope.nominal());
            // wrong coordinate count: the solve fails inside the scope
            let q = GeneralizedCoordinates::zeros(&test_robots::hydrus_tree());
            scope.solve(&q)?;
            Ok(())
        };
        assert!(matches!(failing(&mut pipeline), Err(ModelError::DimensionMismatch { .. })));
        assert_eq!(pipeline.desire_orientation(), nominal);
    }

    #[test]
    fn mismatch_is_reported_not_raised() {
        let pipeline = ModelPipeline::new(test_robots::hexa_tree(), &test_robots::hexa_config()).unwrap();
        let nominal = pipeline.solve(&GeneralizedCoordinates::zeros(pipeline.tree())).unwrap();
        let analytic = engine().analytic(&pipeline, &nominal).unwrap();
        let mut wrong = analytic.clone();
        wrong.static_thrust += DMatrix::from_element(wrong.static_thrust.nrows(), wrong.static_thrust.ncols(), 0.5);

        let report = engine().compare(&analytic, &wrong);
        assert!(!report.passed());
        let thrust = report.get(JacobianQuantity::StaticThrust).unwrap();
        assert!(!thrust.passed);
        assert!((thrust.max_abs_diff - 0.5).abs() < 1e-12);
        assert!(report.get(JacobianQuantity::Cog).unwrap().passed);
    }
}
