use nalgebra::{DVector, UnitQuaternion, Vector6};
use tracing::debug;

use crate::allocation::{gravity_wrench, StaticThrust, WrenchAllocationMatrix, WrenchAllocationSolver};
use crate::config::ModelConfig;
use crate::coordinates::GeneralizedCoordinates;
use crate::error::{ExtraModuleError, ModelError};
use crate::extra_module::{ExtraModule, ExtraModuleRegistry};
use crate::feasibility::{FeasibilityMargins, FeasibleControlAnalyzer, StabilityCriteria, StabilityVerdict};
use crate::inertial::{InertialAggregator, InertialState};
use crate::joint_torque::{joint_axes, static_joint_torque, JointAxis, PointLoad};
use crate::kinematics::{KinematicTreeEvaluator, SegmentFrames};
use crate::rotor::{Rotor, RotorGeometryExtractor};
use crate::SegmentTree;

/// Everything one update cycle derives from the joint angles.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    pub coordinates: GeneralizedCoordinates,
    pub frames: SegmentFrames,
    pub inertial: InertialState,
    pub rotors: Vec<Rotor>,
    pub allocation: WrenchAllocationMatrix,
    pub gravity_wrench: Vector6<f64>,
    pub static_thrust: StaticThrust,
    pub joint_axes: Vec<JointAxis>,
    pub joint_torque: DVector<f64>,
    pub feasibility: FeasibilityMargins,
    pub stability: StabilityVerdict,
}

impl ModelState {
    /// Gravity on every inertia group and the static thrust on every rotor,
    /// as loads in the level frame.
    pub fn static_loads(&self, aggregator: &InertialAggregator, gravity: f64) -> Vec<PointLoad> {
        let level = self.inertial.cog.level_rotation();
        let gravity = nalgebra::Vector3::new(0.0, 0.0, -gravity);

        let masses = aggregator
            .groups()
            .iter()
            .zip(&self.inertial.groups)
            .map(|(group, inertia)| PointLoad {
                segment: group.base,
                point: level * self.frames[group.base].transform_point(&inertia.cog().into()).coords,
                force: gravity * inertia.mass(),
                moment: nalgebra::Vector3::zeros(),
            });
        let thrusts = self.rotors.iter().zip(self.static_thrust.thrust.iter()).map(|(rotor, thrust)| {
            let force = rotor.axis.into_inner() * *thrust;
            PointLoad {
                segment: rotor.segment,
                point: level * self.frames[rotor.segment].translation.vector,
                force,
                moment: force * (rotor.m_f_rate * rotor.direction),
            }
        });
        masses.chain(thrusts).collect()
    }
}

/// Fixed-order recomputation of the model from the joint angles.
///
/// Owns the tree, every stage and the extra-module table. `solve` is a pure
/// function of the coordinates, the registered extra modules and the
/// current desired CoG orientation.
#[derive(Debug, Clone)]
pub struct ModelPipeline {
    tree: SegmentTree,
    aggregator: InertialAggregator,
    extras: ExtraModuleRegistry,
    rotors: RotorGeometryExtractor,
    solver: WrenchAllocationSolver,
    analyzer: FeasibleControlAnalyzer,
    criteria: StabilityCriteria,
    baselink: usize,
    gravity: f64,
    desire_orientation: UnitQuaternion<f64>,
}

impl ModelPipeline {
    pub fn new(tree: SegmentTree, config: &ModelConfig) -> Result<Self, ModelError> {
        config.validate()?;
        let baselink = tree.require(&config.baselink)?;
        let aggregator = InertialAggregator::new(&tree)?;
        let rotors = RotorGeometryExtractor::new(&tree, config)?;
        Ok(Self {
            aggregator,
            rotors,
            solver: WrenchAllocationSolver::new(config.strategy, config.condition_limit),
            analyzer: FeasibleControlAnalyzer::from_config(config),
            criteria: StabilityCriteria::from_config(config),
            extras: ExtraModuleRegistry::default(),
            baselink,
            gravity: config.gravity,
            desire_orientation: config.desire_orientation()?,
            tree,
        })
    }

    pub fn tree(&self) -> &SegmentTree {
        &self.tree
    }

    pub fn aggregator(&self) -> &InertialAggregator {
        &self.aggregator
    }

    pub fn extras(&self) -> &ExtraModuleRegistry {
        &self.extras
    }

    pub fn rotor_extractor(&self) -> &RotorGeometryExtractor {
        &self.rotors
    }

    pub fn solver(&self) -> &WrenchAllocationSolver {
        &self.solver
    }

    pub fn analyzer(&self) -> &FeasibleControlAnalyzer {
        &self.analyzer
    }

    pub fn criteria(&self) -> &StabilityCriteria {
        &self.criteria
    }

    pub fn baselink(&self) -> usize {
        self.baselink
    }

    pub fn gravity(&self) -> f64 {
        self.gravity
    }

    pub fn desire_orientation(&self) -> UnitQuaternion<f64> {
        self.desire_orientation
    }

    pub(crate) fn set_desire_orientation(&mut self, orientation: UnitQuaternion<f64>) {
        self.desire_orientation = orientation;
    }

    pub fn add_extra_module(&mut self, module: ExtraModule) -> Result<(), ExtraModuleError> {
        self.extras.add(module, &self.aggregator)
    }

    pub fn remove_extra_module(&mut self, name: &str) -> Result<ExtraModule, ExtraModuleError> {
        self.extras.remove(name)
    }

    /// Kinematics → inertia → rotors → allocation → feasibility and
    /// stability → joint torque.
    pub fn solve(&self, coordinates: &GeneralizedCoordinates) -> Result<ModelState, ModelError> {
        let frames = KinematicTreeEvaluator::evaluate(&self.tree, coordinates)?;
        let inertial = self
            .aggregator
            .aggregate(&frames, &self.extras, self.baselink, &self.desire_orientation)?;
        let cog = &inertial.cog;
        debug!(mass = cog.mass, cog = ?cog.position().as_slice(), "centre of gravity");

        let rotors = self.rotors.extract(&frames, cog);
        let allocation = self.solver.build_allocation_matrix(&rotors);
        let gravity_wrench = gravity_wrench(cog.mass, self.gravity);
        let static_thrust = self.solver.solve_static_thrust(&allocation, &gravity_wrench)?;
        let feasibility = self.analyzer.compute_margins(&allocation, cog.mass, self.gravity);
        let stability = self.criteria.assess(&feasibility, &static_thrust.thrust);
        let joint_axes = joint_axes(&self.tree, &frames, &cog.level_rotation());

        let mut state = ModelState {
            coordinates: coordinates.clone(),
            frames,
            inertial,
            rotors,
            allocation,
            gravity_wrench,
            static_thrust,
            joint_axes,
            joint_torque: DVector::zeros(0),
            feasibility,
            stability,
        };
        let loads = state.static_loads(&self.aggregator, self.gravity);
        state.joint_torque = static_joint_torque(&self.tree, &state.joint_axes, &loads);
        Ok(state)
    }
}
