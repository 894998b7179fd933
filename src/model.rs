use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use nalgebra::{Quaternion, UnitQuaternion};
use tracing::{debug, error, info};

use crate::config::{is_unit, ModelConfig};
use crate::coordinates::GeneralizedCoordinates;
use crate::error::{ConfigError, ExtraModuleError, ModelError};
use crate::extra_module::ExtraModule;
use crate::jacobian::{JacobianEngine, JacobianReport, JacobianSet};
use crate::pipeline::{ModelPipeline, ModelState};
use crate::SegmentTree;

/// One complete update cycle, published as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSnapshot {
    pub state: ModelState,
    pub jacobians: JacobianSet,
}

struct ModelInner {
    pipeline: ModelPipeline,
    /// Coordinates of the last successful update.
    coordinates: GeneralizedCoordinates,
}

/// Thread-safe front of the model.
///
/// Updates and extra-module requests are serialized on one lock. Readers
/// take the last published [`ModelSnapshot`], which is swapped in only once
/// a cycle has finished every stage.
pub struct RobotModel {
    inner: Mutex<ModelInner>,
    snapshot: RwLock<Arc<ModelSnapshot>>,
    engine: JacobianEngine,
}

impl RobotModel {
    /// Build every stage and run a first update with all joints at zero.
    pub fn new(tree: SegmentTree, config: &ModelConfig) -> Result<Self, ModelError> {
        Self::with_coordinates(tree, config, std::iter::empty::<(&str, f64)>())
    }

    /// Like [`RobotModel::new`], with the first update at `named` joint
    /// values. Robots whose zero pose is singular, e.g. a straight chain,
    /// need this.
    pub fn with_coordinates<S: AsRef<str>>(
        tree: SegmentTree,
        config: &ModelConfig,
        named: impl IntoIterator<Item = (S, f64)>,
    ) -> Result<Self, ModelError> {
        let pipeline = ModelPipeline::new(tree, config)?;
        let engine = JacobianEngine::new(config.jacobian.clone());
        let mut coordinates = GeneralizedCoordinates::zeros(pipeline.tree());
        coordinates.apply(pipeline.tree(), named)?;
        let snapshot = compute(&pipeline, &engine, &coordinates)?;

        let tree = pipeline.tree();
        info!(
            segments = tree.len(),
            joints = tree.joint_count(),
            rotors = snapshot.state.rotors.len(),
            groups = pipeline.aggregator().groups().len(),
            mass = snapshot.state.inertial.cog.mass,
            "robot model built"
        );

        Ok(Self {
            inner: Mutex::new(ModelInner {
                pipeline,
                coordinates,
            }),
            snapshot: RwLock::new(Arc::new(snapshot)),
            engine,
        })
    }

    pub fn from_urdf_str(urdf: &str, config: &ModelConfig) -> Result<Self, ModelError> {
        Self::new(SegmentTree::from_urdf_str(urdf)?, config)
    }

    /// Recompute from named joint values and publish the result.
    ///
    /// Joints not named keep their last value. On error nothing is
    /// published and the last good coordinates are kept.
    pub fn update<S: AsRef<str>>(
        &self,
        named: impl IntoIterator<Item = (S, f64)>,
    ) -> Result<Arc<ModelSnapshot>, ModelError> {
        let mut inner = self.lock();
        let mut coordinates = inner.coordinates.clone();
        let snapshot = match coordinates
            .apply(inner.pipeline.tree(), named)
            .and_then(|_| compute(&inner.pipeline, &self.engine, &coordinates))
        {
            Ok(snapshot) => Arc::new(snapshot),
            Err(err) => {
                error!(%err, "model update failed");
                return Err(err);
            }
        };
        inner.coordinates = coordinates;
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    /// The last published snapshot.
    pub fn snapshot(&self) -> Arc<ModelSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Coordinates of the last successful update.
    pub fn coordinates(&self) -> GeneralizedCoordinates {
        self.lock().coordinates.clone()
    }

    /// Takes effect from the next [`RobotModel::update`].
    pub fn add_extra_module(&self, module: ExtraModule) -> Result<(), ExtraModuleError> {
        self.lock().pipeline.add_extra_module(module)
    }

    /// Takes effect from the next [`RobotModel::update`].
    pub fn remove_extra_module(&self, name: &str) -> Result<ExtraModule, ExtraModuleError> {
        self.lock().pipeline.remove_extra_module(name)
    }

    /// Replace the nominal desired CoG orientation. Takes effect from the
    /// next [`RobotModel::update`].
    pub fn set_cog_desire_orientation(&self, orientation: Quaternion<f64>) -> Result<(), ConfigError> {
        if !is_unit(&orientation) {
            return Err(ConfigError::invalid(
                "cog_desire_orientation",
                "must be a unit quaternion",
            ));
        }
        let orientation = UnitQuaternion::new_normalize(orientation);
        debug!(orientation = ?orientation.coords.as_slice(), "desired CoG orientation set");
        self.lock().pipeline.set_desire_orientation(orientation);
        Ok(())
    }

    /// Compare analytic and finite-difference Jacobians at the last good
    /// coordinates. Publishes nothing.
    pub fn validate_jacobians(&self) -> Result<JacobianReport, ModelError> {
        let mut inner = self.lock();
        let ModelInner {
            pipeline,
            coordinates,
        } = &mut *inner;
        let nominal = pipeline.solve(coordinates)?;
        self.engine.validate(pipeline, &nominal)
    }

    fn lock(&self) -> MutexGuard<'_, ModelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn compute(
    pipeline: &ModelPipeline,
    engine: &JacobianEngine,
    coordinates: &GeneralizedCoordinates,
) -> Result<ModelSnapshot, ModelError> {
    let state = pipeline.solve(coordinates)?;
    let jacobians = engine.analytic(pipeline, &state)?;
    Ok(ModelSnapshot { state, jacobians })
}
