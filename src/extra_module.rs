use std::collections::BTreeMap;

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use tracing::{info, warn};

use crate::config::is_unit;
use crate::error::ExtraModuleError;
use crate::inertial::InertialAggregator;
use crate::spatial_inertial::RigidBodyInertia;

/// Attachable payload or sensor, rigidly mounted on a base link.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraModule {
    pub name: String,
    pub parent: String,
    pub translation: Vector3<f64>,
    /// Mounting orientation as supplied; checked for unit norm on add.
    pub orientation: Quaternion<f64>,
    /// Inertia in the module frame.
    pub inertia: RigidBodyInertia,
}

impl ExtraModule {
    pub fn new(
        name: impl Into<String>,
        parent: impl Into<String>,
        translation: Vector3<f64>,
        orientation: Quaternion<f64>,
        inertia: RigidBodyInertia,
    ) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            translation,
            orientation,
            inertia,
        }
    }

    /// Module frame in the parent segment frame.
    pub fn offset(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.translation),
            UnitQuaternion::new_normalize(self.orientation),
        )
    }

    /// Inertia referred to the parent segment frame.
    pub fn local_inertia(&self) -> RigidBodyInertia {
        self.inertia.transformed(&self.offset())
    }
}

/// Name-keyed table of extra modules.
///
/// Rejected requests leave the table untouched. Changes are picked up by the
/// next aggregation, never by an aggregation already computed.
#[derive(Debug, Clone, Default)]
pub struct ExtraModuleRegistry {
    modules: BTreeMap<String, ExtraModule>,
}

impl ExtraModuleRegistry {
    pub fn add(
        &mut self,
        module: ExtraModule,
        aggregator: &InertialAggregator,
    ) -> Result<(), ExtraModuleError> {
        if let Err(err) = validate(&self.modules, &module, aggregator) {
            warn!(module = %module.name, %err, "extra module rejected");
            return Err(err);
        }
        info!(
            module = %module.name,
            parent = %module.parent,
            mass = module.inertia.mass(),
            "extra module added"
        );
        self.modules.insert(module.name.clone(), module);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<ExtraModule, ExtraModuleError> {
        match self.modules.remove(name) {
            Some(module) => {
                info!(module = %name, "extra module removed");
                Ok(module)
            }
            None => {
                warn!(module = %name, "cannot remove unknown extra module");
                Err(ExtraModuleError::NotFound(name.to_string()))
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ExtraModule> {
        self.modules.get(name)
    }

    /// Modules in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ExtraModule> + '_ {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn total_mass(&self) -> f64 {
        self.modules.values().map(|m| m.inertia.mass()).sum()
    }
}

fn validate(
    modules: &BTreeMap<String, ExtraModule>,
    module: &ExtraModule,
    aggregator: &InertialAggregator,
) -> Result<(), ExtraModuleError> {
    if modules.contains_key(&module.name) {
        return Err(ExtraModuleError::DuplicateName(module.name.clone()));
    }
    if !aggregator.is_base_link(&module.parent) {
        return Err(ExtraModuleError::UnknownParent(module.parent.clone()));
    }
    let mass = module.inertia.mass();
    if !mass.is_finite() || mass <= 0.0 {
        return Err(ExtraModuleError::InvalidMass(mass));
    }
    let finite = |v: &[f64]| v.iter().all(|x| x.is_finite());
    if !finite(module.translation.as_slice())
        || !finite(module.inertia.cog().as_slice())
        || !finite(module.inertia.inertia_about_cog().as_slice())
    {
        return Err(ExtraModuleError::NonFinitePlacement(module.name.clone()));
    }
    if !is_unit(&module.orientation) {
        return Err(ExtraModuleError::InvalidOrientation(module.orientation.norm_squared()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_robots;

    fn camera(mass: f64) -> ExtraModule {
        ExtraModule::new(
            "camera",
            "link2",
            Vector3::new(0.1, 0.0, -0.05),
            Quaternion::identity(),
            RigidBodyInertia::point_mass(mass, Vector3::zeros()),
        )
    }

    fn aggregator() -> InertialAggregator {
        InertialAggregator::new(&test_robots::hydrus_tree()).unwrap()
    }

    #[test]
    fn add_then_remove() {
        let aggregator = aggregator();
        let mut registry = ExtraModuleRegistry::default();
        registry.add(camera(0.3), &aggregator).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.total_mass(), 0.3);

        let removed = registry.remove("camera").unwrap();
        assert_eq!(removed, camera(0.3));
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let aggregator = aggregator();
        let mut registry = ExtraModuleRegistry::default();
        registry.add(camera(0.3), &aggregator).unwrap();
        assert_eq!(
            registry.add(camera(0.5), &aggregator),
            Err(ExtraModuleError::DuplicateName("camera".into()))
        );
        assert_eq!(registry.get("camera").unwrap().inertia.mass(), 0.3);
    }

    #[test]
    fn parent_must_be_a_base_link() {
        let aggregator = aggregator();
        let mut registry = ExtraModuleRegistry::default();
        let mut module = camera(0.3);
        module.parent = "thrust2".into();
        assert_eq!(
            registry.add(module, &aggregator),
            Err(ExtraModuleError::UnknownParent("thrust2".into()))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn non_positive_mass_is_rejected() {
        let aggregator = aggregator();
        let mut registry = ExtraModuleRegistry::default();
        assert_eq!(
            registry.add(camera(-0.2), &aggregator),
            Err(ExtraModuleError::InvalidMass(-0.2))
        );
        assert!(matches!(
            registry.add(camera(0.0), &aggregator),
            Err(ExtraModuleError::InvalidMass(_))
        ));
        assert!(matches!(
            registry.add(camera(f64::NAN), &aggregator),
            Err(ExtraModuleError::InvalidMass(_))
        ));
        assert_eq!(
            registry.add(camera(f64::INFINITY), &aggregator),
            Err(ExtraModuleError::InvalidMass(f64::INFINITY))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn non_finite_placement_is_rejected() {
        let aggregator = aggregator();
        let mut registry = ExtraModuleRegistry::default();
        let mut module = camera(0.3);
        module.translation.y = f64::NAN;
        assert_eq!(
            registry.add(module, &aggregator),
            Err(ExtraModuleError::NonFinitePlacement("camera".into()))
        );

        let mut module = camera(0.3);
        module.inertia = RigidBodyInertia::point_mass(0.3, Vector3::new(0.0, f64::INFINITY, 0.0));
        assert!(matches!(
            registry.add(module, &aggregator),
            Err(ExtraModuleError::NonFinitePlacement(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn orientation_must_be_unit() {
        let aggregator = aggregator();
        let mut registry = ExtraModuleRegistry::default();
        let mut module = camera(0.3);
        module.orientation = Quaternion::new(1.0, 0.0, 0.0, 0.01);
        assert!(matches!(
            registry.add(module.clone(), &aggregator),
            Err(ExtraModuleError::InvalidOrientation(_))
        ));

        // within 1e-6 of unit norm is accepted
        module.orientation = Quaternion::new(1.0 + 2e-7, 0.0, 0.0, 0.0);
        assert!(registry.add(module, &aggregator).is_ok());
    }

    #[test]
    fn removing_unknown_module_fails() {
        let mut registry = ExtraModuleRegistry::default();
        assert_eq!(
            registry.remove("ghost"),
            Err(ExtraModuleError::NotFound("ghost".into()))
        );
    }

    #[test]
    fn local_inertia_applies_mounting_offset() {
        let module = ExtraModule::new(
            "battery",
            "link1",
            Vector3::new(0.0, 0.0, -0.1),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3).into_inner(),
            RigidBodyInertia::point_mass(0.5, Vector3::new(0.1, 0.0, 0.0)),
        );
        let local = module.local_inertia();
        assert!((local.cog() - Vector3::new(0.3f64.cos() * 0.1, 0.3f64.sin() * 0.1, -0.1)).norm() < 1e-12);
    }
}
