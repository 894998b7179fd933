use nalgebra::DVector;
use tracing::warn;

use crate::error::ModelError;
use crate::SegmentTree;

/// Joint angles indexed by the tree's joint-name→coordinate map.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralizedCoordinates {
    values: DVector<f64>,
}

impl GeneralizedCoordinates {
    pub fn zeros(tree: &SegmentTree) -> Self {
        Self {
            values: DVector::zeros(tree.joint_count()),
        }
    }

    pub fn from_vector(tree: &SegmentTree, values: DVector<f64>) -> Result<Self, ModelError> {
        if values.len() != tree.joint_count() {
            return Err(ModelError::DimensionMismatch {
                expected: tree.joint_count(),
                got: values.len(),
            });
        }
        if let Some((coordinate, value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(ModelError::NonFiniteCoordinate {
                joint: tree.joint_names().nth(coordinate).unwrap_or_default().to_string(),
                value: *value,
            });
        }
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, coordinate: usize) -> f64 {
        self.values[coordinate]
    }

    pub fn as_vector(&self) -> &DVector<f64> {
        &self.values
    }

    /// Write named joint values.
    ///
    /// Joints absent from `named` keep their previous value. Names the tree
    /// does not know are skipped and returned. A non-finite value for a
    /// known joint rejects the whole batch and leaves `self` unchanged.
    pub fn apply<S: AsRef<str>>(
        &mut self,
        tree: &SegmentTree,
        named: impl IntoIterator<Item = (S, f64)>,
    ) -> Result<Vec<String>, ModelError> {
        let mut values = self.values.clone();
        let mut unresolved = Vec::new();
        for (name, value) in named {
            let name = name.as_ref();
            match tree.joint_coordinate(name) {
                Some(_) if !value.is_finite() => {
                    return Err(ModelError::NonFiniteCoordinate {
                        joint: name.to_string(),
                        value,
                    });
                }
                Some(coordinate) => values[coordinate] = value,
                None => unresolved.push(name.to_string()),
            }
        }
        if !unresolved.is_empty() {
            warn!(joints = ?unresolved, "ignoring unknown joint names");
        }
        self.values = values;
        Ok(unresolved)
    }

    /// Named values in coordinate order.
    pub fn to_named(&self, tree: &SegmentTree) -> Vec<(String, f64)> {
        tree.joint_names()
            .zip(self.values.iter())
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    pub(crate) fn perturbed(&self, coordinate: usize, delta: f64) -> Self {
        let mut values = self.values.clone();
        values[coordinate] += delta;
        Self { values }
    }
}
