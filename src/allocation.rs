use nalgebra::{DMatrix, DVector, Vector3, Vector6};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ModelError;
use crate::rotor::Rotor;

/// Which wrench axes the static thrust has to balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Thrust along z plus the three torques.
    #[default]
    UnderActuated,
    /// All six wrench axes.
    FullyActuated,
}

impl AllocationStrategy {
    /// Rows of the wrench allocation matrix that are controlled.
    pub fn controlled_axes(&self) -> &'static [usize] {
        match self {
            AllocationStrategy::UnderActuated => &[2, 3, 4, 5],
            AllocationStrategy::FullyActuated => &[0, 1, 2, 3, 4, 5],
        }
    }
}

/// 6×N map from rotor thrusts to the wrench about the CoG, CoG frame.
///
/// Column `i` is `[u_i; p_i × u_i + κ σ_i u_i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct WrenchAllocationMatrix {
    matrix: DMatrix<f64>,
}

impl WrenchAllocationMatrix {
    pub fn from_rotors(rotors: &[Rotor]) -> Self {
        let mut matrix = DMatrix::zeros(6, rotors.len());
        for (i, rotor) in rotors.iter().enumerate() {
            matrix.fixed_view_mut::<3, 1>(0, i).copy_from(&rotor.axis.into_inner());
            matrix.fixed_view_mut::<3, 1>(3, i).copy_from(&rotor.torque_generator());
        }
        Self { matrix }
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn rotor_count(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn force_generators(&self) -> Vec<Vector3<f64>> {
        self.generators(0)
    }

    pub fn torque_generators(&self) -> Vec<Vector3<f64>> {
        self.generators(3)
    }

    fn generators(&self, row: usize) -> Vec<Vector3<f64>> {
        (0..self.matrix.ncols())
            .map(|i| self.matrix.fixed_view::<3, 1>(row, i).into_owned())
            .collect()
    }

    /// The rows listed in `axes`.
    pub fn controlled(&self, axes: &[usize]) -> DMatrix<f64> {
        DMatrix::from_fn(axes.len(), self.matrix.ncols(), |r, c| self.matrix[(axes[r], c)])
    }

    pub fn wrench(&self, thrust: &DVector<f64>) -> Vector6<f64> {
        let w = &self.matrix * thrust;
        Vector6::from_column_slice(w.as_slice())
    }
}

/// Gravity wrench acting on the CoG, CoG-frame axes with gravity along -Z.
pub fn gravity_wrench(mass: f64, gravity: f64) -> Vector6<f64> {
    Vector6::new(0.0, 0.0, -mass * gravity, 0.0, 0.0, 0.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticThrust {
    pub thrust: DVector<f64>,
    pub condition_number: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct WrenchAllocationSolver {
    strategy: AllocationStrategy,
    condition_limit: f64,
}

impl WrenchAllocationSolver {
    pub fn new(strategy: AllocationStrategy, condition_limit: f64) -> Self {
        Self {
            strategy,
            condition_limit,
        }
    }

    pub fn strategy(&self) -> AllocationStrategy {
        self.strategy
    }

    pub fn build_allocation_matrix(&self, rotors: &[Rotor]) -> WrenchAllocationMatrix {
        WrenchAllocationMatrix::from_rotors(rotors)
    }

    /// Thrusts `λ` with `Q_r λ = -w_r` on the controlled rows.
    ///
    /// Square systems are solved directly; redundant ones take the
    /// minimum-norm solution `Q_rᵀ (Q_r Q_rᵀ)⁻¹ b`. Rank deficiency or a
    /// condition number above the limit is reported, never approximated.
    pub fn solve_static_thrust(
        &self,
        allocation: &WrenchAllocationMatrix,
        gravity_wrench: &Vector6<f64>,
    ) -> Result<StaticThrust, ModelError> {
        let axes = self.strategy.controlled_axes();
        let q = allocation.controlled(axes);
        let b = DVector::from_iterator(axes.len(), axes.iter().map(|&a| -gravity_wrench[a]));
        let required = axes.len();

        let (rank, condition_number) = rank_and_condition(&q);
        let underconstrained = ModelError::UnderconstrainedAllocation {
            rank,
            required,
            condition_number,
        };
        if q.ncols() < required || rank < required || condition_number > self.condition_limit {
            return Err(underconstrained);
        }

        let thrust = if q.ncols() == required {
            q.lu().solve(&b).ok_or(underconstrained)?
        } else {
            let gram = &q * q.transpose();
            let y = gram.cholesky().ok_or(underconstrained)?.solve(&b);
            q.transpose() * y
        };

        debug!(thrust = ?thrust.as_slice(), condition_number, "static thrust");
        Ok(StaticThrust {
            thrust,
            condition_number,
        })
    }
}

/// Sweeps allowed before the SVD gives up on a matrix.
const SVD_MAX_ITERATIONS: usize = 1000;

/// Numerical rank and 2-norm condition number of `q`.
///
/// Non-finite entries, or an SVD that does not converge, count as rank 0
/// with an infinite condition number.
pub(crate) fn rank_and_condition(q: &DMatrix<f64>) -> (usize, f64) {
    if q.iter().any(|x| !x.is_finite()) {
        warn!("allocation matrix has non-finite entries");
        return (0, f64::INFINITY);
    }
    let Some(svd) = q.clone().try_svd(false, false, f64::EPSILON, SVD_MAX_ITERATIONS) else {
        warn!(shape = ?q.shape(), "allocation SVD did not converge");
        return (0, f64::INFINITY);
    };
    let singular = svd.singular_values;
    let max = singular.max();
    let tolerance = max * q.nrows().max(q.ncols()) as f64 * f64::EPSILON;
    let rank = singular.iter().filter(|s| **s > tolerance).count();
    let min = singular.min();
    let condition = if min > 0.0 { max / min } else { f64::INFINITY };
    (rank, condition)
}
