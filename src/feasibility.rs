use nalgebra::{DMatrix, DVector, Matrix3, Matrix3xX, RowDVector, Vector3};
use tracing::{debug, warn};

use crate::allocation::WrenchAllocationMatrix;
use crate::config::ModelConfig;

/// Generator pairs closer to parallel than this span no face.
const PARALLEL_TOLERANCE: f64 = 1e-6;
/// Generator sets whose largest normalised triple product is below this
/// have rank < 3.
const DEGENERATE_TOLERANCE: f64 = 1e-9;
/// `max_t (max(0, t) - t / (1 + e^-t))`.
const SOFTPLUS_GAP: f64 = 0.2785;

/// How the per-generator support term `s(x)` is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Support {
    /// `max(0, x)`
    Exact,
    /// `x / (1 + e^{-εx})`, never above the exact term.
    Smooth,
}

/// Face distances of one achievable set (force or torque).
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMargins {
    /// Ordered generator pairs spanning each face.
    pub pairs: Vec<(usize, usize)>,
    pub exact: Vec<f64>,
    pub approx: Vec<f64>,
    pub exact_margin: f64,
    pub approx_margin: f64,
    /// Generators span fewer than three dimensions; margins are zero.
    pub degenerate: bool,
}

impl FaceMargins {
    fn degenerate() -> Self {
        Self {
            pairs: Vec::new(),
            exact: Vec::new(),
            approx: Vec::new(),
            exact_margin: 0.0,
            approx_margin: 0.0,
            degenerate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeasibilityMargins {
    pub force: FaceMargins,
    pub torque: FaceMargins,
}

/// Whether a hover state can be held: both margins clear their thresholds
/// and every static thrust lies in `[thrust_min, thrust_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityVerdict {
    pub force_margin_ok: bool,
    pub torque_margin_ok: bool,
    pub thrust_within_bounds: bool,
}

impl StabilityVerdict {
    pub fn stable(&self) -> bool {
        self.force_margin_ok && self.torque_margin_ok && self.thrust_within_bounds
    }
}

/// Thresholds a state is judged against.
///
/// A degenerate set has margin 0 and so passes only a threshold of 0 or
/// below.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityCriteria {
    pub thrust_min: f64,
    pub thrust_max: f64,
    pub force_margin_threshold: f64,
    pub torque_margin_threshold: f64,
}

impl StabilityCriteria {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            thrust_min: config.thrust_min,
            thrust_max: config.thrust_max,
            force_margin_threshold: config.force_margin_threshold,
            torque_margin_threshold: config.torque_margin_threshold,
        }
    }

    pub fn assess(&self, margins: &FeasibilityMargins, thrust: &DVector<f64>) -> StabilityVerdict {
        let verdict = StabilityVerdict {
            force_margin_ok: margins.force.exact_margin >= self.force_margin_threshold,
            torque_margin_ok: margins.torque.exact_margin >= self.torque_margin_threshold,
            thrust_within_bounds: thrust
                .iter()
                .all(|t| (self.thrust_min..=self.thrust_max).contains(t)),
        };
        if verdict.stable() {
            debug!(?verdict, "stable");
        } else {
            warn!(
                ?verdict,
                force_margin = margins.force.exact_margin,
                torque_margin = margins.torque.exact_margin,
                thrust = ?thrust.as_slice(),
                "hover state is not stable"
            );
        }
        verdict
    }
}

/// Distance from the required wrench to the boundary of the zonotope
/// `{ Σ λ_i g_i : λ_i ∈ [f_min, f_max] }`, separately for force and torque.
///
/// Every non-parallel ordered pair `(i, j)` spans a face with normal
/// `n = g_i × g_j / |g_i × g_j|` and signed distance
/// `Σ_{k≠i,j} (f_min x_k + (f_max - f_min) s(x_k)) - n·w`, `x_k = n·g_k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeasibleControlAnalyzer {
    thrust_min: f64,
    thrust_max: f64,
    epsilon: f64,
}

impl FeasibleControlAnalyzer {
    pub fn new(thrust_min: f64, thrust_max: f64, epsilon: f64) -> Self {
        Self {
            thrust_min,
            thrust_max,
            epsilon,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.thrust_min, config.thrust_max, config.feasibility_epsilon)
    }

    /// Force margin against hovering `(0, 0, M g)`, torque margin against zero.
    pub fn compute_margins(
        &self,
        allocation: &WrenchAllocationMatrix,
        mass: f64,
        gravity: f64,
    ) -> FeasibilityMargins {
        let force = self.face_margins(&allocation.force_generators(), &hover_force(mass, gravity));
        let torque = self.face_margins(&allocation.torque_generators(), &Vector3::zeros());
        debug!(
            force_exact = force.exact_margin,
            force_approx = force.approx_margin,
            force_degenerate = force.degenerate,
            torque_exact = torque.exact_margin,
            torque_approx = torque.approx_margin,
            torque_degenerate = torque.degenerate,
            "feasibility margins"
        );
        FeasibilityMargins { force, torque }
    }

    pub fn face_margins(&self, generators: &[Vector3<f64>], required: &Vector3<f64>) -> FaceMargins {
        let Some(pairs) = face_pairs(generators) else {
            return FaceMargins::degenerate();
        };
        let exact = self.face_distances(generators, &pairs, required, Support::Exact);
        let approx = self.face_distances(generators, &pairs, required, Support::Smooth);
        FaceMargins {
            exact_margin: min(&exact),
            approx_margin: min(&approx),
            pairs,
            exact,
            approx,
            degenerate: false,
        }
    }

    pub fn face_distances(
        &self,
        generators: &[Vector3<f64>],
        pairs: &[(usize, usize)],
        required: &Vector3<f64>,
        support: Support,
    ) -> Vec<f64> {
        let span = self.thrust_max - self.thrust_min;
        pairs
            .iter()
            .map(|&(i, j)| {
                let normal = generators[i].cross(&generators[j]).normalize();
                let reach: f64 = generators
                    .iter()
                    .enumerate()
                    .filter(|(k, _)| *k != i && *k != j)
                    .map(|(_, g)| {
                        let x = normal.dot(g);
                        self.thrust_min * x + span * self.support(x, support)
                    })
                    .sum();
                reach - normal.dot(required)
            })
            .collect()
    }

    fn support(&self, x: f64, support: Support) -> f64 {
        match support {
            Support::Exact => x.max(0.0),
            Support::Smooth => x * sigmoid(self.epsilon * x),
        }
    }

    /// Derivative of the smooth face distances.
    ///
    /// `d_generators[k]` is the 3×D Jacobian of generator `k`; the required
    /// wrench is constant.
    pub fn face_jacobian(
        &self,
        generators: &[Vector3<f64>],
        d_generators: &[Matrix3xX<f64>],
        pairs: &[(usize, usize)],
        required: &Vector3<f64>,
        dimension: usize,
    ) -> DMatrix<f64> {
        let span = self.thrust_max - self.thrust_min;
        let mut jacobian = DMatrix::zeros(pairs.len(), dimension);
        for (row, &(i, j)) in pairs.iter().enumerate() {
            let c = generators[i].cross(&generators[j]);
            let norm = c.norm();
            let n = c / norm;
            let dc = -skew(&generators[j]) * &d_generators[i] + skew(&generators[i]) * &d_generators[j];
            let dn = (Matrix3::identity() - n * n.transpose()) * dc / norm;

            let mut d: RowDVector<f64> = -(required.transpose() * &dn);
            for (k, g) in generators.iter().enumerate() {
                if k == i || k == j {
                    continue;
                }
                let x = n.dot(g);
                let s = sigmoid(self.epsilon * x);
                let slope = s + self.epsilon * x * s * (1.0 - s);
                let dx = g.transpose() * &dn + n.transpose() * &d_generators[k];
                d += dx * (self.thrust_min + span * slope);
            }
            jacobian.row_mut(row).copy_from(&d);
        }
        jacobian
    }

    /// Largest per-face gap between exact and smooth distances.
    pub fn approximation_bound(&self, generator_count: usize) -> f64 {
        (self.thrust_max - self.thrust_min) * generator_count.saturating_sub(2) as f64 * SOFTPLUS_GAP
            / self.epsilon
    }
}

pub(crate) fn hover_force(mass: f64, gravity: f64) -> Vector3<f64> {
    Vector3::new(0.0, 0.0, mass * gravity)
}

/// Ordered non-parallel generator pairs, or `None` when the generators span
/// fewer than three dimensions.
///
/// Both tests use unit generators, so the result does not depend on the
/// robot's size or thrust constants. Zero generators span nothing.
pub fn face_pairs(generators: &[Vector3<f64>]) -> Option<Vec<(usize, usize)>> {
    let units: Vec<Vector3<f64>> = generators
        .iter()
        .map(|g| g.try_normalize(0.0).unwrap_or_else(Vector3::zeros))
        .collect();

    let mut volume: f64 = 0.0;
    for i in 0..units.len() {
        for j in i + 1..units.len() {
            let c = units[i].cross(&units[j]);
            for k in j + 1..units.len() {
                volume = volume.max(c.dot(&units[k]).abs());
            }
        }
    }
    if volume < DEGENERATE_TOLERANCE {
        return None;
    }

    let mut pairs = Vec::new();
    for i in 0..units.len() {
        for j in 0..units.len() {
            if i != j && units[i].cross(&units[j]).norm() > PARALLEL_TOLERANCE {
                pairs.push((i, j));
            }
        }
    }
    Some(pairs)
}

pub(crate) fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    v.cross_matrix()
}

fn sigmoid(t: f64) -> f64 {
    1.0 / (1.0 + (-t).exp())
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}
