use std::ops::{Add, AddAssign};

use nalgebra::{Isometry3, Matrix3, Point3, Vector3};

/// Rigid-body inertia referenced to a frame origin.
///
/// Stores the mass, the centre of gravity in the reference frame and the
/// rotational inertia about the reference origin. Composition is only
/// meaningful between inertias expressed in the same frame; use
/// [`RigidBodyInertia::transformed`] to refer one into another frame first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidBodyInertia {
    mass: f64,
    cog: Vector3<f64>,
    rotational: Matrix3<f64>,
}

impl Default for RigidBodyInertia {
    fn default() -> Self {
        Self::zero()
    }
}

impl RigidBodyInertia {
    pub fn zero() -> Self {
        Self {
            mass: 0.0,
            cog: Vector3::zeros(),
            rotational: Matrix3::zeros(),
        }
    }

    /// Build from mass, centre of gravity and the rotational inertia about
    /// the centre of gravity (axes parallel to the reference frame).
    pub fn new(mass: f64, cog: Vector3<f64>, inertia_about_cog: Matrix3<f64>) -> Self {
        Self {
            mass,
            cog,
            rotational: inertia_about_cog + steiner(mass, &cog),
        }
    }

    /// Inertia of a body whose tensor is given about its own inertial frame,
    /// placed at `inertial_frame` in the reference frame (URDF convention).
    pub fn from_inertial_frame(
        mass: f64,
        inertial_frame: &Isometry3<f64>,
        inertia: &Matrix3<f64>,
    ) -> Self {
        Self::new(mass, Vector3::zeros(), *inertia).transformed(inertial_frame)
    }

    pub fn point_mass(mass: f64, position: Vector3<f64>) -> Self {
        Self::new(mass, position, Matrix3::zeros())
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Centre of gravity in the reference frame.
    pub fn cog(&self) -> Vector3<f64> {
        self.cog
    }

    /// Rotational inertia about the reference origin.
    pub fn rotational_inertia(&self) -> Matrix3<f64> {
        self.rotational
    }

    /// Rotational inertia about the centre of gravity.
    pub fn inertia_about_cog(&self) -> Matrix3<f64> {
        self.rotational - steiner(self.mass, &self.cog)
    }

    /// The same body seen from a frame `frame` in which the current reference
    /// frame sits at `frame` (i.e. `frame * self`).
    pub fn transformed(&self, frame: &Isometry3<f64>) -> Self {
        let rotation = frame.rotation.to_rotation_matrix();
        let about_cog = rotation.matrix() * self.inertia_about_cog() * rotation.matrix().transpose();
        Self::new(self.mass, frame.transform_point(&Point3::from(self.cog)).coords, about_cog)
    }

    /// The same body with the reference origin moved to `point` (axes kept).
    pub fn ref_point(&self, point: &Vector3<f64>) -> Self {
        Self::new(self.mass, self.cog - point, self.inertia_about_cog())
    }
}

/// Parallel-axis term `m (|c|^2 E - c c^T)`.
fn steiner(mass: f64, c: &Vector3<f64>) -> Matrix3<f64> {
    (Matrix3::identity() * c.norm_squared() - c * c.transpose()) * mass
}

impl Add for RigidBodyInertia {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        let mass = self.mass + other.mass;
        let cog = if mass > 0.0 {
            (self.cog * self.mass + other.cog * other.mass) / mass
        } else {
            Vector3::zeros()
        };
        Self {
            mass,
            cog,
            rotational: self.rotational + other.rotational,
        }
    }
}

impl AddAssign for RigidBodyInertia {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    use super::*;

    #[test]
    fn offset_inertia_follows_parallel_axis() {
        let inertia = RigidBodyInertia::new(5.0, Vector3::new(1.0, 0.0, 0.0), Matrix3::from_diagonal_element(4.0));
        let i = inertia.rotational_inertia();
        assert_relative_eq!(i[(0, 0)], 4.0);
        assert_relative_eq!(i[(1, 1)], 9.0);
        assert_relative_eq!(i[(2, 2)], 9.0);
        assert_relative_eq!(inertia.inertia_about_cog(), Matrix3::from_diagonal_element(4.0), epsilon = 1e-12);
    }

    #[test]
    fn sum_preserves_mass_and_weights_cog() {
        let a = RigidBodyInertia::point_mass(1.0, Vector3::new(1.0, 0.0, 0.0));
        let b = RigidBodyInertia::point_mass(3.0, Vector3::new(-1.0, 0.0, 0.0));
        let sum = a + b;
        assert_relative_eq!(sum.mass(), 4.0);
        assert_relative_eq!(sum.cog(), Vector3::new(-0.5, 0.0, 0.0), epsilon = 1e-12);
        // two point masses on the x axis: I_yy about the cog = m1 d1^2 + m2 d2^2
        assert_relative_eq!(sum.inertia_about_cog()[(1, 1)], 1.0 * 1.5 * 1.5 + 3.0 * 0.5 * 0.5, epsilon = 1e-12);
    }

    #[test]
    fn zero_is_neutral() {
        let a = RigidBodyInertia::new(2.0, Vector3::new(0.1, 0.2, 0.3), Matrix3::from_diagonal(&Vector3::new(0.1, 0.2, 0.3)));
        assert_eq!(a + RigidBodyInertia::zero(), a);
    }

    #[test]
    fn transform_rotates_tensor_and_moves_cog() {
        let a = RigidBodyInertia::new(2.0, Vector3::new(1.0, 0.0, 0.0), Matrix3::from_diagonal(&Vector3::new(0.1, 0.2, 0.3)));
        let frame = Isometry3::from_parts(
            Translation3::new(0.0, 0.0, 1.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2),
        );
        let b = a.transformed(&frame);
        assert_relative_eq!(b.mass(), 2.0);
        assert_relative_eq!(b.cog(), Vector3::new(0.0, 1.0, 1.0), epsilon = 1e-12);
        assert_relative_eq!(
            b.inertia_about_cog(),
            Matrix3::from_diagonal(&Vector3::new(0.2, 0.1, 0.3)),
            epsilon = 1e-12
        );
        let back = b.transformed(&frame.inverse());
        assert_relative_eq!(back.rotational_inertia(), a.rotational_inertia(), epsilon = 1e-12);
    }

    #[test]
    fn ref_point_at_cog_gives_cog_tensor() {
        let a = RigidBodyInertia::new(2.0, Vector3::new(0.3, -0.2, 0.1), Matrix3::from_diagonal(&Vector3::new(0.1, 0.2, 0.3)));
        let at_cog = a.ref_point(&a.cog());
        assert_relative_eq!(at_cog.cog(), Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(at_cog.rotational_inertia(), a.inertia_about_cog(), epsilon = 1e-12);
    }
}
