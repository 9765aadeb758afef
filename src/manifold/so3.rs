//! SO3 - Special Orthogonal Group in 3D
//!
//! SO(3) elements are stored as nalgebra `UnitQuaternion`s. Tangent elements are
//! axis-angle vectors in R³, where the direction gives the rotation axis and the
//! magnitude gives the angle.

use crate::manifold::{LieGroup, Tangent};
use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};
use rand::Rng;
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// SO(3) group element representing rotations in 3D.
#[derive(Debug, Clone, PartialEq)]
pub struct SO3 {
    quaternion: UnitQuaternion<f64>,
}

impl Display for SO3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let q = self.quaternion.quaternion();
        write!(
            f,
            "SO3(quaternion: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            q.w, q.i, q.j, q.k
        )
    }
}

impl SO3 {
    /// Degrees of freedom - dimension of the tangent space
    pub const DOF: usize = 3;

    /// Identity rotation.
    pub fn identity() -> Self {
        SO3 {
            quaternion: UnitQuaternion::identity(),
        }
    }

    /// Create a new SO(3) element from a unit quaternion.
    pub fn new(quaternion: UnitQuaternion<f64>) -> Self {
        SO3 { quaternion }
    }

    /// Create SO(3) from a rotation axis and an angle in radians.
    pub fn from_axis_angle(axis: &Vector3<f64>, angle: f64) -> Self {
        SO3Tangent::new(axis.normalize() * angle).exp()
    }

    /// Create SO(3) from roll, pitch and yaw.
    pub fn from_euler_angles(roll: f64, pitch: f64, yaw: f64) -> Self {
        SO3::new(UnitQuaternion::from_euler_angles(roll, pitch, yaw))
    }

    /// Get the underlying unit quaternion.
    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        self.quaternion
    }

    /// Get the 3x3 rotation matrix.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.quaternion.to_rotation_matrix().into_inner()
    }
}

impl LieGroup for SO3 {
    type TangentVector = SO3Tangent;

    /// # Equation 140: Inverse of a unit quaternion
    /// q⁻¹ = q*
    fn inverse(&self) -> Self {
        SO3 {
            quaternion: self.quaternion.inverse(),
        }
    }

    fn compose(&self, other: &Self) -> Self {
        SO3 {
            quaternion: self.quaternion * other.quaternion,
        }
    }

    /// # Equation 133: Logarithmic map for unit quaternions
    /// θu = Log(q) = 2u arctan(‖v‖, w)
    fn log(&self) -> SO3Tangent {
        SO3Tangent {
            data: self.quaternion.scaled_axis(),
        }
    }

    fn act(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.quaternion * point
    }
}

/// SO(3) tangent space element in axis-angle form.
#[derive(Debug, Clone, PartialEq)]
pub struct SO3Tangent {
    data: Vector3<f64>,
}

impl SO3Tangent {
    /// Create a tangent element from an axis-angle vector.
    pub fn new(axis_angle: Vector3<f64>) -> Self {
        SO3Tangent { data: axis_angle }
    }

    /// Axis-angle coordinates.
    pub fn coeffs(&self) -> Vector3<f64> {
        self.data
    }

    /// Rotation angle in radians.
    pub fn angle(&self) -> f64 {
        self.data.norm()
    }

    /// Skew-symmetric matrix [θ]ₓ.
    pub fn hat(&self) -> Matrix3<f64> {
        skew(&self.data)
    }

    /// Sample a rotation perturbation with each component in `[-scale, scale]`.
    pub fn sample<R: Rng>(rng: &mut R, scale: f64) -> Self {
        SO3Tangent::new(Vector3::new(
            rng.random_range(-scale..=scale),
            rng.random_range(-scale..=scale),
            rng.random_range(-scale..=scale),
        ))
    }

    /// Left Jacobian for SO(3)
    ///
    /// # Equation 144
    /// J_l(θ) = I + (1 - cos θ)/θ² [θ]ₓ + (θ - sin θ)/θ³ [θ]ₓ²
    pub fn left_jacobian(&self) -> Matrix3<f64> {
        let angle_squared = self.data.norm_squared();
        let tangent_skew = self.hat();

        if angle_squared <= f64::EPSILON {
            Matrix3::identity() + 0.5 * tangent_skew
        } else {
            let theta = angle_squared.sqrt();
            Matrix3::identity()
                + (1.0 - theta.cos()) / angle_squared * tangent_skew
                + (theta - theta.sin()) / (angle_squared * theta) * tangent_skew * tangent_skew
        }
    }

    /// Inverse of the left Jacobian for SO(3)
    ///
    /// # Equation 146
    /// J_l⁻¹(θ) = I - ½[θ]ₓ + (1/θ² - (1 + cos θ)/(2θ sin θ)) [θ]ₓ²
    pub fn left_jacobian_inv(&self) -> Matrix3<f64> {
        let angle_squared = self.data.norm_squared();
        let tangent_skew = self.hat();

        if angle_squared <= f64::EPSILON {
            Matrix3::identity() - 0.5 * tangent_skew + tangent_skew * tangent_skew / 12.0
        } else {
            let theta = angle_squared.sqrt();
            let coefficient =
                1.0 / angle_squared - (1.0 + theta.cos()) / (2.0 * theta * theta.sin());
            Matrix3::identity() - 0.5 * tangent_skew + coefficient * tangent_skew * tangent_skew
        }
    }
}

impl Tangent<SO3> for SO3Tangent {
    const DIM: usize = 3;

    /// # Equation 132: Exponential map for unit quaternions
    /// q = Exp(θu) = cos(θ/2) + u sin(θ/2)
    fn exp(&self) -> SO3 {
        let quaternion = if self.data.norm_squared() > f64::EPSILON {
            UnitQuaternion::from_scaled_axis(self.data)
        } else {
            UnitQuaternion::from_quaternion(Quaternion::new(
                1.0,
                self.data.x / 2.0,
                self.data.y / 2.0,
                self.data.z / 2.0,
            ))
        };
        SO3 { quaternion }
    }

    fn norm(&self) -> f64 {
        self.data.norm()
    }

    fn zero() -> Self {
        SO3Tangent {
            data: Vector3::zeros(),
        }
    }
}

/// Skew-symmetric cross-product matrix of a 3-vector.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn test_so3_exp_log_identity() {
        let tangent = SO3Tangent::new(Vector3::new(0.1, -0.2, 0.3));
        let recovered = tangent.exp().log();
        assert!((recovered.coeffs() - tangent.coeffs()).norm() < TOLERANCE);
    }

    #[test]
    fn test_so3_small_angle_exp() {
        let tangent = SO3Tangent::new(Vector3::new(1e-10, 0.0, 0.0));
        let rotation = tangent.exp();
        let point = Vector3::new(0.0, 1.0, 0.0);
        assert!((rotation.act(&point) - point).norm() < 1e-9);
    }

    #[test]
    fn test_so3_inverse_compose() {
        let r = SO3::from_euler_angles(0.3, -0.1, 0.7);
        let product = r.compose(&r.inverse());
        assert!(product.is_approx(&SO3::identity(), TOLERANCE));
    }

    #[test]
    fn test_left_jacobian_inverse_pair() {
        for tangent in [
            SO3Tangent::new(Vector3::new(0.4, -0.3, 0.2)),
            SO3Tangent::new(Vector3::new(1e-9, 0.0, -1e-9)),
        ] {
            let product = tangent.left_jacobian() * tangent.left_jacobian_inv();
            assert!((product - Matrix3::identity()).norm() < 1e-9);
        }
    }

    #[test]
    fn test_skew_matches_cross_product() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(-0.5, 0.25, 4.0);
        assert!((skew(&a) * b - a.cross(&b)).norm() < TOLERANCE);
    }
}
