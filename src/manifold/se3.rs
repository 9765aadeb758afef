//! SE(3) - Special Euclidean Group in 3D
//!
//! SE(3) elements are a rotation ([`SO3`]) plus a translation. Tangent elements are
//! [rho(3), theta(3)] = 6 components, where rho is the translational part and theta
//! the rotational part.
//!
//! Camera poses in the bundle adjuster are camera-from-world transforms: `act`
//! maps a world point into the camera frame.

use crate::manifold::{
    LieGroup, Tangent,
    so3::{SO3, SO3Tangent},
};
use nalgebra::{Matrix3, UnitQuaternion, Vector3, Vector6};
use rand::Rng;
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// SE(3) group element representing rigid body transformations in 3D.
#[derive(Debug, Clone, PartialEq)]
pub struct SE3 {
    rotation: SO3,
    translation: Vector3<f64>,
}

impl Display for SE3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let t = self.translation;
        let q = self.rotation.quaternion();
        write!(
            f,
            "SE3(translation: [{:.4}, {:.4}, {:.4}], rotation: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            t.x, t.y, t.z, q.w, q.i, q.j, q.k
        )
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl SE3 {
    /// Degrees of freedom - dimension of the tangent space
    pub const DOF: usize = 6;

    /// Identity transform.
    pub fn identity() -> Self {
        SE3 {
            rotation: SO3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Create a new SE3 element from translation and rotation.
    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        SE3 {
            rotation: SO3::new(rotation),
            translation,
        }
    }

    /// Create SE3 from SO3 and Vector3 components.
    pub fn from_translation_so3(translation: Vector3<f64>, rotation: SO3) -> Self {
        SE3 {
            rotation,
            translation,
        }
    }

    /// Get the translation part.
    pub fn translation(&self) -> Vector3<f64> {
        self.translation
    }

    /// Get the rotation part as SO3.
    pub fn rotation_so3(&self) -> &SO3 {
        &self.rotation
    }

    /// Get the rotation part as a 3x3 matrix.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.rotation_matrix()
    }
}

impl LieGroup for SE3 {
    type TangentVector = SE3Tangent;

    /// # Equation 170: Inverse of SE(3) matrix
    /// M⁻¹ = [ Rᵀ -Rᵀt ]
    ///       [ 0    1   ]
    fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        let trans_inv = -rot_inv.act(&self.translation);
        SE3::from_translation_so3(trans_inv, rot_inv)
    }

    /// # Equation 171: Composition of SE(3) matrices
    /// M_a M_b = [ R_a*R_b   R_a*t_b + t_a ]
    ///           [ 0             1         ]
    fn compose(&self, other: &Self) -> Self {
        SE3::from_translation_so3(
            self.rotation.act(&other.translation) + self.translation,
            self.rotation.compose(&other.rotation),
        )
    }

    /// # Equation 173: SE(3) logarithmic map
    /// τ = log(M) = [ V⁻¹(θ) t ]
    ///              [ Log(R)  ]
    fn log(&self) -> SE3Tangent {
        let theta = self.rotation.log();
        let rho = theta.left_jacobian_inv() * self.translation;
        SE3Tangent::new(rho, theta.coeffs())
    }

    fn act(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.act(point) + self.translation
    }
}

/// SE(3) tangent space element, stored as `[rho, theta]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SE3Tangent {
    data: Vector6<f64>,
}

impl Display for SE3Tangent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rho = self.rho();
        let theta = self.theta();
        write!(
            f,
            "se3(rho: [{:.4}, {:.4}, {:.4}], theta: [{:.4}, {:.4}, {:.4}])",
            rho.x, rho.y, rho.z, theta.x, theta.y, theta.z
        )
    }
}

impl From<Vector6<f64>> for SE3Tangent {
    fn from(data: Vector6<f64>) -> Self {
        SE3Tangent { data }
    }
}

impl SE3Tangent {
    /// Create a tangent element from translational and rotational parts.
    pub fn new(rho: Vector3<f64>, theta: Vector3<f64>) -> Self {
        let mut data = Vector6::zeros();
        data.fixed_rows_mut::<3>(0).copy_from(&rho);
        data.fixed_rows_mut::<3>(3).copy_from(&theta);
        SE3Tangent { data }
    }

    /// Translational part.
    pub fn rho(&self) -> Vector3<f64> {
        self.data.fixed_rows::<3>(0).into_owned()
    }

    /// Rotational part.
    pub fn theta(&self) -> Vector3<f64> {
        self.data.fixed_rows::<3>(3).into_owned()
    }

    /// All six coordinates.
    pub fn coeffs(&self) -> Vector6<f64> {
        self.data
    }

    /// Sample a twist with translation components in `[-translation_scale, translation_scale]`
    /// and rotation components in `[-rotation_scale, rotation_scale]`.
    pub fn sample<R: Rng>(rng: &mut R, translation_scale: f64, rotation_scale: f64) -> Self {
        let rho = Vector3::new(
            rng.random_range(-translation_scale..=translation_scale),
            rng.random_range(-translation_scale..=translation_scale),
            rng.random_range(-translation_scale..=translation_scale),
        );
        SE3Tangent::new(rho, SO3Tangent::sample(rng, rotation_scale).coeffs())
    }
}

impl Tangent<SE3> for SE3Tangent {
    const DIM: usize = 6;

    /// # Equation 172: SE(3) exponential map
    /// M = exp(τ) = [ R(θ)   J_l(θ)ρ ]
    ///              [ 0         1    ]
    fn exp(&self) -> SE3 {
        let theta_tangent = SO3Tangent::new(self.theta());
        let translation = theta_tangent.left_jacobian() * self.rho();
        SE3::from_translation_so3(translation, theta_tangent.exp())
    }

    fn norm(&self) -> f64 {
        self.data.norm()
    }

    fn zero() -> Self {
        SE3Tangent {
            data: Vector6::zeros(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const TOLERANCE: f64 = 1e-10;

    #[test]
    fn test_se3_exp_log_roundtrip() {
        let tangent = SE3Tangent::new(Vector3::new(0.5, -0.2, 1.0), Vector3::new(0.1, 0.3, -0.2));
        let recovered = tangent.exp().log();
        assert!((recovered.coeffs() - tangent.coeffs()).norm() < TOLERANCE);
    }

    #[test]
    fn test_se3_inverse_compose() {
        let pose = SE3::new(
            Vector3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.2, -0.4, 0.9),
        );
        assert!(pose.compose(&pose.inverse()).is_approx(&SE3::identity(), TOLERANCE));
    }

    #[test]
    fn test_se3_act_rotates_then_translates() {
        let rotation = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        let translation = Vector3::new(-1.0, 0.5, 2.0);
        let pose = SE3::new(translation, rotation);
        let point = Vector3::new(0.3, -0.7, 4.0);
        let expected = rotation * point + translation;
        assert!((pose.act(&point) - expected).norm() < TOLERANCE);
    }

    #[test]
    fn test_left_plus_first_order_motion() {
        // exp(δ) ∘ T moves a transformed point by ρ + θ × Xc to first order
        let pose = SE3::new(
            Vector3::new(0.2, -0.1, 3.0),
            UnitQuaternion::from_euler_angles(0.05, -0.02, 0.1),
        );
        let point = Vector3::new(0.4, 0.3, 1.0);
        let camera_point = pose.act(&point);
        let rho = Vector3::new(1e-6, -2e-6, 3e-6);
        let theta = Vector3::new(-1e-6, 2e-6, 1e-6);
        let perturbed = pose.left_plus(&SE3Tangent::new(rho, theta)).act(&point);
        let predicted = camera_point + rho + theta.cross(&camera_point);
        assert!((perturbed - predicted).norm() < 1e-11);
    }

    #[test]
    fn test_left_minus_recovers_twist() {
        let mut rng = StdRng::seed_from_u64(7);
        let pose = SE3::new(Vector3::new(1.0, 0.0, 0.0), UnitQuaternion::identity());
        let twist = SE3Tangent::sample(&mut rng, 0.1, 0.05);
        let moved = pose.left_plus(&twist);
        let recovered = moved.left_minus(&pose);
        assert!((recovered.coeffs() - twist.coeffs()).norm() < TOLERANCE);
    }
}
