//! Lie group representations for camera poses.
//!
//! The bundle adjuster parameterizes every camera by a rigid transform in SE(3) and
//! updates it through a 6-parameter twist applied on the left:
//!
//! ```text
//! T' = exp(δ^∧) ∘ T,    δ = [ρ, θ] ∈ R⁶
//! ```
//!
//! Lie group M,° | size   | dim | X ∈ M             | Exp(T)             | Comp. | Action
//! ------------- | ------ | --- | ----------------- | ------------------ | ----- | ------
//! Rotation      | SO(3),.| 9   | R                 | R = exp([θ]x)      | R₁R₂  | Rx
//! Rigid motion  | SE(3),.| 16  | M = [R t; 0 1]    | Exp([v̂])           | M₁M₂  | Rx+t
//!
//! The conventions follow the [manif](https://github.com/artivis/manif) C++ library.

pub mod se3;
pub mod so3;

pub use se3::{SE3, SE3Tangent};
pub use so3::{SO3, SO3Tangent};

/// Group operations shared by SO(3) and SE(3).
pub trait LieGroup: Clone + PartialEq {
    /// The tangent space vector type
    type TangentVector: Tangent<Self>;

    /// Inverse element g⁻¹ such that g ∘ g⁻¹ = e.
    fn inverse(&self) -> Self;

    /// Composition g₁ ∘ g₂.
    fn compose(&self, other: &Self) -> Self;

    /// Logarithmic map to the tangent space at identity.
    fn log(&self) -> Self::TangentVector;

    /// Action of the group element on a 3D point.
    fn act(&self, point: &nalgebra::Vector3<f64>) -> nalgebra::Vector3<f64>;

    /// Approximate equality through the tangent norm of g₂⁻¹ ∘ g₁.
    fn is_approx(&self, other: &Self, tolerance: f64) -> bool {
        other.inverse().compose(self).log().norm() < tolerance
    }

    /// Left plus: τ ⊕ g = exp(τ^∧) ∘ g.
    fn left_plus(&self, tangent: &Self::TangentVector) -> Self {
        tangent.exp().compose(self)
    }

    /// Left minus: g₁ ⊖ g₂ = log(g₁ ∘ g₂⁻¹).
    fn left_minus(&self, other: &Self) -> Self::TangentVector {
        self.compose(&other.inverse()).log()
    }
}

/// Tangent space (Lie algebra in vector form) of a [`LieGroup`].
pub trait Tangent<Group: LieGroup>: Clone + PartialEq {
    /// Dimension of the tangent space
    const DIM: usize;

    /// Exponential map to the group.
    fn exp(&self) -> Group;

    /// Euclidean norm of the tangent coordinates.
    fn norm(&self) -> f64;

    /// Zero tangent vector.
    fn zero() -> Self;
}
