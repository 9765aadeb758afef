//! Camera projection models.
//!
//! The solver only talks to a camera through [`ProjectionModel`]: a map from the
//! normalized image plane `(x/z, y/z)` to pixel coordinates, and its 2x2 Jacobian.
//! Perspective division and the rigid transform are handled by the residual evaluator.
//!
//! Two models are provided:
//! - [`PinholeModel`]: ideal perspective camera `[fx, fy, cx, cy]`
//! - [`FovModel`]: single-parameter arctangent (field-of-view) distortion
//!   `[fx, fy, cx, cy, w]`, suitable for wide-angle and fisheye lenses

pub mod fov;
pub mod pinhole;

pub use fov::FovModel;
pub use pinhole::PinholeModel;

use nalgebra::{Matrix2, Vector2};

/// Lens model mapping the normalized image plane to pixels.
///
/// Implementations must be deterministic and differentiable.
pub trait ProjectionModel: Send + Sync {
    /// Project a normalized image-plane point `(x/z, y/z)` to pixels.
    fn project(&self, image_plane: &Vector2<f64>) -> Vector2<f64>;

    /// Jacobian of [`ProjectionModel::project`] at `image_plane`.
    fn derivatives(&self, image_plane: &Vector2<f64>) -> Matrix2<f64>;
}

impl<T: ProjectionModel + ?Sized> ProjectionModel for Box<T> {
    fn project(&self, image_plane: &Vector2<f64>) -> Vector2<f64> {
        (**self).project(image_plane)
    }

    fn derivatives(&self, image_plane: &Vector2<f64>) -> Matrix2<f64> {
        (**self).derivatives(image_plane)
    }
}
