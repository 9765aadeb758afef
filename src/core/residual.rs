//! Reprojection residual and Jacobians of a single measurement.
//!
//! For a camera-from-world pose `T = (R, t)`, a world point `X` and an observation `o`
//! with noise weight `s = 1/σ`:
//!
//! ```text
//! Xc = R X + t                         camera-frame point
//! ε  = s · (o - π(Xc.x/z, Xc.y/z))     weighted residual, e = ||ε||²
//! ```
//!
//! The Jacobians are those of the *model* `s·π(·)`; the solver uses the Gauss-Newton
//! form `(JᵀJ) δ = Jᵀε` and applies `+δ`. With `D = ∂π/∂p` and
//!
//! ```text
//! Π = [ 1/z  0   -x/z² ]
//!     [ 0   1/z  -y/z² ]
//! ```
//!
//! the camera block (left perturbation `exp(δ)∘T`, `δ = [ρ, θ]`) and the point block are
//!
//! ```text
//! A = s · D · Π · [ I | -[Xc]× ]       2x6
//! B = s · D · Π · R                    2x3
//! ```
//!
//! A projection is valid only when the point lies strictly in front of the camera and
//! every intermediate value is finite. Invalid projections yield `None`.

use crate::camera::ProjectionModel;
use crate::core::problem::Measurement;
use crate::manifold::{LieGroup, SE3, so3::skew};
use nalgebra::{Matrix2x3, SMatrix, Vector2, Vector3};

/// 2x6 Jacobian of a residual with respect to the camera twist.
pub type Matrix2x6 = SMatrix<f64, 2, 6>;

/// Residual and Jacobians of one measurement at the current state.
#[derive(Debug, Clone)]
pub struct Linearization {
    pub residual: Vector2<f64>,
    pub error_squared: f64,
    pub jac_camera: Matrix2x6,
    pub jac_point: Matrix2x3<f64>,
}

/// Camera-frame point, or `None` when it is behind the camera or not finite.
fn camera_frame_point(pose: &SE3, point: &Vector3<f64>) -> Option<Vector3<f64>> {
    let in_camera = pose.act(point);
    if in_camera.z > 0.0 && in_camera.iter().all(|v| v.is_finite()) {
        Some(in_camera)
    } else {
        None
    }
}

fn weighted_residual(
    model: &dyn ProjectionModel,
    in_camera: &Vector3<f64>,
    measurement: &Measurement,
) -> Option<(Vector2<f64>, Vector2<f64>)> {
    let image_plane = Vector2::new(in_camera.x / in_camera.z, in_camera.y / in_camera.z);
    let predicted = model.project(&image_plane);
    let residual = (measurement.observed() - predicted) * measurement.sqrt_inv_noise();
    if residual.iter().all(|v| v.is_finite()) {
        Some((image_plane, residual))
    } else {
        None
    }
}

/// Weighted residual and squared error only.
pub fn squared_error(
    model: &dyn ProjectionModel,
    pose: &SE3,
    point: &Vector3<f64>,
    measurement: &Measurement,
) -> Option<(Vector2<f64>, f64)> {
    let in_camera = camera_frame_point(pose, point)?;
    let (_, residual) = weighted_residual(model, &in_camera, measurement)?;
    Some((residual, residual.norm_squared()))
}

/// Residual, squared error and both Jacobian blocks.
pub fn linearize(
    model: &dyn ProjectionModel,
    pose: &SE3,
    point: &Vector3<f64>,
    measurement: &Measurement,
) -> Option<Linearization> {
    let in_camera = camera_frame_point(pose, point)?;
    let (image_plane, residual) = weighted_residual(model, &in_camera, measurement)?;

    let inv_z = 1.0 / in_camera.z;
    let perspective = Matrix2x3::new(
        inv_z,
        0.0,
        -image_plane.x * inv_z,
        0.0,
        inv_z,
        -image_plane.y * inv_z,
    );
    let lens = model.derivatives(&image_plane) * measurement.sqrt_inv_noise();
    let d_pixel_d_camera_point = lens * perspective;

    let mut motion = SMatrix::<f64, 3, 6>::zeros();
    motion
        .fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&nalgebra::Matrix3::identity());
    motion.fixed_view_mut::<3, 3>(0, 3).copy_from(&(-skew(&in_camera)));

    let jac_camera = d_pixel_d_camera_point * motion;
    let jac_point = d_pixel_d_camera_point * pose.rotation_matrix();

    if !(jac_camera.iter().all(|v| v.is_finite()) && jac_point.iter().all(|v| v.is_finite())) {
        return None;
    }

    Some(Linearization {
        residual,
        error_squared: residual.norm_squared(),
        jac_camera,
        jac_point,
    })
}
