//! Field-of-View (FOV) arctangent lens model.
//!
//! Parameters: `[fx, fy, cx, cy, w]`
//!
//! A normalized image-plane point `p` at radius `r = ||p||` is scaled radially by
//!
//! ```text
//! rd(r) = atan(2 tan(w/2) r) / (w r)
//! pixel = [fx, fy] ⊙ (rd(r) p) + [cx, cy]
//! ```
//!
//! With `w = 0` the model reduces to a pinhole.

use super::ProjectionModel;
use nalgebra::{Matrix2, Vector2};

/// Below this squared radius the series expansion of `rd` is used.
const EPS_SQRT: f64 = 1e-7;

/// Below this field of view the model is treated as distortion-free.
const MIN_FIELD_OF_VIEW: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FovModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Field-of-view distortion parameter in radians
    pub w: f64,
}

impl FovModel {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, w: f64) -> Self {
        Self { fx, fy, cx, cy, w }
    }

    /// Radial factor `rd(r)` and `rd'(r) / r`, both smooth through `r = 0`.
    fn radial_factor(&self, radius_squared: f64) -> (f64, f64) {
        if self.w.abs() < MIN_FIELD_OF_VIEW {
            return (1.0, 0.0);
        }
        let two_tan_w_half = 2.0 * (self.w / 2.0).tan();

        if radius_squared < EPS_SQRT {
            // atan(a r)/(w r) = a/w · (1 - a²r²/3 + ...)
            let a2 = two_tan_w_half * two_tan_w_half;
            let rd = two_tan_w_half / self.w * (1.0 - a2 * radius_squared / 3.0);
            let d_rd_over_r = -2.0 * a2 * two_tan_w_half / (3.0 * self.w);
            return (rd, d_rd_over_r);
        }

        let r = radius_squared.sqrt();
        let atan_wrd = (two_tan_w_half * r).atan();
        let rd = atan_wrd / (self.w * r);
        let d_atan_d_r = two_tan_w_half / (1.0 + two_tan_w_half * two_tan_w_half * radius_squared);
        let d_rd_d_r = (d_atan_d_r * r - atan_wrd) / (self.w * radius_squared);
        (rd, d_rd_d_r / r)
    }
}

impl ProjectionModel for FovModel {
    fn project(&self, image_plane: &Vector2<f64>) -> Vector2<f64> {
        let (rd, _) = self.radial_factor(image_plane.norm_squared());
        Vector2::new(
            self.fx * rd * image_plane.x + self.cx,
            self.fy * rd * image_plane.y + self.cy,
        )
    }

    fn derivatives(&self, image_plane: &Vector2<f64>) -> Matrix2<f64> {
        let (rd, d_rd_over_r) = self.radial_factor(image_plane.norm_squared());
        // d(rd p)/dp = rd I + (rd'(r)/r) p pᵀ
        let distortion = Matrix2::identity() * rd + image_plane * image_plane.transpose() * d_rd_over_r;
        Matrix2::new(self.fx, 0.0, 0.0, self.fy) * distortion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PinholeModel;
    use crate::camera::test_utils::numerical_derivatives;

    fn model() -> FovModel {
        FovModel::new(400.0, 400.0, 376.0, 240.0, 0.9)
    }

    #[test]
    fn test_principal_point_is_fixed() {
        let pixel = model().project(&Vector2::zeros());
        assert!((pixel - Vector2::new(376.0, 240.0)).norm() < 1e-12);
    }

    #[test]
    fn test_distortion_compresses_radius() {
        let at = Vector2::new(0.6, -0.4);
        let fov = model().project(&at);
        let pinhole = PinholeModel::new(400.0, 400.0, 376.0, 240.0).project(&at);
        let center = Vector2::new(376.0, 240.0);
        assert!((fov - center).norm() < (pinhole - center).norm());
    }

    #[test]
    fn test_zero_field_of_view_is_pinhole() {
        let fov = FovModel::new(400.0, 410.0, 376.0, 240.0, 0.0);
        let pinhole = PinholeModel::new(400.0, 410.0, 376.0, 240.0);
        let at = Vector2::new(0.2, 0.3);
        assert!((fov.project(&at) - pinhole.project(&at)).norm() < 1e-12);
        assert!((fov.derivatives(&at) - pinhole.derivatives(&at)).norm() < 1e-12);
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let model = model();
        for at in [
            Vector2::new(0.3, 0.1),
            Vector2::new(-0.5, 0.45),
            Vector2::new(1e-5, -2e-5),
        ] {
            let numeric = numerical_derivatives(&model, &at);
            let analytic = model.derivatives(&at);
            assert!(
                (numeric - analytic).norm() < 1e-4,
                "at {at:?}: numeric {numeric} analytic {analytic}"
            );
        }
    }

    #[test]
    fn test_series_branch_is_continuous() {
        let model = model();
        let r = EPS_SQRT.sqrt();
        let inside = model.project(&Vector2::new(r * 0.999, 0.0));
        let outside = model.project(&Vector2::new(r * 1.001, 0.0));
        assert!((inside - outside).norm() < 1e-3);
    }
}
