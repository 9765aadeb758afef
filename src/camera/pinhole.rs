use super::ProjectionModel;
use nalgebra::{Matrix2, Vector2};

/// Ideal perspective camera without distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl PinholeModel {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }
}

impl ProjectionModel for PinholeModel {
    fn project(&self, image_plane: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            self.fx * image_plane.x + self.cx,
            self.fy * image_plane.y + self.cy,
        )
    }

    fn derivatives(&self, _image_plane: &Vector2<f64>) -> Matrix2<f64> {
        Matrix2::new(self.fx, 0.0, 0.0, self.fy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::test_utils::numerical_derivatives;

    #[test]
    fn test_pinhole_projection() {
        let model = PinholeModel::new(500.0, 480.0, 320.0, 240.0);
        let pixel = model.project(&Vector2::new(0.1, -0.2));
        assert!((pixel - Vector2::new(370.0, 144.0)).norm() < 1e-12);
    }

    #[test]
    fn test_pinhole_derivatives() {
        let model = PinholeModel::new(500.0, 480.0, 320.0, 240.0);
        let at = Vector2::new(0.3, 0.1);
        let numeric = numerical_derivatives(&model, &at);
        assert!((numeric - model.derivatives(&at)).norm() < 1e-5);
    }
}
