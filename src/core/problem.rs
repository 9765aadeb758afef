//! Problem graph of cameras, points and measurements.
//!
//! The graph is built once (cameras, then points, then measurements in any order)
//! and its topology is frozen by the first solve. Poses and positions keep changing
//! while solving, but no entity is added or removed afterwards.
//!
//! ```
//! use bundle_adjust::core::problem::BundleProblem;
//! use bundle_adjust::manifold::SE3;
//! use nalgebra::{Vector2, Vector3};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut problem = BundleProblem::new();
//! let cam = problem.add_camera(SE3::identity(), true)?;
//! let pt = problem.add_point(Vector3::new(0.0, 0.0, 5.0))?;
//! problem.add_measurement(cam, pt, Vector2::new(320.0, 240.0), 1.0)?;
//!
//! // The same pair cannot be measured twice
//! assert!(problem.add_measurement(cam, pt, Vector2::new(321.0, 240.0), 1.0).is_err());
//! // Nor can a missing point
//! assert!(problem.add_measurement(cam, 7, Vector2::new(0.0, 0.0), 1.0).is_err());
//! # Ok(())
//! # }
//! ```

use crate::core::{CoreError, CoreResult};
use crate::manifold::SE3;
use nalgebra::{Vector2, Vector3};
use std::collections::{BTreeSet, HashMap};

/// A camera pose (camera-from-world) and whether it takes part in the optimization.
#[derive(Debug, Clone)]
pub struct CameraNode {
    pose: SE3,
    fixed: bool,
}

impl CameraNode {
    pub fn pose(&self) -> &SE3 {
        &self.pose
    }

    /// Fixed cameras only act as measurement sources.
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub(crate) fn set_pose(&mut self, pose: SE3) {
        self.pose = pose;
    }
}

/// A 3D map point and its classification state.
#[derive(Debug, Clone)]
pub struct PointNode {
    position: Vector3<f64>,
    outlier: bool,
    measurement_count: usize,
    bad_measurement_count: usize,
}

impl PointNode {
    pub fn position(&self) -> &Vector3<f64> {
        &self.position
    }

    /// Set by the outlier classifier once every measurement of the point is unreliable.
    pub fn is_outlier(&self) -> bool {
        self.outlier
    }

    /// Number of measurements seen by the last classification pass.
    pub fn measurement_count(&self) -> usize {
        self.measurement_count
    }

    /// Number of measurements flagged bad by the last classification pass.
    pub fn bad_measurement_count(&self) -> usize {
        self.bad_measurement_count
    }

    pub(crate) fn set_position(&mut self, position: Vector3<f64>) {
        self.position = position;
    }

    pub(crate) fn set_classification(&mut self, measurements: usize, bad: usize, outlier: bool) {
        self.measurement_count = measurements;
        self.bad_measurement_count = bad;
        self.outlier = self.outlier || outlier;
    }
}

/// One 2D observation of a point in a camera.
#[derive(Debug, Clone)]
pub struct Measurement {
    camera: usize,
    point: usize,
    observed: Vector2<f64>,
    sqrt_inv_noise: f64,
    bad: bool,
}

impl Measurement {
    pub fn camera(&self) -> usize {
        self.camera
    }

    pub fn point(&self) -> usize {
        self.point
    }

    /// Observed image location in pixels.
    pub fn observed(&self) -> &Vector2<f64> {
        &self.observed
    }

    /// Noise weight `1/σ` applied to the residual.
    pub fn sqrt_inv_noise(&self) -> f64 {
        self.sqrt_inv_noise
    }

    pub fn is_bad(&self) -> bool {
        self.bad
    }

    pub(crate) fn mark_bad(&mut self) {
        self.bad = true;
    }
}

/// Owner of all cameras, points and measurements of one bundle adjustment.
#[derive(Debug, Clone, Default)]
pub struct BundleProblem {
    cameras: Vec<CameraNode>,
    points: Vec<PointNode>,
    measurements: Vec<Measurement>,
    measurement_lookup: HashMap<(usize, usize), usize>,
    frozen: bool,
}

impl BundleProblem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a camera with its camera-from-world pose. Returns its stable index.
    pub fn add_camera(&mut self, pose: SE3, fixed: bool) -> CoreResult<usize> {
        self.ensure_open("add_camera")?;
        if !pose.translation().iter().all(|v| v.is_finite()) {
            return Err(CoreError::InvalidInput(format!(
                "camera pose has a non-finite translation: {pose}"
            ))
            .log());
        }
        self.cameras.push(CameraNode { pose, fixed });
        Ok(self.cameras.len() - 1)
    }

    /// Add a point in world coordinates. Returns its stable index.
    pub fn add_point(&mut self, position: Vector3<f64>) -> CoreResult<usize> {
        self.ensure_open("add_point")?;
        if !position.iter().all(|v| v.is_finite()) {
            return Err(CoreError::InvalidInput(format!(
                "point position is not finite: {position:?}"
            ))
            .log());
        }
        self.points.push(PointNode {
            position,
            outlier: false,
            measurement_count: 0,
            bad_measurement_count: 0,
        });
        Ok(self.points.len() - 1)
    }

    /// Add an observation of `point` in `camera` with the given noise variance (pixels²).
    ///
    /// # Errors
    /// - `InvalidCameraIndex` / `InvalidPointIndex` if either index is out of range
    /// - `DuplicateMeasurement` if the pair was already measured
    /// - `InvalidInput` if the variance is not positive or the location is not finite
    ///
    /// The problem is left untouched on error.
    pub fn add_measurement(
        &mut self,
        camera: usize,
        point: usize,
        observed: Vector2<f64>,
        noise_variance: f64,
    ) -> CoreResult<usize> {
        self.ensure_open("add_measurement")?;
        if camera >= self.cameras.len() {
            return Err(CoreError::InvalidCameraIndex {
                index: camera,
                count: self.cameras.len(),
            }
            .log());
        }
        if point >= self.points.len() {
            return Err(CoreError::InvalidPointIndex {
                index: point,
                count: self.points.len(),
            }
            .log());
        }
        if !(noise_variance.is_finite() && noise_variance > 0.0) {
            return Err(CoreError::InvalidInput(format!(
                "noise variance must be positive and finite, got {noise_variance}"
            ))
            .log());
        }
        if !observed.iter().all(|v| v.is_finite()) {
            return Err(CoreError::InvalidInput(format!(
                "observed location is not finite: {observed:?}"
            ))
            .log());
        }
        if self.measurement_lookup.contains_key(&(camera, point)) {
            return Err(CoreError::DuplicateMeasurement { camera, point }.log());
        }

        let index = self.measurements.len();
        self.measurements.push(Measurement {
            camera,
            point,
            observed,
            sqrt_inv_noise: (1.0 / noise_variance).sqrt(),
            bad: false,
        });
        self.measurement_lookup.insert((camera, point), index);
        Ok(index)
    }

    pub fn num_cameras(&self) -> usize {
        self.cameras.len()
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_measurements(&self) -> usize {
        self.measurements.len()
    }

    pub fn num_free_cameras(&self) -> usize {
        self.cameras.iter().filter(|c| !c.fixed).count()
    }

    pub fn camera(&self, index: usize) -> CoreResult<&CameraNode> {
        self.cameras.get(index).ok_or(CoreError::InvalidCameraIndex {
            index,
            count: self.cameras.len(),
        })
    }

    pub fn point(&self, index: usize) -> CoreResult<&PointNode> {
        self.points.get(index).ok_or(CoreError::InvalidPointIndex {
            index,
            count: self.points.len(),
        })
    }

    pub fn cameras(&self) -> &[CameraNode] {
        &self.cameras
    }

    pub fn points(&self) -> &[PointNode] {
        &self.points
    }

    /// Measurements in insertion order.
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Index of the measurement of `point` in `camera`, if any.
    pub fn find_measurement(&self, camera: usize, point: usize) -> Option<usize> {
        self.measurement_lookup.get(&(camera, point)).copied()
    }

    /// Whether the measurement takes part in accumulation.
    pub fn is_active(&self, measurement: usize) -> bool {
        self.measurements
            .get(measurement)
            .is_some_and(|m| !m.bad && !self.points[m.point].outlier)
    }

    /// (camera, point) pairs of all measurements flagged bad, sorted.
    pub fn outlier_measurements(&self) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(usize, usize)> = self
            .measurements
            .iter()
            .filter(|m| m.bad)
            .map(|m| (m.camera, m.point))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Indices of all points classified as outliers.
    pub fn outlier_points(&self) -> BTreeSet<usize> {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.outlier)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    pub(crate) fn cameras_mut(&mut self) -> &mut [CameraNode] {
        &mut self.cameras
    }

    pub(crate) fn points_mut(&mut self) -> &mut [PointNode] {
        &mut self.points
    }

    pub(crate) fn measurements_mut(&mut self) -> &mut [Measurement] {
        &mut self.measurements
    }

    fn ensure_open(&self, operation: &str) -> CoreResult<()> {
        if self.frozen {
            return Err(CoreError::TopologyFrozen(operation.to_string()).log());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn small_problem() -> CoreResult<BundleProblem> {
        let mut problem = BundleProblem::new();
        problem.add_camera(SE3::identity(), true)?;
        problem.add_camera(SE3::identity(), false)?;
        problem.add_point(Vector3::new(0.0, 0.0, 4.0))?;
        problem.add_point(Vector3::new(1.0, 0.0, 4.0))?;
        Ok(problem)
    }

    #[test]
    fn test_indices_are_stable() -> TestResult {
        let mut problem = small_problem()?;
        assert_eq!(problem.add_camera(SE3::identity(), false)?, 2);
        assert_eq!(problem.add_point(Vector3::new(0.0, 1.0, 3.0))?, 2);
        assert_eq!(problem.num_free_cameras(), 2);
        Ok(())
    }

    #[test]
    fn test_invalid_camera_reference() -> TestResult {
        let mut problem = small_problem()?;
        let result = problem.add_measurement(5, 0, Vector2::new(1.0, 2.0), 1.0);
        assert!(matches!(
            result,
            Err(CoreError::InvalidCameraIndex { index: 5, count: 2 })
        ));
        assert_eq!(problem.num_measurements(), 0);
        Ok(())
    }

    #[test]
    fn test_invalid_point_reference() -> TestResult {
        let mut problem = small_problem()?;
        let result = problem.add_measurement(0, 2, Vector2::new(1.0, 2.0), 1.0);
        assert!(matches!(
            result,
            Err(CoreError::InvalidPointIndex { index: 2, count: 2 })
        ));
        assert_eq!(problem.num_measurements(), 0);
        Ok(())
    }

    #[test]
    fn test_duplicate_measurement_rejected() -> TestResult {
        let mut problem = small_problem()?;
        problem.add_measurement(1, 0, Vector2::new(1.0, 2.0), 1.0)?;
        let result = problem.add_measurement(1, 0, Vector2::new(3.0, 4.0), 1.0);
        assert!(matches!(
            result,
            Err(CoreError::DuplicateMeasurement {
                camera: 1,
                point: 0
            })
        ));
        assert_eq!(problem.find_measurement(1, 0), Some(0));
        Ok(())
    }

    #[test]
    fn test_noise_weight_from_variance() -> TestResult {
        let mut problem = small_problem()?;
        let index = problem.add_measurement(0, 1, Vector2::new(1.0, 2.0), 4.0)?;
        assert!((problem.measurements()[index].sqrt_inv_noise() - 0.5).abs() < 1e-15);
        assert!(problem.add_measurement(0, 0, Vector2::new(1.0, 2.0), 0.0).is_err());
        Ok(())
    }

    #[test]
    fn test_frozen_topology() -> TestResult {
        let mut problem = small_problem()?;
        problem.freeze();
        assert!(matches!(
            problem.add_point(Vector3::zeros()),
            Err(CoreError::TopologyFrozen(_))
        ));
        assert!(problem.add_camera(SE3::identity(), false).is_err());
        Ok(())
    }
}
