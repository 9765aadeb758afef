//! The bundle adjuster façade.
//!
//! [`Bundle`] owns the problem graph, the configuration and the projection model.
//! Cameras, points and measurements are added first; [`Bundle::compute`] then
//! freezes the topology and refines every free camera and every inlier point.
//!
//! ```
//! use bundle_adjust::{Bundle, BundleConfig, CancellationToken, PinholeModel, SE3};
//! use nalgebra::{UnitQuaternion, Vector2, Vector3};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = PinholeModel::new(500.0, 500.0, 320.0, 240.0);
//! let mut bundle = Bundle::with_config(model, BundleConfig::new().with_max_iterations(20));
//!
//! let left = bundle.add_camera(SE3::identity(), true)?;
//! let right = bundle.add_camera(
//!     SE3::new(Vector3::new(-0.5, 0.0, 0.0), UnitQuaternion::identity()),
//!     true,
//! )?;
//! let moving = bundle.add_camera(
//!     SE3::new(Vector3::new(-0.24, 0.01, 0.0), UnitQuaternion::identity()),
//!     false,
//! )?;
//!
//! for (x, y) in [(-0.4, -0.3), (0.3, -0.2), (0.0, 0.0), (-0.2, 0.35), (0.4, 0.3)] {
//!     let point = Vector3::new(x, y, 4.0);
//!     let index = bundle.add_point(point)?;
//!     for (camera, offset) in [(left, 0.0), (right, -0.5), (moving, -0.25)] {
//!         let observed = Vector2::new(
//!             500.0 * (point.x + offset) / point.z + 320.0,
//!             500.0 * point.y / point.z + 240.0,
//!         );
//!         bundle.add_measurement(camera, index, observed, 1.0)?;
//!     }
//! }
//!
//! let accepted = bundle.compute(&CancellationToken::new())?;
//! assert!(accepted > 0);
//! assert!(bundle.converged());
//! let pose = bundle.get_camera(moving)?;
//! assert!((pose.translation() - Vector3::new(-0.25, 0.0, 0.0)).norm() < 1e-6);
//! # Ok(())
//! # }
//! ```

use crate::camera::ProjectionModel;
use crate::core::CoreError;
use crate::core::problem::BundleProblem;
use crate::error::BundleResult;
use crate::manifold::SE3;
use crate::optimizer::{
    BundleConfig, BundleSummary, CancellationToken, LevenbergMarquardt, OptimizationStatus,
    OutlierReport, classify_outliers,
};
use nalgebra::{Vector2, Vector3};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Batch bundle adjuster over keyframe poses and map points.
pub struct Bundle {
    problem: BundleProblem,
    model: Box<dyn ProjectionModel>,
    config: BundleConfig,
    summary: Option<BundleSummary>,
    outlier_report: Option<OutlierReport>,
    converged: bool,
    hit_max_iterations: bool,
}

impl Bundle {
    pub fn new(model: impl ProjectionModel + 'static) -> Self {
        Self::with_config(model, BundleConfig::default())
    }

    pub fn with_config(model: impl ProjectionModel + 'static, config: BundleConfig) -> Self {
        Bundle {
            problem: BundleProblem::new(),
            model: Box::new(model),
            config,
            summary: None,
            outlier_report: None,
            converged: false,
            hit_max_iterations: false,
        }
    }

    /// Add a camera with its camera-from-world pose. Fixed cameras are never moved.
    pub fn add_camera(&mut self, pose: SE3, fixed: bool) -> BundleResult<usize> {
        Ok(self.problem.add_camera(pose, fixed)?)
    }

    /// Add a point in world coordinates.
    pub fn add_point(&mut self, position: Vector3<f64>) -> BundleResult<usize> {
        Ok(self.problem.add_point(position)?)
    }

    /// Add a pixel observation of `point` in `camera` with noise variance in pixels².
    pub fn add_measurement(
        &mut self,
        camera: usize,
        point: usize,
        observed: Vector2<f64>,
        noise_variance: f64,
    ) -> BundleResult<usize> {
        Ok(self
            .problem
            .add_measurement(camera, point, observed, noise_variance)?)
    }

    /// Run the adjustment. Returns the number of accepted steps.
    ///
    /// The first call freezes the topology. Outlier classification runs after every
    /// solve that got past the gauge check, including failed ones, so its flags are in
    /// place for the next call.
    ///
    /// # Errors
    /// - `CoreError::InvalidConstraint` when there are free cameras but no fixed one
    /// - `OptimizerError` when the solve fails; poses and points keep the last
    ///   accepted state
    pub fn compute(&mut self, token: &CancellationToken) -> BundleResult<usize> {
        self.problem.freeze();
        self.converged = false;
        self.hit_max_iterations = false;
        self.summary = None;

        let free = self.problem.num_free_cameras();
        if free == 0 {
            debug!("No free cameras, nothing to adjust");
            self.summary = Some(BundleSummary::trivial(
                OptimizationStatus::Converged,
                self.config.damping,
            ));
            self.converged = true;
            return Ok(0);
        }
        if free == self.problem.num_cameras() {
            return Err(CoreError::InvalidConstraint(format!(
                "all {free} cameras are free; at least one fixed camera is needed to pin the gauge"
            ))
            .log()
            .into());
        }

        let mut solver = LevenbergMarquardt::with_config(self.config.clone());
        let result = solver.optimize(&mut self.problem, self.model.as_ref(), token);

        let report = classify_outliers(
            &mut self.problem,
            self.model.as_ref(),
            &self.config.outlier_policy(),
        );
        self.outlier_report = Some(report);

        let summary = result?;
        self.converged = summary.converged();
        self.hit_max_iterations = summary.status == OptimizationStatus::MaxIterationsReached;
        let accepted = summary.accepted_steps;
        if summary.status == OptimizationStatus::UserTerminated {
            info!("Bundle adjustment cancelled after {} accepted steps", accepted);
        }
        self.summary = Some(summary);
        Ok(accepted)
    }

    /// Whether the last `compute` ended on the step tolerance (or had nothing to do).
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Whether the last `compute` ran out of outer iterations.
    pub fn hit_max_iterations(&self) -> bool {
        self.hit_max_iterations
    }

    pub fn get_point(&self, index: usize) -> BundleResult<Vector3<f64>> {
        Ok(*self.problem.point(index)?.position())
    }

    pub fn get_camera(&self, index: usize) -> BundleResult<SE3> {
        Ok(self.problem.camera(index)?.pose().clone())
    }

    /// `(camera, point)` pairs of every measurement flagged bad, sorted.
    pub fn get_outlier_measurements(&self) -> Vec<(usize, usize)> {
        self.problem.outlier_measurements()
    }

    /// Indices of every point classified as an outlier.
    pub fn get_outliers(&self) -> BTreeSet<usize> {
        self.problem.outlier_points()
    }

    /// Statistics of the last `compute`, `None` if it failed.
    pub fn summary(&self) -> Option<&BundleSummary> {
        self.summary.as_ref()
    }

    /// Result of the last outlier classification pass.
    pub fn outlier_report(&self) -> Option<&OutlierReport> {
        self.outlier_report.as_ref()
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    /// Configuration used by the next `compute`.
    pub fn config_mut(&mut self) -> &mut BundleConfig {
        &mut self.config
    }

    pub fn problem(&self) -> &BundleProblem {
        &self.problem
    }
}
