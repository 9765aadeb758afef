//! Post-solve outlier classification.
//!
//! Runs once after the solver terminates, whatever the reason. σ² is re-estimated
//! from the final squared errors of the active set, then
//!
//! - an active measurement is flagged bad when `e > multiple · σ²` or when it no longer
//!   projects validly
//! - a point with at least one measurement is an outlier when
//!   `bad / total ≥ point_outlier_ratio`
//!
//! Flags are sticky: bad measurements and outlier points stay excluded from every
//! later solve.

use crate::camera::ProjectionModel;
use crate::core::problem::BundleProblem;
use crate::core::residual::squared_error;
use crate::core::robust::RobustKernel;
use tracing::{debug, warn};

/// Thresholds of the classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierPolicy {
    pub kernel: RobustKernel,
    pub min_sigma_squared: f64,
    /// A measurement is bad when its squared error exceeds this multiple of σ²
    pub sigma_multiple: f64,
    /// A point is an outlier when this fraction of its measurements is bad
    pub point_ratio: f64,
}

/// What one classification pass found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutlierReport {
    pub sigma_squared: f64,
    /// Measurements flagged in this pass
    pub new_bad_measurements: usize,
    /// Points newly classified as outliers in this pass
    pub new_outlier_points: usize,
}

pub fn classify_outliers(
    problem: &mut BundleProblem,
    model: &dyn ProjectionModel,
    policy: &OutlierPolicy,
) -> OutlierReport {
    let mut errors: Vec<Option<f64>> = vec![None; problem.num_measurements()];
    let mut active_errors = Vec::new();
    for (index, measurement) in problem.measurements().iter().enumerate() {
        if !problem.is_active(index) {
            continue;
        }
        let pose = problem.cameras()[measurement.camera()].pose();
        let position = problem.points()[measurement.point()].position();
        let error = squared_error(model, pose, position, measurement).map(|(_, e)| e);
        if let Some(e) = error {
            active_errors.push(e);
        }
        errors[index] = Some(error.unwrap_or(f64::INFINITY));
    }

    let sigma_squared = policy
        .kernel
        .scale_estimate(&mut active_errors)
        .max(policy.min_sigma_squared);
    let threshold = policy.sigma_multiple * sigma_squared;

    let mut report = OutlierReport {
        sigma_squared,
        ..OutlierReport::default()
    };
    for (index, error) in errors.iter().enumerate() {
        if let Some(e) = error
            && *e > threshold
        {
            problem.measurements_mut()[index].mark_bad();
            report.new_bad_measurements += 1;
        }
    }

    let mut totals = vec![(0usize, 0usize); problem.num_points()];
    for measurement in problem.measurements() {
        let entry = &mut totals[measurement.point()];
        entry.0 += 1;
        if measurement.is_bad() {
            entry.1 += 1;
        }
    }
    for (point, &(total, bad)) in problem.points_mut().iter_mut().zip(totals.iter()) {
        let was_outlier = point.is_outlier();
        let outlier = total > 0 && bad as f64 / total as f64 >= policy.point_ratio;
        point.set_classification(total, bad, outlier);
        if outlier && !was_outlier {
            report.new_outlier_points += 1;
        }
    }

    if report.new_outlier_points > 0 {
        warn!(
            "Outlier classification: {} bad measurements, {} outlier points (σ² = {:.3e})",
            report.new_bad_measurements, report.new_outlier_points, sigma_squared
        );
    } else {
        debug!(
            "Outlier classification: {} bad measurements (σ² = {:.3e})",
            report.new_bad_measurements, sigma_squared
        );
    }
    report
}
