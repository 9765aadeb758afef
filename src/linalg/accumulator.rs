//! Accumulation of the bundle adjustment normal equations.
//!
//! Ordering the unknowns as `[cameras | points]`, the Gauss-Newton system is
//!
//! ```text
//! [ U   W ] [δa]   [εA]
//! [ Wᵀ  V ] [δb] = [εB]
//! ```
//!
//! where, summed over active measurements with robust weight `w`,
//!
//! ```text
//! U_j  += w AᵀA     εA_j += w Aᵀε        (free camera j, 6x6 / 6)
//! V_i  += w BᵀB     εB_i += w Bᵀε        (point i, 3x3 / 3)
//! W_ij  = w AᵀB                          (measurement of i in j, 6x3)
//! ```
//!
//! `U` is block-diagonal over cameras, `V` block-diagonal over points, and `W` has one
//! block per measurement. Fixed cameras contribute only to `V` and `εB`.

use crate::camera::ProjectionModel;
use crate::core::problem::BundleProblem;
use crate::core::residual::{Linearization, linearize};
use crate::core::robust::RobustKernel;
use crate::core::sparsity::SparsityStructure;
use nalgebra::{Matrix3, Matrix6, SMatrix, Vector3, Vector6};

/// 6x3 camera-point coupling block.
pub type Matrix6x3 = SMatrix<f64, 6, 3>;

/// Summary of one accumulation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccumulationSummary {
    /// Robust noise scale used for the weights, already clamped
    pub sigma_squared: f64,
    /// Σ robust cost over the active measurements
    pub cost: f64,
    /// Σ squared error over the active measurements
    pub error_squared: f64,
    /// Measurements that passed the activity check and projected successfully
    pub active_count: usize,
}

/// Pass-scoped accumulators, sized once from the problem topology and cleared each pass.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    camera_hessians: Vec<Matrix6<f64>>,
    camera_gradients: Vec<Vector6<f64>>,
    point_hessians: Vec<Matrix3<f64>>,
    point_gradients: Vec<Vector3<f64>>,
    couplings: Vec<Matrix6x3>,
    active: Vec<bool>,
    errors_squared: Vec<f64>,
    summary: AccumulationSummary,
}

impl NormalEquations {
    pub fn new(structure: &SparsityStructure, num_points: usize, num_measurements: usize) -> Self {
        NormalEquations {
            camera_hessians: vec![Matrix6::zeros(); structure.num_rows()],
            camera_gradients: vec![Vector6::zeros(); structure.num_rows()],
            point_hessians: vec![Matrix3::zeros(); num_points],
            point_gradients: vec![Vector3::zeros(); num_points],
            couplings: vec![Matrix6x3::zeros(); num_measurements],
            active: vec![false; num_measurements],
            errors_squared: vec![0.0; num_measurements],
            summary: AccumulationSummary {
                sigma_squared: 0.0,
                cost: 0.0,
                error_squared: 0.0,
                active_count: 0,
            },
        }
    }

    pub fn clear(&mut self) {
        self.camera_hessians.fill(Matrix6::zeros());
        self.camera_gradients.fill(Vector6::zeros());
        self.point_hessians.fill(Matrix3::zeros());
        self.point_gradients.fill(Vector3::zeros());
        self.couplings.fill(Matrix6x3::zeros());
        self.active.fill(false);
        self.errors_squared.fill(0.0);
    }

    /// Linearize every active measurement, estimate σ² and accumulate the weighted system.
    ///
    /// A measurement is active when it is not flagged bad, its point is not an outlier,
    /// and it projects validly at the current state. σ² is the kernel's scale estimate
    /// over the active squared errors, clamped below by `min_sigma_squared`.
    pub fn accumulate(
        &mut self,
        problem: &BundleProblem,
        structure: &SparsityStructure,
        model: &dyn ProjectionModel,
        kernel: RobustKernel,
        min_sigma_squared: f64,
    ) -> AccumulationSummary {
        self.clear();

        let cameras = problem.cameras();
        let points = problem.points();
        let measurements = problem.measurements();

        let mut linearizations: Vec<Option<Linearization>> = vec![None; measurements.len()];
        let mut active_errors = Vec::with_capacity(measurements.len());
        for &m in structure.measurement_order() {
            if !problem.is_active(m) {
                continue;
            }
            let measurement = &measurements[m];
            let lin = linearize(
                model,
                cameras[measurement.camera()].pose(),
                points[measurement.point()].position(),
                measurement,
            );
            if let Some(lin) = lin {
                self.active[m] = true;
                self.errors_squared[m] = lin.error_squared;
                active_errors.push(lin.error_squared);
                linearizations[m] = Some(lin);
            }
        }

        let error_squared: f64 = active_errors.iter().sum();
        let active_count = active_errors.len();
        let sigma_squared = kernel
            .scale_estimate(&mut active_errors)
            .max(min_sigma_squared);

        let mut cost = 0.0;
        for &m in structure.measurement_order() {
            let Some(lin) = linearizations[m].as_ref() else {
                continue;
            };
            let measurement = &measurements[m];
            let weight = kernel.weight(lin.error_squared, sigma_squared);
            cost += kernel.cost(lin.error_squared, sigma_squared);

            let point = measurement.point();
            let jb_t = lin.jac_point.transpose();
            self.point_hessians[point] += jb_t * lin.jac_point * weight;
            self.point_gradients[point] += jb_t * lin.residual * weight;

            if let Some(row) = structure.camera_row(measurement.camera()) {
                let ja_t = lin.jac_camera.transpose();
                self.camera_hessians[row] += ja_t * lin.jac_camera * weight;
                self.camera_gradients[row] += ja_t * lin.residual * weight;
                self.couplings[m] = ja_t * lin.jac_point * weight;
            }
        }

        self.summary = AccumulationSummary {
            sigma_squared,
            cost,
            error_squared,
            active_count,
        };
        self.summary
    }

    pub fn summary(&self) -> &AccumulationSummary {
        &self.summary
    }

    /// `U_j` of the free camera in reduced row `row`.
    pub fn camera_hessian(&self, row: usize) -> &Matrix6<f64> {
        &self.camera_hessians[row]
    }

    /// `εA_j` of the free camera in reduced row `row`.
    pub fn camera_gradient(&self, row: usize) -> &Vector6<f64> {
        &self.camera_gradients[row]
    }

    pub fn point_hessian(&self, point: usize) -> &Matrix3<f64> {
        &self.point_hessians[point]
    }

    pub fn point_gradient(&self, point: usize) -> &Vector3<f64> {
        &self.point_gradients[point]
    }

    /// `W_ij` of a measurement; zero for inactive measurements and fixed cameras.
    pub fn coupling(&self, measurement: usize) -> &Matrix6x3 {
        &self.couplings[measurement]
    }

    pub fn is_active(&self, measurement: usize) -> bool {
        self.active[measurement]
    }

    /// Squared error at linearization time (zero if inactive).
    pub fn error_squared(&self, measurement: usize) -> f64 {
        self.errors_squared[measurement]
    }

    pub fn num_measurements(&self) -> usize {
        self.active.len()
    }
}
