//! Levenberg-Marquardt bundle adjustment with Schur elimination.
//!
//! Each outer iteration linearizes the problem once and then tries damped steps
//! until one reduces the robust error:
//!
//! ```text
//! loop (outer iteration):
//!     σ²      = clamp(kernel.scale_estimate(e), min_sigma_squared)
//!     U, V, W, εA, εB accumulated with robust weights w(e, σ²)
//!     repeat (up to max_step_retries):
//!         solve the damped reduced camera system, back-substitute points
//!         T'_j = exp(δa_j)·T_j,   X'_i = X_i + δb_i
//!         if Σρ(e') < Σρ(e):   accept, λ ← max(0.3λ, λ_min), ν ← 2
//!         else:                reject, λ ← νλ, ν ← 2ν
//! ```
//!
//! ## Acceptance
//!
//! A trial is accepted only if its total robust cost, evaluated over the same active
//! measurement set and with the same σ² as the current state, is strictly lower.
//! Measurements whose trial projection fails are charged `ρ(∞)`.
//!
//! ## Convergence
//!
//! A solved step with `‖δ‖ ≤ tol · (‖x‖ + tol)` ends the solve as converged, where
//! `‖x‖` covers the free-camera twists `log(T_j)` and all point positions. An
//! improving tiny step is committed first, a non-improving one is discarded.
//!
//! ## Failures
//!
//! - Every retry of an outer iteration failing with a singular reduced system is
//!   reported as [`OptimizerError::LinearSolveFailed`].
//! - Retries exhausted by valid but non-improving steps only log a warning; the next
//!   outer iteration relinearizes and re-estimates σ².
//! - λ growing past `damping_max` is reported as [`OptimizerError::DampingFailure`].
//!
//! In every failure case the problem keeps its last accepted state.
//!
//! # Example
//!
//! ```
//! use bundle_adjust::optimizer::BundleConfig;
//! use bundle_adjust::core::robust::RobustKernel;
//!
//! let config = BundleConfig::new()
//!     .with_max_iterations(100)
//!     .with_parameter_tolerance(1e-10)
//!     .with_robust_kernel(RobustKernel::Cauchy)
//!     .with_verbosity(1);
//! assert_eq!(config.max_iterations, 100);
//! ```

use crate::camera::ProjectionModel;
use crate::core::problem::BundleProblem;
use crate::core::residual::squared_error;
use crate::core::robust::RobustKernel;
use crate::core::sparsity::SparsityStructure;
use crate::linalg::schur::{DampingBounds, camera_block};
use crate::linalg::{LinAlgError, NormalEquations, ReducedCameraSystem, SparseCholeskySolver};
use crate::manifold::{LieGroup, SE3, SE3Tangent, Tangent};
use crate::optimizer::outliers::OutlierPolicy;
use crate::optimizer::{
    CancellationToken, DampingController, OptimizationStatus, OptimizerError, OptimizerResult,
};

use faer::Mat;
use nalgebra::Vector3;
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use tracing::{debug, info, warn};
use web_time::{Duration, Instant};

/// Summary statistics of one bundle adjustment solve.
#[derive(Debug, Clone)]
pub struct BundleSummary {
    /// Robust cost at the first linearization
    pub initial_cost: f64,
    /// Robust cost of the last accepted state, under its own σ²
    pub final_cost: f64,
    /// Outer iterations performed
    pub iterations: usize,
    /// Accepted trial steps
    pub accepted_steps: usize,
    /// Rejected trial steps (including failed solves)
    pub rejected_steps: usize,
    /// Damping λ when the solve ended
    pub final_damping: f64,
    /// σ² of the last linearization
    pub final_sigma_squared: f64,
    /// Norm of the last solved step
    pub final_step_norm: f64,
    /// Total time elapsed
    pub total_time: Duration,
    /// Average time per outer iteration
    pub average_time_per_iteration: Duration,
    /// One entry per trial step
    pub iteration_history: Vec<IterationStats>,
    /// Termination status
    pub status: OptimizationStatus,
}

impl BundleSummary {
    /// Summary of a solve that had nothing to do.
    pub(crate) fn trivial(status: OptimizationStatus, damping: f64) -> Self {
        BundleSummary {
            initial_cost: 0.0,
            final_cost: 0.0,
            iterations: 0,
            accepted_steps: 0,
            rejected_steps: 0,
            final_damping: damping,
            final_sigma_squared: 0.0,
            final_step_norm: 0.0,
            total_time: Duration::from_secs(0),
            average_time_per_iteration: Duration::from_secs(0),
            iteration_history: Vec::new(),
            status,
        }
    }

    pub fn converged(&self) -> bool {
        self.status.is_converged()
    }
}

impl Display for BundleSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bundle Adjustment Final Result")?;
        if self.converged() {
            writeln!(f, "CONVERGED ({})", self.status)?;
        } else {
            writeln!(f, "NOT CONVERGED ({})", self.status)?;
        }

        writeln!(f)?;
        writeln!(f, "Robust cost:")?;
        writeln!(f, "  Initial:   {:.6e}", self.initial_cost)?;
        writeln!(f, "  Final:     {:.6e}", self.final_cost)?;
        writeln!(f, "  σ²:        {:.6e}", self.final_sigma_squared)?;
        writeln!(f)?;
        writeln!(f, "Iterations:")?;
        writeln!(f, "  Total:          {}", self.iterations)?;
        let trials = (self.accepted_steps + self.rejected_steps).max(1) as f64;
        writeln!(
            f,
            "  Accepted steps: {} ({:.1}%)",
            self.accepted_steps,
            100.0 * self.accepted_steps as f64 / trials
        )?;
        writeln!(
            f,
            "  Rejected steps: {} ({:.1}%)",
            self.rejected_steps,
            100.0 * self.rejected_steps as f64 / trials
        )?;
        writeln!(f, "  Final damping:  {:.2e}", self.final_damping)?;
        writeln!(f, "  Final |step|:   {:.2e}", self.final_step_norm)?;
        writeln!(f)?;
        writeln!(f, "Performance:")?;
        writeln!(
            f,
            "  Total time:             {:.2}ms",
            self.total_time.as_secs_f64() * 1000.0
        )?;
        writeln!(
            f,
            "  Average per iteration:  {:.2}ms",
            self.average_time_per_iteration.as_secs_f64() * 1000.0
        )?;
        Ok(())
    }
}

/// Per-trial statistics for the iteration table.
#[derive(Debug, Clone)]
pub struct IterationStats {
    /// Outer iteration (0-indexed)
    pub iteration: usize,
    /// Retry within the outer iteration (0-indexed)
    pub retry: usize,
    /// Robust cost of the current state
    pub cost: f64,
    /// Robust cost of the trial state (∞ when the solve failed)
    pub trial_cost: f64,
    /// σ² used for weighting and costs
    pub sigma_squared: f64,
    /// Norm of the solved step (0 when the solve failed)
    pub step_norm: f64,
    /// Damping λ used for this trial
    pub damping: f64,
    /// Active measurements of the linearization
    pub active_measurements: usize,
    /// Time of this trial in milliseconds
    pub iter_time_ms: f64,
    /// Total elapsed time in milliseconds
    pub total_time_ms: f64,
    /// Whether the trial was accepted
    pub accepted: bool,
}

impl IterationStats {
    pub fn print_header() {
        debug!(
            "{:>4}  {:>5}  {:>13}  {:>13}  {:>11}  {:>11}  {:>11}  {:>7}  {:>11}  {:>13}  {:>6}",
            "iter",
            "retry",
            "cost",
            "trial_cost",
            "sigma2",
            "|step|",
            "lambda",
            "active",
            "iter_time",
            "total_time",
            "status"
        );
    }

    pub fn print_line(&self) {
        let status = if self.accepted { "✓" } else { "✗" };
        debug!(
            "{:>4}  {:>5}  {:>13.6e}  {:>13.6e}  {:>11.2e}  {:>11.2e}  {:>11.2e}  {:>7}  {:>9.2}ms  {:>11.2}ms  {:>6}",
            self.iteration,
            self.retry,
            self.cost,
            self.trial_cost,
            self.sigma_squared,
            self.step_norm,
            self.damping,
            self.active_measurements,
            self.iter_time_ms,
            self.total_time_ms,
            status
        );
    }
}

/// Configuration of the bundle adjuster.
///
/// ```
/// use bundle_adjust::optimizer::BundleConfig;
/// use web_time::Duration;
///
/// let config = BundleConfig::new()
///     .with_damping(1e-3)
///     .with_damping_bounds(1e-10, 1e10)
///     .with_timeout(Duration::from_secs(5));
/// assert_eq!(config.damping_max, 1e10);
/// ```
#[derive(Debug, Clone)]
pub struct BundleConfig {
    /// Maximum number of outer iterations
    pub max_iterations: usize,
    /// Relative step tolerance: converged when `‖δ‖ ≤ tol · (‖x‖ + tol)`
    pub parameter_tolerance: f64,
    /// 0 silent, 1 summary at info, 2 per-trial table at debug
    pub verbosity: u8,
    /// Timeout duration, checked between outer iterations
    pub timeout: Option<Duration>,
    /// Initial damping parameter
    pub damping: f64,
    /// Minimum damping parameter
    pub damping_min: f64,
    /// Maximum damping parameter; exceeding it aborts the solve
    pub damping_max: f64,
    /// Damping decrease factor (when step accepted)
    pub damping_decrease_factor: f64,
    /// Initial damping increase factor, doubled on every consecutive rejection
    pub damping_nu: f64,
    /// Lower clamp of a diagonal entry before scaling by λ
    pub min_diagonal: f64,
    /// Upper clamp of a diagonal entry before scaling by λ
    pub max_diagonal: f64,
    /// Damped trials per outer iteration
    pub max_step_retries: usize,
    /// Robust weighting kernel
    pub robust_kernel: RobustKernel,
    /// Floor of the robust σ² estimate (pixels²)
    pub min_sigma_squared: f64,
    /// Measurements with `e > multiple · σ²` are flagged bad after the solve
    pub outlier_sigma_multiple: f64,
    /// Fraction of bad measurements that makes a point an outlier
    pub point_outlier_ratio: f64,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            parameter_tolerance: 1e-8,
            verbosity: 0,
            timeout: None,
            damping: 1e-4,
            damping_min: 1e-12,
            damping_max: 1e12,
            damping_decrease_factor: 0.3,
            damping_nu: 2.0,
            min_diagonal: 1e-6,
            max_diagonal: 1e32,
            max_step_retries: 10,
            robust_kernel: RobustKernel::Tukey,
            // 0.7 px standard deviation
            min_sigma_squared: 0.49,
            outlier_sigma_multiple: 1.0,
            point_outlier_ratio: 1.0,
        }
    }
}

impl BundleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_parameter_tolerance(mut self, parameter_tolerance: f64) -> Self {
        self.parameter_tolerance = parameter_tolerance;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_damping_bounds(mut self, min: f64, max: f64) -> Self {
        self.damping_min = min;
        self.damping_max = max;
        self
    }

    pub fn with_damping_factors(mut self, decrease: f64, nu: f64) -> Self {
        self.damping_decrease_factor = decrease;
        self.damping_nu = nu;
        self
    }

    pub fn with_diagonal_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_diagonal = min;
        self.max_diagonal = max;
        self
    }

    pub fn with_max_step_retries(mut self, retries: usize) -> Self {
        self.max_step_retries = retries;
        self
    }

    pub fn with_robust_kernel(mut self, kernel: RobustKernel) -> Self {
        self.robust_kernel = kernel;
        self
    }

    pub fn with_min_sigma_squared(mut self, min_sigma_squared: f64) -> Self {
        self.min_sigma_squared = min_sigma_squared;
        self
    }

    /// Set the outlier thresholds: error multiple of σ² and bad-measurement ratio per point.
    pub fn with_outlier_policy(mut self, sigma_multiple: f64, point_ratio: f64) -> Self {
        self.outlier_sigma_multiple = sigma_multiple;
        self.point_outlier_ratio = point_ratio;
        self
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// `InvalidParameters` naming the first offending field.
    pub fn validate(&self) -> OptimizerResult<()> {
        let fail = |message: &str| Err(OptimizerError::InvalidParameters(message.to_string()).log());
        if !(self.damping > 0.0 && self.damping.is_finite()) {
            return fail("damping must be positive and finite");
        }
        if !(self.damping_min > 0.0 && self.damping_min <= self.damping_max) {
            return fail("damping bounds must satisfy 0 < min <= max");
        }
        if !(self.damping_decrease_factor > 0.0 && self.damping_decrease_factor < 1.0) {
            return fail("damping decrease factor must lie in (0, 1)");
        }
        if self.damping_nu <= 1.0 {
            return fail("damping increase factor must exceed 1");
        }
        if !(self.min_diagonal > 0.0 && self.min_diagonal <= self.max_diagonal) {
            return fail("diagonal bounds must satisfy 0 < min <= max");
        }
        if self.max_step_retries == 0 {
            return fail("at least one step retry is required");
        }
        if !(self.parameter_tolerance >= 0.0) {
            return fail("parameter tolerance must be non-negative");
        }
        if !(self.min_sigma_squared > 0.0) {
            return fail("minimum sigma squared must be positive");
        }
        if !(self.outlier_sigma_multiple > 0.0 && self.outlier_sigma_multiple.is_finite()) {
            return fail("outlier sigma multiple must be positive and finite");
        }
        if !(self.point_outlier_ratio > 0.0 && self.point_outlier_ratio <= 1.0) {
            return fail("point outlier ratio must lie in (0, 1]");
        }
        Ok(())
    }

    pub(crate) fn outlier_policy(&self) -> OutlierPolicy {
        OutlierPolicy {
            kernel: self.robust_kernel,
            min_sigma_squared: self.min_sigma_squared,
            sigma_multiple: self.outlier_sigma_multiple,
            point_ratio: self.point_outlier_ratio,
        }
    }

    pub(crate) fn damping_bounds(&self) -> DampingBounds {
        DampingBounds {
            min_diagonal: self.min_diagonal,
            max_diagonal: self.max_diagonal,
        }
    }

    /// Print configuration parameters at debug level
    pub fn print_configuration(&self) {
        debug!(
            "Configuration:\n  Solver:        Levenberg-Marquardt (Schur)\n  Robust kernel: {}\n  Convergence Criteria:\n  Max iterations:      {}\n  Parameter tolerance: {:.2e}\n  Timeout:             {:?}\n  Damping Parameters:\n  Initial damping:     {:.2e}\n  Damping range:       [{:.2e}, {:.2e}]\n  Decrease factor:     {:.2}\n  Increase factor:     {:.2}\n  Diagonal clamp:      [{:.2e}, {:.2e}]\n  Step retries:        {}\n  Outliers:\n  Min sigma²:          {:.2}\n  Sigma multiple:      {:.2}\n  Point ratio:         {:.2}",
            self.robust_kernel,
            self.max_iterations,
            self.parameter_tolerance,
            self.timeout,
            self.damping,
            self.damping_min,
            self.damping_max,
            self.damping_decrease_factor,
            self.damping_nu,
            self.min_diagonal,
            self.max_diagonal,
            self.max_step_retries,
            self.min_sigma_squared,
            self.outlier_sigma_multiple,
            self.point_outlier_ratio
        );
    }
}

/// Candidate state produced by one damped solve.
struct TrialState {
    poses: Vec<SE3>,
    positions: Vec<Vector3<f64>>,
    step_norm: f64,
}

/// Outcome of one outer iteration.
enum IterationOutcome {
    Accepted,
    Converged,
    Exhausted,
}

/// Levenberg-Marquardt solver over a [`BundleProblem`].
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: BundleConfig,
}

impl LevenbergMarquardt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BundleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    fn verbose_table(&self) -> bool {
        self.config.verbosity >= 2 && tracing::enabled!(tracing::Level::DEBUG)
    }

    /// `‖x‖` over free-camera twists and point positions.
    fn compute_parameter_norm(problem: &BundleProblem, structure: &SparsityStructure) -> f64 {
        let cameras: f64 = structure
            .free_cameras()
            .iter()
            .map(|&c| {
                let norm = problem.cameras()[c].pose().log().norm();
                norm * norm
            })
            .sum();
        let points: f64 = problem
            .points()
            .iter()
            .map(|p| p.position().norm_squared())
            .sum();
        (cameras + points).sqrt()
    }

    fn build_trial(
        problem: &BundleProblem,
        structure: &SparsityStructure,
        camera_step: &Mat<f64>,
        point_steps: &[Vector3<f64>],
    ) -> TrialState {
        let mut poses: Vec<SE3> = problem.cameras().iter().map(|c| c.pose().clone()).collect();
        let mut squared_norm = 0.0;
        for (row, &camera) in structure.free_cameras().iter().enumerate() {
            let twist = camera_block(camera_step, row);
            squared_norm += twist.norm_squared();
            poses[camera] = poses[camera].left_plus(&SE3Tangent::from(twist));
        }
        let positions = problem
            .points()
            .iter()
            .zip(point_steps)
            .map(|(point, step)| {
                squared_norm += step.norm_squared();
                point.position() + step
            })
            .collect();
        TrialState {
            poses,
            positions,
            step_norm: squared_norm.sqrt(),
        }
    }

    /// Robust cost of a trial over the measurements active at linearization.
    fn trial_cost(
        &self,
        problem: &BundleProblem,
        equations: &NormalEquations,
        model: &dyn ProjectionModel,
        trial: &TrialState,
        sigma_squared: f64,
    ) -> f64 {
        let kernel = self.config.robust_kernel;
        problem
            .measurements()
            .iter()
            .enumerate()
            .filter(|(m, _)| equations.is_active(*m))
            .map(|(_, measurement)| {
                let error = squared_error(
                    model,
                    &trial.poses[measurement.camera()],
                    &trial.positions[measurement.point()],
                    measurement,
                )
                .map_or(f64::INFINITY, |(_, e)| e);
                kernel.cost(error, sigma_squared)
            })
            .sum()
    }

    fn commit(problem: &mut BundleProblem, structure: &SparsityStructure, trial: TrialState) {
        let TrialState {
            mut poses,
            positions,
            ..
        } = trial;
        for &camera in structure.free_cameras() {
            let pose = std::mem::take(&mut poses[camera]);
            problem.cameras_mut()[camera].set_pose(pose);
        }
        for (point, position) in problem.points_mut().iter_mut().zip(positions) {
            point.set_position(position);
        }
    }

    /// Run the solve. Returns the summary; the problem holds the last accepted state.
    ///
    /// The caller is responsible for the gauge: at least one free and one fixed camera.
    pub fn optimize(
        &mut self,
        problem: &mut BundleProblem,
        model: &dyn ProjectionModel,
        token: &CancellationToken,
    ) -> OptimizerResult<BundleSummary> {
        self.config.validate()?;
        let start_time = Instant::now();

        let structure = SparsityStructure::build(problem);
        let mut equations =
            NormalEquations::new(&structure, problem.num_points(), problem.num_measurements());
        let mut system =
            ReducedCameraSystem::new(&structure, problem.num_points(), problem.num_measurements());
        let mut linear_solver = SparseCholeskySolver::new();
        let mut damping = DampingController::new(
            self.config.damping,
            self.config.damping_nu,
            self.config.damping_decrease_factor,
            self.config.damping_min,
            self.config.damping_max,
        );

        let idle_cameras = structure
            .free_cameras()
            .iter()
            .filter(|&&c| structure.camera_measurements(c).is_empty())
            .count();
        let idle_points = (0..problem.num_points())
            .filter(|&p| structure.point_measurements(p).is_empty())
            .count();
        if idle_cameras > 0 || idle_points > 0 {
            warn!(
                "{} free cameras and {} points have no measurements and will not move",
                idle_cameras, idle_points
            );
        }

        if self.verbose_table() {
            self.config.print_configuration();
            IterationStats::print_header();
        }

        let mut initial_cost = None;
        let mut final_cost = 0.0;
        let mut final_sigma_squared = 0.0;
        let mut final_step_norm = 0.0;
        let mut accepted_steps = 0;
        let mut rejected_steps = 0;
        let mut history = Vec::new();
        let mut iterations = 0;
        let mut status = None;

        while iterations < self.config.max_iterations {
            if token.is_cancelled() {
                status = Some(OptimizationStatus::UserTerminated);
                break;
            }
            if let Some(timeout) = self.config.timeout
                && start_time.elapsed() >= timeout
            {
                status = Some(OptimizationStatus::Timeout);
                break;
            }

            let accumulation = equations.accumulate(
                problem,
                &structure,
                model,
                self.config.robust_kernel,
                self.config.min_sigma_squared,
            );
            let current_cost = accumulation.cost;
            let sigma_squared = accumulation.sigma_squared;
            if !current_cost.is_finite() || !sigma_squared.is_finite() {
                return Err(OptimizerError::NumericalInstability(format!(
                    "robust cost {current_cost} with σ² {sigma_squared} at iteration {iterations}"
                ))
                .log());
            }
            initial_cost.get_or_insert(current_cost);
            final_cost = current_cost;
            final_sigma_squared = sigma_squared;
            let parameter_norm = Self::compute_parameter_norm(problem, &structure);
            iterations += 1;

            let mut outcome = IterationOutcome::Exhausted;
            let mut singular_failures = 0;
            for retry in 0..self.config.max_step_retries {
                let trial_start = Instant::now();
                let lambda = damping.lambda();
                system.reduce(&equations, &structure, lambda, self.config.damping_bounds());
                if retry == 0 && system.degenerate_points() > 0 {
                    warn!(
                        "{} points have a singular damped block and stay fixed this iteration",
                        system.degenerate_points()
                    );
                }

                let solved = system
                    .assemble()
                    .and_then(|(matrix, rhs)| linear_solver.solve(&matrix, &rhs));
                let mut stats = IterationStats {
                    iteration: iterations - 1,
                    retry,
                    cost: current_cost,
                    trial_cost: f64::INFINITY,
                    sigma_squared,
                    step_norm: 0.0,
                    damping: lambda,
                    active_measurements: accumulation.active_count,
                    iter_time_ms: 0.0,
                    total_time_ms: 0.0,
                    accepted: false,
                };

                let trial = match solved {
                    Ok(camera_step) => {
                        let point_steps =
                            system.back_substitute(&camera_step, &equations, &structure);
                        Some(Self::build_trial(problem, &structure, &camera_step, &point_steps))
                    }
                    Err(LinAlgError::SingularMatrix | LinAlgError::NonFiniteSolution) => None,
                    Err(e) => return Err(OptimizerError::from(e).log()),
                };
                let trial = trial.filter(|t| t.step_norm.is_finite());

                let mut decision = None;
                match trial {
                    None => {
                        debug!("Reduced system singular at λ = {:.2e}", lambda);
                        singular_failures += 1;
                    }
                    Some(trial) => {
                        let trial_cost =
                            self.trial_cost(problem, &equations, model, &trial, sigma_squared);
                        let improved = trial_cost < current_cost;
                        let tolerance = self.config.parameter_tolerance;
                        let tiny = trial.step_norm <= tolerance * (parameter_norm + tolerance);
                        stats.trial_cost = trial_cost;
                        stats.step_norm = trial.step_norm;
                        stats.accepted = improved;
                        final_step_norm = trial.step_norm;

                        if improved {
                            Self::commit(problem, &structure, trial);
                            damping.accept();
                            accepted_steps += 1;
                            final_cost = trial_cost;
                        }
                        decision = match (improved, tiny) {
                            (_, true) => Some(IterationOutcome::Converged),
                            (true, false) => Some(IterationOutcome::Accepted),
                            (false, false) => None,
                        };
                    }
                }

                stats.iter_time_ms = trial_start.elapsed().as_secs_f64() * 1000.0;
                stats.total_time_ms = start_time.elapsed().as_secs_f64() * 1000.0;
                if self.verbose_table() {
                    stats.print_line();
                }
                let accepted = stats.accepted;
                history.push(stats);

                if let Some(decision) = decision {
                    if !accepted {
                        rejected_steps += 1;
                    }
                    outcome = decision;
                    break;
                }
                rejected_steps += 1;
                damping.reject()?;
            }

            match outcome {
                IterationOutcome::Accepted => {}
                IterationOutcome::Converged => {
                    status = Some(OptimizationStatus::ParameterToleranceReached);
                    break;
                }
                IterationOutcome::Exhausted => {
                    if singular_failures == self.config.max_step_retries {
                        return Err(OptimizerError::LinearSolveFailed(format!(
                            "reduced camera system singular in all {} retries of iteration {}",
                            singular_failures,
                            iterations - 1
                        ))
                        .log());
                    }
                    warn!(
                        "No improving step after {} retries in iteration {} (λ = {:.2e})",
                        self.config.max_step_retries,
                        iterations - 1,
                        damping.lambda()
                    );
                }
            }
        }

        let status = status.unwrap_or(OptimizationStatus::MaxIterationsReached);
        let total_time = start_time.elapsed();
        let summary = BundleSummary {
            initial_cost: initial_cost.unwrap_or(0.0),
            final_cost,
            iterations,
            accepted_steps,
            rejected_steps,
            final_damping: damping.lambda(),
            final_sigma_squared,
            final_step_norm,
            total_time,
            average_time_per_iteration: if iterations > 0 {
                total_time / iterations as u32
            } else {
                Duration::from_secs(0)
            },
            iteration_history: history,
            status,
        };

        if self.config.verbosity >= 1 {
            info!("{}", summary);
        }
        Ok(summary)
    }
}
