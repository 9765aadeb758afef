//! Levenberg-Marquardt solve of the bundle adjustment problem.
//!
//! This module contains:
//! - [`LevenbergMarquardt`]: the outer loop (linearize once, retry with growing damping)
//! - [`DampingController`]: the λ/ν trust-region bookkeeping
//! - [`CancellationToken`]: cooperative cancellation polled between outer iterations
//! - [`classify_outliers`]: post-solve measurement and point classification

use crate::linalg;
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::error;

pub mod cancellation;
pub mod levenberg_marquardt;
pub mod outliers;
pub mod trust_region;

pub use cancellation::CancellationToken;
pub use levenberg_marquardt::{BundleConfig, BundleSummary, IterationStats, LevenbergMarquardt};
pub use outliers::{OutlierPolicy, OutlierReport, classify_outliers};
pub use trust_region::DampingController;

/// Optimizer-specific error types
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    /// Every retry of an outer iteration failed to solve the reduced system
    #[error("Linear system solve failed: {0}")]
    LinearSolveFailed(String),

    /// Damping parameter became too large
    #[error("Damping parameter became too large: {damping:.6e} > {max_damping:.6e}")]
    DampingFailure { damping: f64, max_damping: f64 },

    /// Invalid optimization parameters provided
    #[error("Invalid optimization parameters: {0}")]
    InvalidParameters(String),

    /// Numerical instability detected (NaN, Inf in cost or parameters)
    #[error("Numerical instability detected: {0}")]
    NumericalInstability(String),

    /// Linear algebra operation failed
    #[error("Linear algebra error: {0}")]
    LinAlg(#[from] linalg::LinAlgError),
}

impl OptimizerError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// operation()
    ///     .map_err(|e| OptimizerError::from(e).log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error from a third-party library
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Status of an optimization process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizationStatus {
    /// Nothing to optimize (no free cameras)
    Converged,
    /// Parameter update fell below the relative tolerance
    ParameterToleranceReached,
    /// Maximum number of outer iterations reached
    MaxIterationsReached,
    /// Cancellation token was set
    UserTerminated,
    /// Timeout reached
    Timeout,
}

impl OptimizationStatus {
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            OptimizationStatus::Converged | OptimizationStatus::ParameterToleranceReached
        )
    }
}

impl Display for OptimizationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationStatus::Converged => write!(f, "Converged"),
            OptimizationStatus::ParameterToleranceReached => {
                write!(f, "Parameter tolerance reached")
            }
            OptimizationStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            OptimizationStatus::UserTerminated => write!(f, "User terminated"),
            OptimizationStatus::Timeout => write!(f, "Timeout"),
        }
    }
}
