//! Core building blocks of the bundle adjustment problem
//!
//! This module contains:
//! - The problem graph of cameras, points and measurements
//! - Sparsity preprocessing (per-camera tables and the elimination script)
//! - Residual and Jacobian evaluation of a single measurement
//! - Robust weighting kernels (M-estimators)

pub mod problem;
pub mod residual;
pub mod robust;
pub mod sparsity;

use thiserror::Error;
use tracing::error;

/// Core module error types for problem construction
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Measurement refers to a camera that was never added
    #[error("Invalid camera index {index} (problem has {count} cameras)")]
    InvalidCameraIndex { index: usize, count: usize },

    /// Measurement refers to a point that was never added
    #[error("Invalid point index {index} (problem has {count} points)")]
    InvalidPointIndex { index: usize, count: usize },

    /// A (camera, point) pair was measured twice
    #[error("Duplicate measurement of point {point} in camera {camera}")]
    DuplicateMeasurement { camera: usize, point: usize },

    /// Entities were added after the first solve
    #[error("Problem topology is frozen after the first solve: {0}")]
    TopologyFrozen(String),

    /// Gauge cannot be pinned (free cameras without a fixed one)
    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),

    /// Invalid input parameter or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// operation()
    ///     .map_err(|e| CoreError::from(e).log())?;
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

/// Result type for core module operations
pub type CoreResult<T> = Result<T, CoreError>;
