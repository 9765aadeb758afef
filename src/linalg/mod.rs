//! Normal equations, Schur elimination and the sparse reduced-camera solve.
//!
//! One outer iteration of the bundle adjuster flows through this module as
//!
//! 1. [`NormalEquations::accumulate`]: per-camera `U`, per-point `V`, per-measurement `W`
//!    blocks and the right-hand sides `εA`, `εB`, weighted by the robust kernel
//! 2. [`ReducedCameraSystem::reduce`]: damping, point-block inversion and the Schur
//!    complement onto the free cameras
//! 3. [`SparseCholeskySolver::solve`]: sparse Cholesky of the reduced system
//! 4. [`ReducedCameraSystem::back_substitute`]: point updates from the camera updates

pub mod accumulator;
pub mod cholesky;
pub mod schur;

pub use accumulator::NormalEquations;
pub use cholesky::SparseCholeskySolver;
pub use schur::ReducedCameraSystem;

use thiserror::Error;
use tracing::error;

/// Linear algebra specific error types
#[derive(Debug, Clone, Error)]
pub enum LinAlgError {
    /// Matrix factorization failed (symbolic or numeric)
    #[error("Matrix factorization failed: {0}")]
    FactorizationFailed(String),

    /// Singular or near-singular matrix detected
    #[error("Singular matrix detected (matrix is not invertible)")]
    SingularMatrix,

    /// Failed to create sparse matrix from triplets
    #[error("Failed to create sparse matrix: {0}")]
    SparseMatrixCreation(String),

    /// The solve produced NaN or Inf
    #[error("Linear solve produced non-finite values")]
    NonFiniteSolution,
}

impl LinAlgError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// operation()
    ///     .map_err(|e| LinAlgError::from(e).log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error from a third-party library
    ///
    /// Used for faer's `FaerError`, `LltError` and `CreationError`, which carry the
    /// details the `LinAlgError` message leaves out.
    ///
    /// # Example
    /// ```ignore
    /// SymbolicLlt::try_new(matrix.symbolic(), Side::Lower)
    ///     .map_err(|e| {
    ///         LinAlgError::FactorizationFailed(
    ///             "Symbolic Cholesky decomposition failed".to_string()
    ///         )
    ///         .log_with_source(e)
    ///     })?;
    /// ```
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;
