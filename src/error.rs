//! Top-level error type of the bundle adjuster.
//!
//! Every module owns its own `thiserror` enum; [`BundleError`] wraps them
//! transparently so the source chain survives up to the caller:
//!
//! ```text
//! BundleError::Optimizer(
//!     OptimizerError::LinAlg(
//!         LinAlgError::FactorizationFailed("symbolic analysis of the reduced system")
//!     )
//! )
//! ```

use crate::{core::CoreError, linalg::LinAlgError, optimizer::OptimizerError};
use std::error::Error as StdError;
use thiserror::Error;

/// Result type of the public API
pub type BundleResult<T> = Result<T, BundleError>;

/// Error returned by the public API
///
/// ```rust,ignore
/// if let Err(e) = bundle.compute(&token) {
///     warn!("Bundle adjustment failed: {}", e.chain_compact());
/// }
/// ```
#[derive(Debug, Error)]
pub enum BundleError {
    /// Problem construction and gauge errors
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Solver failures (exhausted retries, damping overflow, bad configuration)
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    /// Linear algebra errors
    #[error(transparent)]
    LinearAlgebra(#[from] LinAlgError),
}

impl BundleError {
    /// The error and its sources, one per line.
    pub fn chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(format!("  → {}", err));
            source = err.source();
        }

        chain.join("\n")
    }

    /// The error and its sources on a single line.
    pub fn chain_compact(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }

        chain.join(" → ")
    }
}
