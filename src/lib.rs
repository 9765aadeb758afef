//! # Bundle Adjust
//!
//! Batch bundle adjustment of keyframe camera poses and 3D map points for monocular
//! visual SLAM, in the style of PTAM's map maintenance.
//!
//! ## Features
//!
//! - **Schur elimination**: points are eliminated per point block; only the reduced
//!   camera system (6 × free cameras) is factorized, with sparse Cholesky from faer
//! - **Levenberg-Marquardt**: multiplicative diagonal damping with step retries and
//!   a strict cost-decrease acceptance test
//! - **Robust weighting**: Tukey (default), Cauchy, Huber or plain least squares, with
//!   the noise scale re-estimated every outer iteration
//! - **Outlier classification**: gross measurements and points are flagged after each
//!   solve and excluded from later ones
//! - **Camera models**: pinhole and FOV (arctangent) distortion behind one trait
//! - **Cooperative cancellation** from another thread
//!
//! ## Conventions
//!
//! Camera poses are camera-from-world `SE3` transforms. Updates are left perturbations
//! `T' = exp(δ)·T` with twist `δ = [ρ, θ]`. Residuals are
//! `s · (observed − project(Xc.xy / Xc.z))` with `s = 1/σ_noise`.
//!
//! ## Modules
//!
//! - [`bundle`]: the [`Bundle`] façade
//! - [`core`]: problem graph, sparsity preprocessing, residuals, robust kernels
//! - [`linalg`]: normal-equation accumulation, Schur reduction, sparse Cholesky
//! - [`optimizer`]: Levenberg-Marquardt loop, damping, cancellation, outliers
//! - [`camera`], [`manifold`]: projection models and SE(3)/SO(3)

pub mod bundle;
pub mod camera;
pub mod core;
pub mod error;
pub mod linalg;
#[cfg(feature = "logging")]
pub mod logger;
pub mod manifold;
pub mod optimizer;

pub use bundle::Bundle;
pub use camera::{FovModel, PinholeModel, ProjectionModel};
pub use core::robust::RobustKernel;
pub use error::{BundleError, BundleResult};
#[cfg(feature = "logging")]
pub use logger::{init_logger, init_logger_with_level};
pub use manifold::{SE3, SE3Tangent};
pub use optimizer::{
    BundleConfig, BundleSummary, CancellationToken, IterationStats, OptimizationStatus,
};
