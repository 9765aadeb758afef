//! Robust weighting kernels (M-estimators) for outlier-tolerant bundle adjustment.
//!
//! In plain least squares every measurement contributes its squared error `e = ||ε||²`
//! to the cost. With a robust kernel, large errors are down-weighted relative to a
//! noise scale `σ²` that is re-estimated from the error distribution once per outer
//! iteration.
//!
//! # Operations
//!
//! Every kernel exposes three operations:
//! - **weight(e, σ²)**: IRLS weight in `[0, 1]`. It multiplies both the Hessian
//!   contributions (`w·AᵀA`) and the gradient contributions (`w·Aᵀε`) of a measurement.
//! - **cost(e, σ²)**: robust cost, summed over all active measurements to compare a
//!   trial state against the current one.
//! - **scale_estimate(errors)**: robust estimate of `σ²` from the current squared errors.
//!
//! # Available Kernels
//!
//! | Kernel | Weight | Outliers | Scale |
//! |--------|--------|----------|-------|
//! | [`RobustKernel::Tukey`] | redescending, 0 beyond σ² | fully rejected | median × 4.6851 |
//! | [`RobustKernel::Cauchy`] | smoothly decaying | heavily suppressed | median |
//! | [`RobustKernel::Huber`] | 1 inside, `σ/√e` outside | linear influence | median |
//! | [`RobustKernel::LeastSquares`] | 1 | full influence | mean |
//!
//! # Example
//!
//! ```
//! use bundle_adjust::core::robust::RobustKernel;
//!
//! let kernel = RobustKernel::Tukey;
//! let mut errors = vec![0.5, 0.8, 1.1, 0.9, 0.7, 1.2, 0.6, 2500.0];
//! let sigma_squared = kernel.scale_estimate(&mut errors);
//!
//! assert!(kernel.weight(0.8, sigma_squared) > 0.5);
//! assert_eq!(kernel.weight(2500.0, sigma_squared), 0.0); // gross outlier ignored
//! assert_eq!(kernel.cost(2500.0, sigma_squared), 1.0); // and its cost saturates
//! ```

use std::fmt;

/// Consistency factor of the median absolute deviation for Gaussian noise.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Tukey biweight tuning constant for 95% asymptotic efficiency.
const TUKEY_CONSTANT: f64 = 4.6851;

/// Runtime-selectable robust weighting policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RobustKernel {
    /// Tukey biweight: redescending, zero weight beyond σ².
    ///
    /// ```text
    /// w(e) = (1 - e/σ²)²          for e < σ²,  0 otherwise
    /// ρ(e) = 1 - (1 - e/σ²)³      for e < σ²,  1 otherwise
    /// ```
    #[default]
    Tukey,
    /// Cauchy (Lorentzian): every residual keeps some influence.
    ///
    /// ```text
    /// w(e) = 1 / (1 + e/σ²)
    /// ρ(e) = ln(1 + e/σ²)
    /// ```
    Cauchy,
    /// Huber: quadratic inside σ², linear outside.
    ///
    /// ```text
    /// w(e) = 1                    for e < σ²,  σ/√e otherwise
    /// ρ(e) = e/2                  for e < σ²,  σ(√e - σ/2) otherwise
    /// ```
    Huber,
    /// Plain least squares, no robustness.
    LeastSquares,
}

impl fmt::Display for RobustKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RobustKernel::Tukey => write!(f, "Tukey"),
            RobustKernel::Cauchy => write!(f, "Cauchy"),
            RobustKernel::Huber => write!(f, "Huber"),
            RobustKernel::LeastSquares => write!(f, "Least squares"),
        }
    }
}

impl RobustKernel {
    /// IRLS weight of a measurement with squared error `error_squared`.
    pub fn weight(&self, error_squared: f64, sigma_squared: f64) -> f64 {
        match self {
            RobustKernel::Tukey => {
                if error_squared >= sigma_squared {
                    0.0
                } else {
                    let sqrt_weight = 1.0 - error_squared / sigma_squared;
                    sqrt_weight * sqrt_weight
                }
            }
            RobustKernel::Cauchy => 1.0 / (1.0 + error_squared / sigma_squared),
            RobustKernel::Huber => {
                if error_squared < sigma_squared {
                    1.0
                } else {
                    (sigma_squared / error_squared).sqrt()
                }
            }
            RobustKernel::LeastSquares => 1.0,
        }
    }

    /// Robust cost of a measurement with squared error `error_squared`.
    ///
    /// An infinite error (failed projection) costs the saturation value for Tukey
    /// and `+∞` for every other kernel.
    pub fn cost(&self, error_squared: f64, sigma_squared: f64) -> f64 {
        match self {
            RobustKernel::Tukey => {
                if error_squared >= sigma_squared {
                    1.0
                } else {
                    // 1 - (1 - x)³ without cancellation for small x
                    let x = error_squared / sigma_squared;
                    x * (3.0 - 3.0 * x + x * x)
                }
            }
            RobustKernel::Cauchy => (error_squared / sigma_squared).ln_1p(),
            RobustKernel::Huber => {
                if error_squared < sigma_squared {
                    0.5 * error_squared
                } else {
                    let sigma = sigma_squared.sqrt();
                    sigma * (error_squared.sqrt() - 0.5 * sigma)
                }
            }
            RobustKernel::LeastSquares => error_squared,
        }
    }

    /// Estimate σ² from the current squared errors.
    ///
    /// Median-based kernels use the small-sample corrected MAD estimate
    ///
    /// ```text
    /// σ = 1.4826 · (1 + 5/(2n - 6)) · √median(e)
    /// ```
    ///
    /// scaled by the Tukey tuning constant for [`RobustKernel::Tukey`]. The correction
    /// denominator is clamped to at least one for tiny samples. Returns `0.0` for an
    /// empty slice; callers clamp the result to a configured minimum. The slice is
    /// reordered in place.
    pub fn scale_estimate(&self, errors_squared: &mut [f64]) -> f64 {
        if errors_squared.is_empty() {
            return 0.0;
        }
        match self {
            RobustKernel::LeastSquares => {
                errors_squared.iter().sum::<f64>() / errors_squared.len() as f64
            }
            RobustKernel::Tukey | RobustKernel::Cauchy | RobustKernel::Huber => {
                let n = errors_squared.len();
                let mid = n / 2;
                let (_, median, _) = errors_squared.select_nth_unstable_by(mid, f64::total_cmp);
                let correction = 1.0 + 5.0 / (2.0 * n as f64 - 6.0).max(1.0);
                let mut sigma = MAD_TO_SIGMA * correction * (*median).max(0.0).sqrt();
                if *self == RobustKernel::Tukey {
                    sigma *= TUKEY_CONSTANT;
                }
                sigma * sigma
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    const ALL: [RobustKernel; 4] = [
        RobustKernel::Tukey,
        RobustKernel::Cauchy,
        RobustKernel::Huber,
        RobustKernel::LeastSquares,
    ];

    #[test]
    fn test_weights_are_unit_at_zero_and_bounded() {
        for kernel in ALL {
            assert!((kernel.weight(0.0, 2.0) - 1.0).abs() < EPSILON, "{kernel}");
            for e in [0.1, 1.0, 3.0, 100.0, 1e6] {
                let w = kernel.weight(e, 2.0);
                assert!((0.0..=1.0).contains(&w), "{kernel} weight {w} at {e}");
            }
        }
    }

    #[test]
    fn test_weights_are_non_increasing() {
        for kernel in ALL {
            let mut previous = kernel.weight(0.0, 1.0);
            for step in 1..200 {
                let w = kernel.weight(step as f64 * 0.05, 1.0);
                assert!(w <= previous + EPSILON, "{kernel} at step {step}");
                previous = w;
            }
        }
    }

    #[test]
    fn test_tukey_rejects_beyond_sigma() {
        let kernel = RobustKernel::Tukey;
        assert_eq!(kernel.weight(4.0, 4.0), 0.0);
        assert_eq!(kernel.cost(9.0, 4.0), 1.0);
        // Continuous at the boundary
        assert!((kernel.cost(4.0 - 1e-9, 4.0) - 1.0).abs() < 1e-6);
        assert!((kernel.weight(1.0, 4.0) - 0.5625).abs() < EPSILON);
    }

    #[test]
    fn test_tukey_cost_derivative_matches_weight() {
        // dρ/de = 3/σ² · w(e) for the biweight
        let kernel = RobustKernel::Tukey;
        let (sigma2, e, h) = (2.0, 0.7, 1e-6);
        let numeric = (kernel.cost(e + h, sigma2) - kernel.cost(e - h, sigma2)) / (2.0 * h);
        assert!((numeric - 3.0 / sigma2 * kernel.weight(e, sigma2)).abs() < 1e-6);
    }

    #[test]
    fn test_huber_cost_continuous() {
        let kernel = RobustKernel::Huber;
        let sigma2 = 2.25;
        let inside = kernel.cost(sigma2 - 1e-9, sigma2);
        let outside = kernel.cost(sigma2, sigma2);
        assert!((inside - outside).abs() < 1e-6);
        assert!((kernel.weight(9.0, sigma2) - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_cauchy_values() {
        let kernel = RobustKernel::Cauchy;
        assert!((kernel.weight(1.0, 1.0) - 0.5).abs() < EPSILON);
        assert!((kernel.cost(1.0, 1.0) - 2.0_f64.ln()).abs() < EPSILON);
    }

    #[test]
    fn test_infinite_error_costs() {
        assert_eq!(RobustKernel::Tukey.cost(f64::INFINITY, 1.0), 1.0);
        for kernel in [
            RobustKernel::Cauchy,
            RobustKernel::Huber,
            RobustKernel::LeastSquares,
        ] {
            assert!(kernel.cost(f64::INFINITY, 1.0).is_infinite(), "{kernel}");
        }
    }

    #[test]
    fn test_scale_estimate_ignores_gross_outliers() {
        let mut clean = vec![1.0; 20];
        let mut dirty = vec![1.0; 20];
        dirty[3] = 1e8;
        dirty[11] = 1e9;
        for kernel in [RobustKernel::Tukey, RobustKernel::Cauchy, RobustKernel::Huber] {
            let a = kernel.scale_estimate(&mut clean);
            let b = kernel.scale_estimate(&mut dirty);
            assert!((a - b).abs() < EPSILON, "{kernel}");
        }
    }

    #[test]
    fn test_scale_estimate_values() {
        let mut errors = vec![4.0; 13];
        // n = 13: correction = 1 + 5/20 = 1.25
        let cauchy = RobustKernel::Cauchy.scale_estimate(&mut errors);
        let expected_sigma = MAD_TO_SIGMA * 1.25 * 2.0;
        assert!((cauchy - expected_sigma * expected_sigma).abs() < 1e-9);

        let tukey = RobustKernel::Tukey.scale_estimate(&mut errors);
        let expected_sigma = expected_sigma * TUKEY_CONSTANT;
        assert!((tukey - expected_sigma * expected_sigma).abs() < 1e-9);

        let mut errors = vec![1.0, 2.0, 3.0];
        assert!((RobustKernel::LeastSquares.scale_estimate(&mut errors) - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_scale_estimate_small_and_empty_samples() {
        let mut empty: Vec<f64> = Vec::new();
        assert_eq!(RobustKernel::Tukey.scale_estimate(&mut empty), 0.0);

        let mut tiny = vec![1.0, 1.0];
        let sigma2 = RobustKernel::Cauchy.scale_estimate(&mut tiny);
        assert!(sigma2.is_finite() && sigma2 > 0.0);
    }
}
