//! Damping control for the Levenberg-Marquardt trust region.
//!
//! ```text
//! accept:  λ ← max(λ · decrease, λ_min),  ν ← ν₀
//! reject:  λ ← λ · ν,                     ν ← 2ν
//! ```
//!
//! Consecutive rejections grow λ geometrically with a doubling factor. Exceeding
//! `λ_max` is unrecoverable.

use crate::optimizer::{OptimizerError, OptimizerResult};

#[derive(Debug, Clone, PartialEq)]
pub struct DampingController {
    lambda: f64,
    nu: f64,
    initial_nu: f64,
    decrease_factor: f64,
    min: f64,
    max: f64,
}

impl DampingController {
    pub fn new(initial: f64, nu: f64, decrease_factor: f64, min: f64, max: f64) -> Self {
        DampingController {
            lambda: initial,
            nu,
            initial_nu: nu,
            decrease_factor,
            min,
            max,
        }
    }

    /// Current damping λ.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Current increase factor ν.
    pub fn nu(&self) -> f64 {
        self.nu
    }

    /// Shrink the damping after an accepted step.
    pub fn accept(&mut self) {
        self.lambda = (self.lambda * self.decrease_factor).max(self.min);
        self.nu = self.initial_nu;
    }

    /// Grow the damping after a rejected step.
    ///
    /// # Errors
    /// `DampingFailure` if the new damping exceeds the maximum. λ is left unchanged.
    pub fn reject(&mut self) -> OptimizerResult<()> {
        let next = self.lambda * self.nu;
        if !next.is_finite() || next > self.max {
            return Err(OptimizerError::DampingFailure {
                damping: next,
                max_damping: self.max,
            }
            .log());
        }
        self.lambda = next;
        self.nu *= 2.0;
        Ok(())
    }
}
