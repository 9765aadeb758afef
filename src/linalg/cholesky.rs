use faer::{
    Mat, Side,
    linalg::solvers::Solve,
    sparse::SparseColMat,
    sparse::linalg::solvers::{Llt, SymbolicLlt},
};

use crate::linalg::{LinAlgError, LinAlgResult};

/// Sparse LLᵀ solver for the reduced camera system.
///
/// The reduced system keeps one sparsity pattern for the whole solve, so the symbolic
/// factorization is computed on the first call and reused afterwards.
#[derive(Debug, Clone, Default)]
pub struct SparseCholeskySolver {
    /// Cached symbolic factorization, reference-counted so `clone()` is O(1).
    symbolic_factorization: Option<SymbolicLlt<usize>>,
}

impl SparseCholeskySolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a symbolic factorization has been cached.
    pub fn has_symbolic(&self) -> bool {
        self.symbolic_factorization.is_some()
    }

    /// Drop the cached symbolic factorization, e.g. when the pattern changes.
    pub fn reset(&mut self) {
        self.symbolic_factorization = None;
    }

    /// Solve `matrix · x = rhs` for a symmetric positive definite `matrix`.
    ///
    /// # Errors
    /// - `FactorizationFailed` if the symbolic analysis fails
    /// - `SingularMatrix` if the numeric factorization fails
    /// - `NonFiniteSolution` if the result contains NaN or Inf
    pub fn solve(
        &mut self,
        matrix: &SparseColMat<usize, f64>,
        rhs: &Mat<f64>,
    ) -> LinAlgResult<Mat<f64>> {
        let symbolic = match &self.symbolic_factorization {
            Some(cached) => cached.clone(),
            None => {
                let symbolic = SymbolicLlt::try_new(matrix.symbolic(), Side::Lower).map_err(|e| {
                    LinAlgError::FactorizationFailed(
                        "Symbolic Cholesky decomposition failed".to_string(),
                    )
                    .log_with_source(e)
                })?;
                self.symbolic_factorization = Some(symbolic.clone());
                symbolic
            }
        };

        // Not logged: a singular trial system is an expected LM event
        let cholesky = Llt::try_new_with_symbolic(symbolic, matrix.as_ref(), Side::Lower)
            .map_err(|_| LinAlgError::SingularMatrix)?;

        let solution = cholesky.solve(rhs);
        for i in 0..solution.nrows() {
            if !solution[(i, 0)].is_finite() {
                return Err(LinAlgError::NonFiniteSolution);
            }
        }
        Ok(solution)
    }
}
