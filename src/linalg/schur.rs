//! Schur elimination of the point blocks onto the free cameras.
//!
//! With the damped blocks `U*`, `V*` the points are eliminated through
//!
//! ```text
//! Y_ij  = W_ij V*_i⁻¹
//! S_jj  = U*_j - Σ_i Y_ij W_ijᵀ
//! S_jk  = -Σ_i Y_ij W_ikᵀ                 (j < k, from the elimination script)
//! e_j   = εA_j - Σ_i Y_ij εB_i
//! ```
//!
//! giving the reduced camera system `S δa = e`. After solving it the point updates are
//!
//! ```text
//! δb_i = V*_i⁻¹ (εB_i - Σ_j W_ijᵀ δa_j)
//! ```
//!
//! A point whose damped block cannot be inverted is skipped: it contributes nothing to
//! `S` or `e` and receives a zero update.

use crate::core::sparsity::SparsityStructure;
use crate::linalg::accumulator::{Matrix6x3, NormalEquations};
use crate::linalg::{LinAlgError, LinAlgResult};
use faer::{
    Mat,
    sparse::{SparseColMat, Triplet},
};
use nalgebra::{Matrix3, Matrix6, SMatrix, Vector3, Vector6};
use std::collections::BTreeMap;

/// Diagonal bounds for the multiplicative damping `H_ii += λ · clamp(H_ii, min, max)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampingBounds {
    pub min_diagonal: f64,
    pub max_diagonal: f64,
}

/// Add `λ · clamp(H_ii)` to every diagonal entry.
pub fn damp_diagonal<const D: usize>(
    matrix: &mut SMatrix<f64, D, D>,
    lambda: f64,
    bounds: DampingBounds,
) {
    for i in 0..D {
        let diagonal = matrix[(i, i)];
        matrix[(i, i)] = diagonal + lambda * diagonal.clamp(bounds.min_diagonal, bounds.max_diagonal);
    }
}

/// Reduced camera system with a constant block pattern.
#[derive(Debug, Clone)]
pub struct ReducedCameraSystem {
    diagonal: Vec<Matrix6<f64>>,
    off_diagonal: BTreeMap<(usize, usize), Matrix6<f64>>,
    rhs: Vec<Vector6<f64>>,
    point_inverses: Vec<Option<Matrix3<f64>>>,
    eliminated: Vec<Matrix6x3>,
}

impl ReducedCameraSystem {
    pub fn new(structure: &SparsityStructure, num_points: usize, num_measurements: usize) -> Self {
        ReducedCameraSystem {
            diagonal: vec![Matrix6::zeros(); structure.num_rows()],
            off_diagonal: structure
                .off_diagonal_blocks()
                .iter()
                .map(|&key| (key, Matrix6::zeros()))
                .collect(),
            rhs: vec![Vector6::zeros(); structure.num_rows()],
            point_inverses: vec![None; num_points],
            eliminated: vec![Matrix6x3::zeros(); num_measurements],
        }
    }

    /// Dimension of the reduced system (6 per free camera).
    pub fn dimension(&self) -> usize {
        6 * self.diagonal.len()
    }

    /// Number of points whose damped block could not be inverted in the last reduction.
    pub fn degenerate_points(&self) -> usize {
        self.point_inverses.iter().filter(|inv| inv.is_none()).count()
    }

    /// Damp the accumulated blocks with `lambda` and eliminate the points.
    pub fn reduce(
        &mut self,
        equations: &NormalEquations,
        structure: &SparsityStructure,
        lambda: f64,
        bounds: DampingBounds,
    ) {
        for (row, block) in self.diagonal.iter_mut().enumerate() {
            *block = *equations.camera_hessian(row);
            damp_diagonal(block, lambda, bounds);
        }
        for (row, rhs) in self.rhs.iter_mut().enumerate() {
            *rhs = *equations.camera_gradient(row);
        }
        for block in self.off_diagonal.values_mut() {
            *block = Matrix6::zeros();
        }
        self.eliminated.fill(Matrix6x3::zeros());

        for point in 0..self.point_inverses.len() {
            let mut damped = *equations.point_hessian(point);
            damp_diagonal(&mut damped, lambda, bounds);
            let inverse = damped.cholesky().map(|chol| chol.inverse());
            self.point_inverses[point] = inverse;
            let Some(inverse) = inverse else {
                continue;
            };

            let gradient = equations.point_gradient(point);
            for &m in structure.point_measurements(point) {
                if !equations.is_active(m) {
                    continue;
                }
                // Fixed cameras have a zero coupling and no row
                let Some(row) = structure.camera_row_of_measurement(m) else {
                    continue;
                };
                let w = equations.coupling(m);
                let y = w * inverse;
                self.diagonal[row] -= y * w.transpose();
                self.rhs[row] -= y * gradient;
                self.eliminated[m] = y;
            }

            for entry in structure.elimination_script(point) {
                if !(equations.is_active(entry.first) && equations.is_active(entry.second)) {
                    continue;
                }
                if let Some(block) = self.off_diagonal.get_mut(&entry.block) {
                    *block -= self.eliminated[entry.first] * equations.coupling(entry.second).transpose();
                }
            }
        }
    }

    /// Assemble `S` as a full symmetric sparse matrix and `e` as a dense column.
    ///
    /// Every block of the pattern is emitted, zeros included, so the symbolic
    /// factorization stays valid across passes.
    pub fn assemble(&self) -> LinAlgResult<(SparseColMat<usize, f64>, Mat<f64>)> {
        let n = self.dimension();
        let triplets = self.triplets();
        let matrix = SparseColMat::try_new_from_triplets(n, n, &triplets).map_err(|e| {
            LinAlgError::SparseMatrixCreation("Failed to create reduced camera system".to_string())
                .log_with_source(e)
        })?;

        let mut rhs = Mat::zeros(n, 1);
        for (row, block) in self.rhs.iter().enumerate() {
            for i in 0..6 {
                rhs[(6 * row + i, 0)] = block[i];
            }
        }
        Ok((matrix, rhs))
    }

    fn triplets(&self) -> Vec<Triplet<usize, usize, f64>> {
        let mut triplets = Vec::with_capacity(36 * (self.diagonal.len() + 2 * self.off_diagonal.len()));

        for (row, block) in self.diagonal.iter().enumerate() {
            push_block(&mut triplets, row, row, block, false);
        }
        for (&(j, k), block) in &self.off_diagonal {
            push_block(&mut triplets, j, k, block, false);
            push_block(&mut triplets, k, j, block, true);
        }
        triplets
    }

    /// Point updates `δb` from the solved camera updates `δa`.
    pub fn back_substitute(
        &self,
        camera_step: &Mat<f64>,
        equations: &NormalEquations,
        structure: &SparsityStructure,
    ) -> Vec<Vector3<f64>> {
        let mut steps = vec![Vector3::zeros(); self.point_inverses.len()];
        for (point, step) in steps.iter_mut().enumerate() {
            let Some(inverse) = self.point_inverses[point] else {
                continue;
            };
            let mut gradient = *equations.point_gradient(point);
            for &m in structure.point_measurements(point) {
                if !equations.is_active(m) {
                    continue;
                }
                if let Some(row) = structure.camera_row_of_measurement(m) {
                    gradient -= equations.coupling(m).transpose() * camera_block(camera_step, row);
                }
            }
            *step = inverse * gradient;
        }
        steps
    }
}

/// Six-vector of reduced row `row` in a stacked camera update.
pub fn camera_block(stacked: &Mat<f64>, row: usize) -> Vector6<f64> {
    Vector6::from_fn(|i, _| stacked[(6 * row + i, 0)])
}

fn push_block(
    triplets: &mut Vec<Triplet<usize, usize, f64>>,
    block_row: usize,
    block_col: usize,
    block: &Matrix6<f64>,
    transpose: bool,
) {
    for c in 0..6 {
        for r in 0..6 {
            let value = if transpose { block[(c, r)] } else { block[(r, c)] };
            triplets.push(Triplet::new(6 * block_row + r, 6 * block_col + c, value));
        }
    }
}
