//! Sparsity preprocessing for Schur elimination.
//!
//! Built once per solve from the problem topology. It provides
//! - a deterministic measurement order grouped by camera, then point
//! - per-camera and per-point measurement tables
//! - row numbering of the reduced camera system (fixed cameras own no row)
//! - the per-point elimination script: every pair of free cameras that jointly
//!   observe the point, naming the off-diagonal 6x6 block it couples
//!
//! Memory is proportional to Σ_points (observations choose 2).

use crate::core::problem::BundleProblem;
use std::collections::BTreeSet;

/// One coupling term of a point's elimination script.
///
/// The point's measurements `first` (camera row `block.0`) and `second`
/// (camera row `block.1`) produce `-Y_first · W_secondᵀ` in block `block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouplingEntry {
    pub first: usize,
    pub second: usize,
    pub block: (usize, usize),
}

#[derive(Debug, Clone)]
pub struct SparsityStructure {
    measurement_order: Vec<usize>,
    camera_measurements: Vec<Vec<usize>>,
    point_measurements: Vec<Vec<usize>>,
    point_cameras: Vec<BTreeSet<usize>>,
    camera_rows: Vec<Option<usize>>,
    measurement_rows: Vec<Option<usize>>,
    free_cameras: Vec<usize>,
    elimination_scripts: Vec<Vec<CouplingEntry>>,
    off_diagonal_blocks: BTreeSet<(usize, usize)>,
}

impl SparsityStructure {
    pub fn build(problem: &BundleProblem) -> Self {
        let measurements = problem.measurements();

        let mut measurement_order: Vec<usize> = (0..measurements.len()).collect();
        measurement_order.sort_by_key(|&i| (measurements[i].camera(), measurements[i].point()));

        let mut camera_measurements = vec![Vec::new(); problem.num_cameras()];
        let mut point_measurements = vec![Vec::new(); problem.num_points()];
        let mut point_cameras = vec![BTreeSet::new(); problem.num_points()];
        // Sorted order keeps each point's list ordered by camera
        for &m in &measurement_order {
            let measurement = &measurements[m];
            camera_measurements[measurement.camera()].push(m);
            point_measurements[measurement.point()].push(m);
            point_cameras[measurement.point()].insert(measurement.camera());
        }

        let mut camera_rows = vec![None; problem.num_cameras()];
        let mut free_cameras = Vec::new();
        for (index, camera) in problem.cameras().iter().enumerate() {
            if !camera.is_fixed() {
                camera_rows[index] = Some(free_cameras.len());
                free_cameras.push(index);
            }
        }

        let measurement_rows = measurements
            .iter()
            .map(|m| camera_rows[m.camera()])
            .collect();

        let mut elimination_scripts = Vec::with_capacity(problem.num_points());
        let mut off_diagonal_blocks = BTreeSet::new();
        for observations in &point_measurements {
            let mut script = Vec::new();
            for (a, &first) in observations.iter().enumerate() {
                let Some(row_j) = camera_rows[measurements[first].camera()] else {
                    continue;
                };
                for &second in &observations[a + 1..] {
                    if let Some(row_k) = camera_rows[measurements[second].camera()] {
                        script.push(CouplingEntry {
                            first,
                            second,
                            block: (row_j, row_k),
                        });
                        off_diagonal_blocks.insert((row_j, row_k));
                    }
                }
            }
            elimination_scripts.push(script);
        }

        SparsityStructure {
            measurement_order,
            camera_measurements,
            point_measurements,
            point_cameras,
            camera_rows,
            measurement_rows,
            free_cameras,
            elimination_scripts,
            off_diagonal_blocks,
        }
    }

    /// Measurement indices grouped by camera, then point.
    pub fn measurement_order(&self) -> &[usize] {
        &self.measurement_order
    }

    pub fn camera_measurements(&self, camera: usize) -> &[usize] {
        &self.camera_measurements[camera]
    }

    pub fn point_measurements(&self, point: usize) -> &[usize] {
        &self.point_measurements[point]
    }

    /// Cameras observing the point.
    pub fn point_cameras(&self, point: usize) -> &BTreeSet<usize> {
        &self.point_cameras[point]
    }

    /// Block row of a free camera in the reduced system.
    pub fn camera_row(&self, camera: usize) -> Option<usize> {
        self.camera_rows[camera]
    }

    /// Block row of the camera that took the measurement, `None` if it is fixed.
    pub fn camera_row_of_measurement(&self, measurement: usize) -> Option<usize> {
        self.measurement_rows[measurement]
    }

    /// Free cameras in row order.
    pub fn free_cameras(&self) -> &[usize] {
        &self.free_cameras
    }

    pub fn num_rows(&self) -> usize {
        self.free_cameras.len()
    }

    pub fn elimination_script(&self, point: usize) -> &[CouplingEntry] {
        &self.elimination_scripts[point]
    }

    /// Upper-triangular (j < k) off-diagonal block keys of the reduced system.
    pub fn off_diagonal_blocks(&self) -> &BTreeSet<(usize, usize)> {
        &self.off_diagonal_blocks
    }
}
