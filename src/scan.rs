//! Relaxed scans along bond distances.
//!
//! A relaxed scan holds one or two interatomic distances at a sequence of
//! values and optimises every other degree of freedom at each point. The
//! energy profile of the scan locates an approximate transition state.
//!
//! # 1D scans
//!
//! The distance is stepped linearly from its current value to the end
//! point. Each constrained optimisation starts from the optimised geometry
//! of the previous point, so the scan follows a continuous path:
//!
//! ```text
//! minimize E(x) subject to r_ij(x) = r_k,  k = 0..n-1
//! ```
//!
//! The highest-energy *interior* point is the guess ([`find_1d_maximum`]).
//! A maximum at either end means the scan did not cross a barrier.
//!
//! # 2D scans
//!
//! Two distances are stepped on an `n x n` grid. Row `i` starts from the
//! first point of row `i - 1`, and every other point from its left
//! neighbour. The guess is the highest point on the lowest-barrier monotone
//! path from the grid origin to the far corner ([`find_2d_saddle`]), found
//! by dynamic programming over
//!
//! ```text
//! B(i, j) = max(E(i, j), min(B(i - 1, j), B(i, j - 1)))
//! ```
//!
//! Points whose optimisation failed count as infinitely high.

use crate::calculation::Calculation;
use crate::complex::ReactionComplex;
use crate::config::Config;
use crate::constraints::DistanceConstraints;
use crate::geometry::Geometry;
use crate::naming::JobNaming;
use crate::qm_interface::QMInterface;
use log::{debug, warn};

/// One optimised point of a relaxed scan.
#[derive(Debug, Clone)]
pub struct ScanPoint {
    /// Constrained distances of this point (Angstrom)
    pub distances: Vec<f64>,
    pub energy: Option<f64>,
    pub geometry: Option<Geometry>,
}

/// Everything needed to run constrained optimisations on a complex.
pub struct JobContext<'a> {
    pub engine: &'a dyn QMInterface,
    pub config: &'a Config,
    pub complex: &'a ReactionComplex,
    pub keywords: &'a [String],
    /// Forming bonds the program should include in its internal coordinates
    pub bonds_to_add: Vec<(usize, usize)>,
}

impl JobContext<'_> {
    /// Optimises `geometry` with `constraints` held fixed.
    ///
    /// Returns the optimised geometry and its energy, or `None` when the job
    /// failed. Failures are logged, never propagated.
    pub fn constrained_opt(
        &self,
        geometry: &Geometry,
        constraints: DistanceConstraints,
        name: &str,
    ) -> Option<(Geometry, f64)> {
        let calc = Calculation::new(
            name,
            geometry.clone(),
            self.complex.charge,
            self.complex.mult,
            self.keywords.to_vec(),
            self.config,
        )
        .with_solvent(self.complex.solvent.clone())
        .with_distance_constraints(constraints)
        .with_bonds_to_add(self.bonds_to_add.clone());

        match calc.run(self.engine, self.config) {
            Ok(result) => {
                let outcome = result.geometry_and_energy();
                if outcome.is_none() {
                    warn!("Constrained optimisation {} gave no geometry or energy", name);
                }
                outcome
            }
            Err(e) => {
                warn!("Constrained optimisation {} failed: {}", name, e);
                None
            }
        }
    }
}

/// `n` evenly spaced values from `start` to `end`, both included.
pub fn scan_targets(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![end],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|k| start + step * k as f64).collect()
        }
    }
}

/// Relaxed scan of one distance from its value in `start` to `end_distance`.
pub fn relaxed_scan_1d(
    ctx: &JobContext,
    start: &Geometry,
    bond: (usize, usize),
    end_distance: f64,
    n_steps: usize,
    job: &str,
) -> Vec<ScanPoint> {
    let naming = JobNaming::new(job);
    let (i, j) = bond;
    let mut current = start.clone();
    let mut points = Vec::with_capacity(n_steps);

    for (step, target) in scan_targets(start.distance(i, j), end_distance, n_steps)
        .into_iter()
        .enumerate()
    {
        let constraints = DistanceConstraints::from([(bond, target)]);
        let outcome = ctx.constrained_opt(&current, constraints, &naming.scan_point(job, step));
        debug!(
            "Scan {} point {}: r({}-{}) = {:.3}, E = {:?}",
            job,
            step,
            i,
            j,
            target,
            outcome.as_ref().map(|(_, e)| *e)
        );
        let (geometry, energy) = match outcome {
            Some((geometry, energy)) => {
                current = geometry.clone();
                (Some(geometry), Some(energy))
            }
            None => (None, None),
        };
        points.push(ScanPoint {
            distances: vec![target],
            energy,
            geometry,
        });
    }
    points
}

/// Relaxed scan of two distances on an `n_steps x n_steps` grid.
///
/// The result is indexed `[i][j]` with `i` stepping `bonds.0` and `j`
/// stepping `bonds.1`.
pub fn relaxed_scan_2d(
    ctx: &JobContext,
    start: &Geometry,
    bonds: ((usize, usize), (usize, usize)),
    end_distances: (f64, f64),
    n_steps: usize,
    job: &str,
) -> Vec<Vec<ScanPoint>> {
    let naming = JobNaming::new(job);
    let (a, b) = bonds;
    let targets_a = scan_targets(start.distance(a.0, a.1), end_distances.0, n_steps);
    let targets_b = scan_targets(start.distance(b.0, b.1), end_distances.1, n_steps);

    let mut row_start = start.clone();
    let mut grid = Vec::with_capacity(n_steps);
    for (i, &ra) in targets_a.iter().enumerate() {
        let mut current = row_start.clone();
        let mut row = Vec::with_capacity(n_steps);
        for (j, &rb) in targets_b.iter().enumerate() {
            let constraints = DistanceConstraints::from([(a, ra), (b, rb)]);
            let outcome = ctx.constrained_opt(&current, constraints, &naming.scan_point_2d(job, i, j));
            let (geometry, energy) = match outcome {
                Some((geometry, energy)) => {
                    current = geometry.clone();
                    if j == 0 {
                        row_start = geometry.clone();
                    }
                    (Some(geometry), Some(energy))
                }
                None => (None, None),
            };
            row.push(ScanPoint {
                distances: vec![ra, rb],
                energy,
                geometry,
            });
        }
        grid.push(row);
    }
    grid
}

/// Index of the highest interior point of a 1D energy profile.
///
/// Returns `None` with fewer than three successful points or when the
/// highest point is the first or last successful one.
pub fn find_1d_maximum(points: &[ScanPoint]) -> Option<usize> {
    let valid: Vec<(usize, f64)> = points
        .iter()
        .enumerate()
        .filter_map(|(k, p)| p.energy.map(|e| (k, e)))
        .collect();
    if valid.len() < 3 {
        return None;
    }
    let (pos, &(index, _)) = valid
        .iter()
        .enumerate()
        .max_by(|(_, x), (_, y)| x.1.total_cmp(&y.1))?;
    if pos == 0 || pos == valid.len() - 1 {
        return None;
    }
    Some(index)
}

/// Highest point of the lowest-barrier monotone path across a 2D grid.
///
/// `energies[i][j]` is `None` where the optimisation failed. Returns `None`
/// when no finite path exists or the barrier sits at the start or end
/// corner.
pub fn find_2d_saddle(energies: &[Vec<Option<f64>>]) -> Option<(usize, usize)> {
    let n = energies.len();
    let m = energies.first()?.len();
    if m == 0 || energies.iter().any(|row| row.len() != m) {
        return None;
    }
    let energy = |i: usize, j: usize| energies[i][j].unwrap_or(f64::INFINITY);

    // barrier[i][j]: lowest achievable path maximum from (0, 0) to (i, j)
    let mut barrier = vec![vec![f64::INFINITY; m]; n];
    let mut from = vec![vec![None; m]; n];
    for i in 0..n {
        for j in 0..m {
            let best_prev = match (i, j) {
                (0, 0) => None,
                (0, _) => Some((0, j - 1)),
                (_, 0) => Some((i - 1, 0)),
                _ => {
                    if barrier[i - 1][j] <= barrier[i][j - 1] {
                        Some((i - 1, j))
                    } else {
                        Some((i, j - 1))
                    }
                }
            };
            barrier[i][j] = match best_prev {
                None => energy(i, j),
                Some((pi, pj)) => energy(i, j).max(barrier[pi][pj]),
            };
            from[i][j] = best_prev;
        }
    }
    if !barrier[n - 1][m - 1].is_finite() {
        return None;
    }

    let mut path = vec![(n - 1, m - 1)];
    while let Some(prev) = from[path[path.len() - 1].0][path[path.len() - 1].1] {
        path.push(prev);
    }
    let &(si, sj) = path
        .iter()
        .max_by(|&&(ai, aj), &&(bi, bj)| energy(ai, aj).total_cmp(&energy(bi, bj)))?;

    if (si, sj) == (0, 0) || (si, sj) == (n - 1, m - 1) {
        return None;
    }
    Some((si, sj))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(energies: &[Option<f64>]) -> Vec<ScanPoint> {
        energies
            .iter()
            .map(|&energy| ScanPoint {
                distances: vec![0.0],
                energy,
                geometry: None,
            })
            .collect()
    }

    #[test]
    fn test_scan_targets_include_end_points() {
        let targets = scan_targets(1.0, 2.0, 5);
        assert_eq!(targets.len(), 5);
        assert!((targets[0] - 1.0).abs() < 1e-12);
        assert!((targets[2] - 1.5).abs() < 1e-12);
        assert!((targets[4] - 2.0).abs() < 1e-12);
        assert_eq!(scan_targets(1.0, 2.0, 1), vec![2.0]);
    }

    #[test]
    fn test_1d_maximum_must_be_interior() {
        assert_eq!(
            find_1d_maximum(&profile(&[Some(-1.0), Some(-0.5), Some(-0.8)])),
            Some(1)
        );
        assert_eq!(
            find_1d_maximum(&profile(&[Some(-1.0), Some(-0.9), Some(-0.5)])),
            None
        );
        // failed points are skipped, not treated as low
        assert_eq!(
            find_1d_maximum(&profile(&[Some(-1.0), None, Some(-0.7), Some(-0.9)])),
            Some(2)
        );
        assert_eq!(find_1d_maximum(&profile(&[Some(-1.0), Some(-0.5)])), None);
    }

    #[test]
    fn test_2d_saddle_on_lowest_barrier_path() {
        // high walls with a low pass at (1, 2)
        let e = |v: f64| Some(v);
        let grid = vec![
            vec![e(0.0), e(1.0), e(8.0), e(8.0)],
            vec![e(1.0), e(1.5), e(2.0), e(8.0)],
            vec![e(8.0), e(8.0), e(1.0), e(0.5)],
            vec![e(8.0), e(8.0), e(0.8), e(-1.0)],
        ];
        assert_eq!(find_2d_saddle(&grid), Some((1, 2)));
    }

    #[test]
    fn test_2d_saddle_rejects_corners_and_blocked_grids() {
        let downhill = vec![
            vec![Some(0.0), Some(-1.0)],
            vec![Some(-1.0), Some(-2.0)],
        ];
        assert_eq!(find_2d_saddle(&downhill), None);

        let blocked = vec![
            vec![Some(0.0), None],
            vec![None, Some(-2.0)],
        ];
        assert_eq!(find_2d_saddle(&blocked), None);
    }
}
