//! Single electronic structure jobs.
//!
//! A [`Calculation`] bundles everything one external program run needs:
//! geometry, charge, spin multiplicity, solvent, keywords, constraints and
//! resources. [`Calculation::run`] executes it through a
//! [`QMInterface`] inside its own working directory
//! `<work_dir>/<job-name>/` and returns a [`CalcResult`] with every quantity
//! that could be parsed from the output.
//!
//! # Job lifecycle
//!
//! 1. If the job directory already holds an output that terminated
//!    normally, it is parsed instead of running the job again.
//! 2. Otherwise the input file is written and the program is run with the
//!    configured wall-clock limit.
//! 3. The output is parsed; the final geometry, when present, is dumped as
//!    `<job-name>_<program>.xyz` next to the output.
//! 4. Scratch files are removed unless `keep_files` is set.
//!
//! Failed jobs (crash, timeout, abnormal termination) are reported to the
//! caller and never retried.

use crate::cleanup::{CleanupConfig, CleanupManager};
use crate::config::Config;
use crate::constraints::{constraints_met, DistanceConstraints};
use crate::geometry::Geometry;
use crate::io;
use crate::naming::job_dir;
use crate::qm_interface::{QMError, QMInterface};
use log::{debug, info, warn};
use std::fs;

/// Distance tolerance (Angstrom) below which constraints count as satisfied.
const CONSTRAINT_TOLERANCE: f64 = 0.05;

/// One external electronic structure job.
#[derive(Debug, Clone)]
pub struct Calculation {
    /// Unique job name; also the name of the job directory
    pub name: String,
    pub geometry: Geometry,
    pub charge: i32,
    pub mult: u32,
    pub solvent: Option<String>,
    pub keywords: Vec<String>,
    pub n_cores: usize,
    pub max_core_mb: usize,
    /// Atom pairs held at fixed distances (Angstrom)
    pub distance_constraints: DistanceConstraints,
    /// Atoms frozen in Cartesian space
    pub cartesian_constraints: Vec<usize>,
    /// Bonds the program should add to its internal coordinates
    pub bond_ids_to_add: Vec<(usize, usize)>,
}

impl Calculation {
    pub fn new(
        name: &str,
        geometry: Geometry,
        charge: i32,
        mult: u32,
        keywords: Vec<String>,
        config: &Config,
    ) -> Self {
        Self {
            name: name.to_string(),
            geometry,
            charge,
            mult,
            solvent: None,
            keywords,
            n_cores: config.n_cores,
            max_core_mb: config.max_core_mb,
            distance_constraints: DistanceConstraints::new(),
            cartesian_constraints: Vec::new(),
            bond_ids_to_add: Vec::new(),
        }
    }

    pub fn with_solvent(mut self, solvent: Option<String>) -> Self {
        self.solvent = solvent;
        self
    }

    pub fn with_distance_constraints(mut self, constraints: DistanceConstraints) -> Self {
        self.distance_constraints = constraints;
        self
    }

    pub fn with_bonds_to_add(mut self, bonds: Vec<(usize, usize)>) -> Self {
        self.bond_ids_to_add = bonds;
        self
    }

    pub fn n_atoms(&self) -> usize {
        self.geometry.num_atoms
    }

    /// True when the starting geometry already satisfies every distance
    /// constraint.
    pub fn constraints_already_met(&self) -> bool {
        constraints_met(&self.geometry.coords, &self.distance_constraints, CONSTRAINT_TOLERANCE)
    }

    /// Runs the job and parses its output.
    ///
    /// Returns an error only when the job could not be run at all (I/O
    /// failure, timeout, program not started). A job that ran but failed is
    /// returned as a [`CalcResult`] with `terminated_normally == false`.
    pub fn run(&self, engine: &dyn QMInterface, config: &Config) -> Result<CalcResult, QMError> {
        let dir = job_dir(&config.work_dir, &self.name);
        fs::create_dir_all(&dir)?;
        let input_path = dir.join(engine.input_filename(&self.name));
        let output_path = dir.join(engine.output_filename(&self.name));

        if let Ok(existing) = fs::read_to_string(&output_path) {
            if engine.terminated_normally(&existing) {
                info!("Found completed output for {}, skipping calculation", self.name);
                return Ok(CalcResult::from_output(engine, &self.name, &existing, self.n_atoms()));
            }
        }

        engine.write_input(self, &input_path)?;
        debug!("Running {} with {}", self.name, engine.program());
        engine.run_calculation(self, &input_path, &output_path, config.job_timeout())?;

        let output = fs::read_to_string(&output_path)?;
        let result = CalcResult::from_output(engine, &self.name, &output, self.n_atoms());
        if !result.terminated_normally {
            warn!("Calculation {} did not terminate normally", self.name);
        }

        if let Some(geometry) = &result.final_geometry {
            let xyz = dir.join(format!("{}_{}.xyz", self.name, engine.program()));
            io::write_xyz(geometry, &xyz, &self.name)?;
        }

        let cleanup = CleanupManager::new(CleanupConfig::from_config(config), engine.program());
        if let Err(e) = cleanup.cleanup_directory(&dir) {
            warn!("Cleanup of {} failed: {}", dir.display(), e);
        }
        Ok(result)
    }
}

/// Quantities parsed from the output of one job.
#[derive(Debug, Clone)]
pub struct CalcResult {
    pub name: String,
    pub terminated_normally: bool,
    /// Final energy in Hartree
    pub energy: Option<f64>,
    pub converged: bool,
    pub nearly_converged: bool,
    /// Imaginary frequencies in cm^-1 (negative numbers)
    pub imag_freqs: Vec<f64>,
    /// Displacements of the lowest vibrational mode
    pub imag_mode: Option<Vec<[f64; 3]>>,
    pub final_geometry: Option<Geometry>,
}

impl CalcResult {
    pub fn from_output(engine: &dyn QMInterface, name: &str, output: &str, n_atoms: usize) -> Self {
        let imag_freqs = engine.get_imag_freqs(output);
        let imag_mode = if imag_freqs.is_empty() {
            None
        } else {
            engine.get_normal_mode_displacements(output, 6, n_atoms)
        };
        Self {
            name: name.to_string(),
            terminated_normally: engine.terminated_normally(output),
            energy: engine.get_energy(output),
            converged: engine.optimisation_converged(output),
            nearly_converged: engine.optimisation_nearly_converged(output),
            imag_freqs,
            imag_mode,
            final_geometry: engine.get_final_geometry(output, n_atoms),
        }
    }

    /// Final geometry and energy, when the job finished with both.
    pub fn geometry_and_energy(&self) -> Option<(Geometry, f64)> {
        if !self.terminated_normally {
            return None;
        }
        Some((self.final_geometry.clone()?, self.energy?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h2() -> Geometry {
        Geometry::from_atoms(&[("H", 0.0, 0.0, 0.0), ("H", 0.7, 0.0, 0.0)])
    }

    #[test]
    fn test_new_takes_resources_from_config() {
        let mut config = Config::default();
        config.n_cores = 8;
        config.max_core_mb = 1000;
        let calc = Calculation::new("h2_opt", h2(), 0, 1, vec!["--opt".to_string()], &config)
            .with_solvent(Some("water".to_string()));
        assert_eq!(calc.n_cores, 8);
        assert_eq!(calc.max_core_mb, 1000);
        assert_eq!(calc.n_atoms(), 2);
        assert_eq!(calc.solvent.as_deref(), Some("water"));
    }

    #[test]
    fn test_constraints_already_met() {
        let config = Config::default();
        let mut constraints = DistanceConstraints::new();
        constraints.insert((0, 1), 0.72);
        let calc = Calculation::new("h2", h2(), 0, 1, Vec::new(), &config)
            .with_distance_constraints(constraints.clone());
        assert!(calc.constraints_already_met());

        constraints.insert((0, 1), 1.5);
        let calc = calc.with_distance_constraints(constraints);
        assert!(!calc.constraints_already_met());
    }
}
