//! Job and file naming derived from the reaction name.
//!
//! Every electronic structure job gets a unique name built from the reaction
//! name, the active bonds and a strategy suffix. Jobs for different bond
//! rearrangements therefore never share files or directories, which lets
//! rearrangements be searched concurrently.
//!
//! # Example
//!
//! ```
//! use tsfinder::naming::JobNaming;
//!
//! let naming = JobNaming::new("H2--H+H");
//! assert_eq!(naming.strategy_job(&[(0, 1)], "ll1d"), "H2--H+H_0-1_ll1d");
//! assert_eq!(naming.scan_point("H2--H+H_0-1_ll1d", 3), "H2--H+H_0-1_ll1d_3");
//! assert_eq!(naming.summary_file(), "H2--H+H_tss.json");
//! ```

use std::path::{Path, PathBuf};

/// Manages job and file naming for one reaction.
#[derive(Debug, Clone)]
pub struct JobNaming {
    stem: String,
}

impl JobNaming {
    pub fn new(reaction_name: &str) -> Self {
        Self {
            stem: sanitise(reaction_name),
        }
    }

    /// Returns the reaction stem used as prefix for all names
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Bond list label, e.g. `0-1_1-2`.
    pub fn bond_label(bonds: &[(usize, usize)]) -> String {
        bonds
            .iter()
            .map(|(i, j)| format!("{}-{}", i, j))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Name of a TS guess strategy job.
    ///
    /// Format: `{stem}_{bonds}_{suffix}`
    pub fn strategy_job(&self, bonds: &[(usize, usize)], suffix: &str) -> String {
        format!("{}_{}_{}", self.stem, Self::bond_label(bonds), suffix)
    }

    /// Format: `{job}_{step}`
    pub fn scan_point(&self, job: &str, step: usize) -> String {
        format!("{}_{}", job, step)
    }

    /// Format: `{job}_{i}-{j}`
    pub fn scan_point_2d(&self, job: &str, i: usize, j: usize) -> String {
        format!("{}_{}-{}", job, i, j)
    }

    /// Format: `{guess}_hess`
    pub fn hess_job(&self, guess: &str) -> String {
        format!("{}_hess", guess)
    }

    /// Format: `{guess}_optts`
    pub fn optts_job(&self, guess: &str) -> String {
        format!("{}_optts", guess)
    }

    /// Name of the optimisation of a reactant or product molecule.
    ///
    /// Format: `{molecule}_opt`
    pub fn molecule_opt(molecule: &str) -> String {
        format!("{}_opt", sanitise(molecule))
    }

    /// Format: `{molecule}_sp`
    pub fn molecule_sp(molecule: &str) -> String {
        format!("{}_sp", sanitise(molecule))
    }

    /// Format: `{ts}_ts.xyz`
    pub fn ts_xyz(&self, ts_name: &str) -> String {
        format!("{}_ts.xyz", ts_name)
    }

    /// Format: `{stem}_tss.json`
    pub fn summary_file(&self) -> String {
        format!("{}_tss.json", self.stem)
    }

    /// Format: `tsfinder_{stem}.log`
    pub fn log_file(&self) -> String {
        format!("tsfinder_{}.log", self.stem)
    }
}

/// Working directory of a job below the configured work directory.
pub fn job_dir(work_dir: &Path, job: &str) -> PathBuf {
    work_dir.join(job)
}

/// Replaces characters that are awkward in file names.
fn sanitise(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ' ' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_names() {
        let naming = JobNaming::new("H+H2--H2+H");
        assert_eq!(JobNaming::bond_label(&[(0, 1), (1, 2)]), "0-1_1-2");
        assert_eq!(
            naming.strategy_job(&[(0, 1), (1, 2)], "ll2d"),
            "H+H2--H2+H_0-1_1-2_ll2d"
        );
        assert_eq!(naming.scan_point_2d("job", 2, 5), "job_2-5");
        assert_eq!(naming.hess_job("guess"), "guess_hess");
        assert_eq!(naming.optts_job("guess"), "guess_optts");
        assert_eq!(naming.ts_xyz("guess"), "guess_ts.xyz");
        assert_eq!(naming.log_file(), "tsfinder_H+H2--H2+H.log");
    }

    #[test]
    fn test_names_are_sanitised() {
        let naming = JobNaming::new("my reaction/1");
        assert_eq!(naming.stem(), "my_reaction_1");
        assert_eq!(JobNaming::molecule_opt("water dimer"), "water_dimer_opt");
        assert_eq!(job_dir(Path::new("work"), "job"), PathBuf::from("work/job"));
    }
}
