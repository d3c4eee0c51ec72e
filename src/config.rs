//! Configuration structures for transition state searches.
//!
//! This module defines every tunable of a run:
//!
//! - [`Config`]: Main configuration structure with all parameters
//! - [`QMProgram`]: Supported electronic structure programs
//! - [`MethodSettings`]: Program, executable path and keyword sets of one method level
//! - [`KeywordSets`]: Keyword lists for each calculation kind
//! - [`SearchSettings`]: Graph and rearrangement search parameters
//! - [`TsGuessSettings`]: TS guess generation and validation parameters
//! - [`LoggingSettings`]: Log level and log file switch
//!
//! Defaults come from [`Config::default`]. They are overridden by the INI
//! files handled in [`settings`](crate::settings) and finally by keys in the
//! reaction input file (see [`parser`](crate::parser)).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Supported electronic structure programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QMProgram {
    /// NWChem
    NWChem,
    /// ORCA
    Orca,
    /// xtb semi-empirical tight binding
    Xtb,
}

impl QMProgram {
    /// Parses a program name case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "nwchem" => Some(QMProgram::NWChem),
            "orca" => Some(QMProgram::Orca),
            "xtb" => Some(QMProgram::Xtb),
            _ => None,
        }
    }

    /// Lowercase program name, used in file names.
    pub fn name(&self) -> &'static str {
        match self {
            QMProgram::NWChem => "nwchem",
            QMProgram::Orca => "orca",
            QMProgram::Xtb => "xtb",
        }
    }

    /// Executable looked up on `PATH` when no explicit path is configured.
    pub fn default_executable(&self) -> &'static str {
        match self {
            QMProgram::NWChem => "nwchem",
            QMProgram::Orca => "orca",
            QMProgram::Xtb => "xtb",
        }
    }
}

impl fmt::Display for QMProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of calculation, selecting one of the [`KeywordSets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeywordKind {
    /// Constrained optimisations along a scan
    Scan,
    /// Geometry optimisation
    Opt,
    /// Transition state optimisation with a final frequency calculation
    OptTs,
    /// Hessian / frequency calculation
    Hess,
    /// Single point energy
    SinglePoint,
}

impl fmt::Display for KeywordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeywordKind::Scan => "scan",
            KeywordKind::Opt => "opt",
            KeywordKind::OptTs => "opt_ts",
            KeywordKind::Hess => "hess",
            KeywordKind::SinglePoint => "sp",
        };
        f.write_str(name)
    }
}

/// Keyword lists for each calculation kind of one method level.
///
/// The meaning of a keyword is program specific: NWChem keywords are whole
/// input blocks, ORCA keywords go on the `!` line and xtb keywords are
/// command line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordSets {
    pub scan: Vec<String>,
    pub opt: Vec<String>,
    pub opt_ts: Vec<String>,
    pub hess: Vec<String>,
    pub sp: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl KeywordSets {
    pub fn get(&self, kind: KeywordKind) -> &[String] {
        match kind {
            KeywordKind::Scan => &self.scan,
            KeywordKind::Opt => &self.opt,
            KeywordKind::OptTs => &self.opt_ts,
            KeywordKind::Hess => &self.hess,
            KeywordKind::SinglePoint => &self.sp,
        }
    }

    /// Default keywords for a program.
    pub fn defaults_for(program: QMProgram) -> Self {
        match program {
            QMProgram::NWChem => Self::nwchem_defaults(),
            QMProgram::Orca => Self::orca_defaults(),
            QMProgram::Xtb => Self::xtb_defaults(),
        }
    }

    fn nwchem_defaults() -> Self {
        let opt_driver = "driver\n  gmax 0.002\n  grms 0.0005\n  xmax 0.01\n  xrms 0.007\n  eprint\nend";
        let ts_driver =
            "driver\n  maxiter 100\n  gmax 0.0003\n  grms 0.0001\n  xmax 0.004\n  xrms 0.002\n  eprint\nend";
        let svp = "basis\n  *   library Def2-SVP\nend";
        let tzvp = "basis\n  *   library Def2-TZVP\nend";
        let pbe = "dft\n  xc xpbe96 cpbe96\nend";
        let pbe0 = "dft\n  maxiter 100\n  xc pbe0\nend";

        Self {
            scan: strings(&[opt_driver, svp, pbe, "task dft optimize"]),
            opt: strings(&[opt_driver, svp, pbe0, "task dft optimize"]),
            opt_ts: strings(&[ts_driver, svp, pbe0, "task dft saddle", "task dft freq"]),
            hess: strings(&[svp, pbe0, "task dft freq"]),
            sp: strings(&[tzvp, pbe0, "task dft energy"]),
        }
    }

    fn orca_defaults() -> Self {
        Self {
            scan: strings(&["Opt", "PBE", "RI", "D3BJ", "def2-SVP", "def2/J"]),
            opt: strings(&["Opt", "PBE0", "RIJCOSX", "D3BJ", "def2-SVP", "def2/J"]),
            opt_ts: strings(&["OptTS", "Freq", "PBE0", "RIJCOSX", "D3BJ", "def2-SVP", "def2/J"]),
            hess: strings(&["Freq", "PBE0", "RIJCOSX", "D3BJ", "def2-SVP", "def2/J"]),
            sp: strings(&["SP", "PBE0", "RIJCOSX", "D3BJ", "def2-TZVP", "def2/J"]),
        }
    }

    fn xtb_defaults() -> Self {
        Self {
            scan: strings(&["--opt"]),
            opt: strings(&["--opt"]),
            opt_ts: strings(&["--ohess"]),
            hess: strings(&["--hess"]),
            sp: Vec::new(),
        }
    }
}

/// Program, executable and keywords of one method level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSettings {
    pub program: QMProgram,
    /// Explicit executable path; `None` searches `PATH`
    pub path: Option<PathBuf>,
    pub keywords: KeywordSets,
}

impl MethodSettings {
    /// Settings for `program` with its default keywords.
    pub fn for_program(program: QMProgram) -> Self {
        Self {
            program,
            path: None,
            keywords: KeywordSets::defaults_for(program),
        }
    }

    /// Switches program, resetting keywords to the new program's defaults.
    pub fn set_program(&mut self, program: QMProgram) {
        if program != self.program {
            *self = Self::for_program(program);
        }
    }
}

/// Which method level a calculation runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodLevel {
    Low,
    High,
}

impl MethodLevel {
    /// Two-letter tag used in job names.
    pub fn tag(&self) -> &'static str {
        match self {
            MethodLevel::Low => "ll",
            MethodLevel::High => "hl",
        }
    }
}

/// Graph construction and rearrangement search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Multiplier on covalent radius sums / average bond lengths for bond detection
    pub bond_tolerance: f64,
    /// Maximum number of forming plus breaking bonds considered
    pub max_bond_changes: usize,
    /// Cap on enumerated graph automorphisms
    pub max_automorphisms: usize,
    /// Gap between fragments when assembling a complex (Angstrom)
    pub fragment_separation: f64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            bond_tolerance: 1.25,
            max_bond_changes: 4,
            max_automorphisms: 1000,
            fragment_separation: 2.0,
        }
    }
}

/// TS guess generation and validation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsGuessSettings {
    /// Forming bond target as a multiple of the average bond length
    pub ts_bond_scale: f64,
    /// Breaking bond scan end point as a multiple of the average bond length
    pub breaking_bond_scale: f64,
    /// Points per dimension of 1D scans
    pub scan_steps: usize,
    /// Points of the final high-level 1D scan using optimisation keywords
    pub opt_level_scan_steps: usize,
    /// Points per dimension of 2D scans
    pub scan_2d_steps: usize,
    /// Smallest |frequency| in cm^-1 counted as an imaginary mode
    pub min_imag_freq: f64,
    /// Directory of the TS template library
    pub template_dir: PathBuf,
    /// Save validated transition states as new templates
    pub save_templates: bool,
}

impl Default for TsGuessSettings {
    fn default() -> Self {
        Self {
            ts_bond_scale: 1.3,
            breaking_bond_scale: 2.0,
            scan_steps: 20,
            opt_level_scan_steps: 10,
            scan_2d_steps: 8,
            min_imag_freq: 50.0,
            template_dir: default_template_dir(),
            save_templates: true,
        }
    }
}

fn default_template_dir() -> PathBuf {
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".config/tsfinder/templates"))
        .unwrap_or_else(|_| PathBuf::from("templates"))
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// One of `error`, `warn`, `info`, `debug`, `trace`, `off`
    pub level: String,
    /// Also write the log to `tsfinder_<reaction>.log`
    pub file_logging: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: false,
        }
    }
}

/// Main configuration of a transition state search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Method used for scans and constrained optimisations
    pub low_level: MethodSettings,
    /// Method used for the final scans, Hessians and TS optimisations
    pub high_level: MethodSettings,
    /// Cores given to each electronic structure job
    pub n_cores: usize,
    /// Memory per core in MB
    pub max_core_mb: usize,
    /// Rearrangements searched concurrently
    pub max_workers: usize,
    /// Wall-clock limit of a single job in seconds, 0 disables
    pub job_timeout_secs: u64,
    /// Root directory for per-job working directories
    pub work_dir: PathBuf,
    /// Keep every file produced by external programs
    pub keep_files: bool,
    /// File extensions never removed by cleanup
    pub preserve_extensions: Vec<String>,
    pub search: SearchSettings,
    pub ts_guess: TsGuessSettings,
    pub logging: LoggingSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            low_level: MethodSettings::for_program(QMProgram::Xtb),
            high_level: MethodSettings::for_program(QMProgram::Orca),
            n_cores: 4,
            max_core_mb: 4000,
            max_workers: 1,
            job_timeout_secs: 0,
            work_dir: PathBuf::from("tsfinder_jobs"),
            keep_files: false,
            preserve_extensions: Vec::new(),
            search: SearchSettings::default(),
            ts_guess: TsGuessSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Config {
    /// Method settings of a level.
    pub fn method(&self, level: MethodLevel) -> &MethodSettings {
        match level {
            MethodLevel::Low => &self.low_level,
            MethodLevel::High => &self.high_level,
        }
    }

    /// Keywords of a level and calculation kind.
    pub fn keywords(&self, level: MethodLevel, kind: KeywordKind) -> &[String] {
        self.method(level).keywords.get(kind)
    }

    /// Job timeout, `None` when disabled.
    pub fn job_timeout(&self) -> Option<std::time::Duration> {
        (self.job_timeout_secs > 0).then(|| std::time::Duration::from_secs(self.job_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_names() {
        assert_eq!(QMProgram::from_name("NWChem"), Some(QMProgram::NWChem));
        assert_eq!(QMProgram::from_name(" orca "), Some(QMProgram::Orca));
        assert_eq!(QMProgram::from_name("gaussian"), None);
        assert_eq!(QMProgram::Xtb.to_string(), "xtb");
    }

    #[test]
    fn test_set_program_resets_keywords() {
        let mut method = MethodSettings::for_program(QMProgram::Orca);
        method.set_program(QMProgram::NWChem);
        assert_eq!(method.program, QMProgram::NWChem);
        assert!(method.keywords.opt_ts.iter().any(|k| k == "task dft saddle"));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.low_level.program, QMProgram::Xtb);
        assert_eq!(config.high_level.program, QMProgram::Orca);
        assert_eq!(config.search.max_bond_changes, 4);
        assert_eq!(config.ts_guess.scan_steps, 20);
        assert!(config.job_timeout().is_none());
        assert_eq!(
            config.keywords(MethodLevel::High, KeywordKind::OptTs)[0],
            "OptTS"
        );
    }
}
