//! Pre-flight validation of a transition state search.
//!
//! This module checks a configuration and the selected electronic structure
//! programs before any job is started, so that problems surface with a clear
//! message instead of as a string of failed jobs.
//!
//! # Features
//!
//! - Parameter range checks for search and TS guess settings
//! - Executable availability for the low- and high-level programs
//! - Solvent support of both programs
//! - A logged summary of the setup

use crate::config::{Config, MethodLevel};
use crate::qm_interface::QMInterface;
use log::info;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error with user guidance.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Error category for programmatic handling
    pub category: ErrorCategory,
    /// Human-readable error message
    pub message: String,
    /// Optional suggestion for fixing the issue
    pub suggestion: Option<String>,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    /// A parameter is outside its valid range
    InvalidConfiguration,
    /// An executable could not be found
    MissingDependencies,
    /// The selected program does not support a requested feature
    UnsupportedFeature,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\nSuggestion: {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn invalid(message: String, suggestion: &str) -> ValidationError {
    ValidationError {
        category: ErrorCategory::InvalidConfiguration,
        message,
        suggestion: Some(suggestion.to_string()),
    }
}

/// Validates the configuration, the programs and the solvent of a search.
pub fn validate_setup(
    config: &Config,
    low: &dyn QMInterface,
    high: &dyn QMInterface,
    solvent: Option<&str>,
) -> ValidationResult<()> {
    validate_parameters(config)?;
    for (level, engine) in [(MethodLevel::Low, low), (MethodLevel::High, high)] {
        validate_engine(level, engine)?;
        if let Some(solvent) = solvent {
            validate_solvent(engine, solvent)?;
        }
    }
    Ok(())
}

/// Checks numeric parameters for values that cannot work.
pub fn validate_parameters(config: &Config) -> ValidationResult<()> {
    if config.n_cores == 0 || config.max_workers == 0 {
        return Err(invalid(
            format!(
                "n_cores ({}) and max_workers ({}) must be at least 1",
                config.n_cores, config.max_workers
            ),
            "Set n_cores and max_workers to positive integers",
        ));
    }

    let search = &config.search;
    if search.max_bond_changes == 0 {
        return Err(invalid(
            "max_bond_changes must be at least 1".to_string(),
            "Use 2 for simple reactions or 4 (default) for concerted ones",
        ));
    }
    if search.bond_tolerance <= 1.0 {
        return Err(invalid(
            format!("bond_tolerance must be greater than 1.0, got {}", search.bond_tolerance),
            "The default of 1.25 detects normal covalent bonds",
        ));
    }
    if search.fragment_separation <= 0.0 {
        return Err(invalid(
            format!("fragment_separation must be positive, got {}", search.fragment_separation),
            "Use a gap of about 2 Angstrom between fragments",
        ));
    }

    let ts = &config.ts_guess;
    if ts.scan_steps < 3 || ts.opt_level_scan_steps < 3 || ts.scan_2d_steps < 3 {
        return Err(invalid(
            format!(
                "scans need at least 3 points (scan_steps {}, opt_level_scan_steps {}, scan_2d_steps {})",
                ts.scan_steps, ts.opt_level_scan_steps, ts.scan_2d_steps
            ),
            "An energy maximum can only be found between two other points",
        ));
    }
    if ts.ts_bond_scale <= 1.0 || ts.breaking_bond_scale <= 1.0 {
        return Err(invalid(
            format!(
                "ts_bond_scale ({}) and breaking_bond_scale ({}) must exceed 1.0",
                ts.ts_bond_scale, ts.breaking_bond_scale
            ),
            "Active bonds of a TS are longer than equilibrium bonds",
        ));
    }
    if ts.min_imag_freq < 0.0 {
        return Err(invalid(
            format!("min_imag_freq must not be negative, got {}", ts.min_imag_freq),
            "Give the threshold as a magnitude in cm^-1, e.g. 50",
        ));
    }
    Ok(())
}

/// Checks that the program of a method level can be executed.
pub fn validate_engine(level: MethodLevel, engine: &dyn QMInterface) -> ValidationResult<()> {
    if engine.is_available() {
        return Ok(());
    }
    let section = match level {
        MethodLevel::Low => "low_level",
        MethodLevel::High => "high_level",
    };
    Err(ValidationError {
        category: ErrorCategory::MissingDependencies,
        message: format!("{:?} level program {} is not available", level, engine.program()),
        suggestion: Some(format!(
            "Put the {} executable on PATH or set 'path' in the [{}] section of tsfinder.cfg",
            engine.program(),
            section
        )),
    })
}

/// Checks that `engine` has an implicit solvent model for `solvent`.
pub fn validate_solvent(engine: &dyn QMInterface, solvent: &str) -> ValidationResult<()> {
    let supported = engine.available_solvents();
    if supported.iter().any(|s| s.eq_ignore_ascii_case(solvent)) {
        return Ok(());
    }
    Err(ValidationError {
        category: ErrorCategory::UnsupportedFeature,
        message: format!("{} has no solvent model for '{}'", engine.program(), solvent),
        suggestion: Some(format!("Available solvents include: {}", preview(supported))),
    })
}

fn preview(names: &[&str]) -> String {
    const SHOWN: usize = 8;
    let mut text = names.iter().take(SHOWN).copied().collect::<Vec<_>>().join(", ");
    if names.len() > SHOWN {
        text.push_str(&format!(" and {} more", names.len() - SHOWN));
    }
    text
}

/// Logs the main settings of a search.
pub fn log_setup_summary(config: &Config) {
    info!("****Search Setup****");
    info!(
        "Low level:  {} ({} cores, {} MB/core)",
        config.low_level.program, config.n_cores, config.max_core_mb
    );
    info!("High level: {}", config.high_level.program);
    info!(
        "Rearrangements with up to {} bond changes, {} concurrent pipeline(s)",
        config.search.max_bond_changes, config.max_workers
    );
    info!(
        "Scans: {} points (1D), {}x{} (2D); TS templates in {}",
        config.ts_guess.scan_steps,
        config.ts_guess.scan_2d_steps,
        config.ts_guess.scan_2d_steps,
        config.ts_guess.template_dir.display()
    );
    if let Some(timeout) = config.job_timeout() {
        info!("Job timeout: {} s", timeout.as_secs());
    }
    info!("Work directory: {}", config.work_dir.display());
}
