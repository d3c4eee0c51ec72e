//! Configuration management for tsfinder.
//!
//! Program behaviour can be customised through INI-format configuration
//! files, loaded hierarchically with later files overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. System configuration (`/etc/tsfinder/tsfinder.cfg`)
//! 3. User configuration (`~/.config/tsfinder/tsfinder.cfg`)
//! 4. Local configuration (`./tsfinder.cfg`)
//!
//! Only keys present in a file override the values below them, so a local
//! file may change a single parameter.
//!
//! # Configuration File Format
//!
//! ```ini
//! [methods]
//! low_program = xtb
//! high_program = orca
//!
//! [resources]
//! n_cores = 8
//! max_workers = 2
//!
//! [logging]
//! level = debug
//! file_logging = true
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use tsfinder::settings::SettingsManager;
//!
//! let settings = SettingsManager::load()?;
//! println!("Configuration loaded from: {}", settings.config_source());
//! # Ok::<(), tsfinder::settings::ConfigError>(())
//! ```

use crate::config::{Config, QMProgram};
use configparser::ini::Ini;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration loading and processing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error when reading configuration files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// INI parsing error
    #[error("INI parsing error: {0}")]
    IniParse(String),
    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

type Section = HashMap<String, Option<String>>;

const FILE_NAME: &str = "tsfinder.cfg";

/// Configuration manager that loads the layered INI files.
pub struct SettingsManager {
    config: Config,
    config_source: String,
    warnings: Vec<String>,
}

impl SettingsManager {
    /// Loads configuration from the available configuration files.
    ///
    /// A file that exists but cannot be parsed is skipped; the problem is
    /// recorded in [`warnings`](Self::warnings) so it can be reported once
    /// logging is initialised.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        let mut config_source = "built-in defaults".to_string();
        let mut warnings = Vec::new();

        let candidates = [
            ("system", Self::get_system_config_path()),
            ("user", Self::get_user_config_path()),
            ("local", Some(PathBuf::from(FILE_NAME))),
        ];
        for (kind, path) in candidates {
            let Some(path) = path else { continue };
            if !path.exists() {
                continue;
            }
            match Self::apply_file(&mut config, &path) {
                Ok(()) => config_source = format!("{} config ({})", kind, path.display()),
                Err(e) => warnings.push(format!(
                    "Failed to load {} config from {}: {}",
                    kind,
                    path.display(),
                    e
                )),
            }
        }

        Ok(Self {
            config,
            config_source,
            warnings,
        })
    }

    /// Loads defaults overridden by a single explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        Self::apply_file(&mut config, path)?;
        Ok(Self {
            config,
            config_source: format!("config file ({})", path.display()),
            warnings: Vec::new(),
        })
    }

    /// Returns the source of the loaded configuration.
    pub fn config_source(&self) -> &str {
        &self.config_source
    }

    /// Problems met while loading, for deferred logging.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    fn apply_file(config: &mut Config, path: &Path) -> Result<(), ConfigError> {
        let content = fs::read_to_string(path)?;
        apply_ini(config, &content)
    }

    /// Gets the system configuration file path.
    fn get_system_config_path() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            Some(PathBuf::from("/etc/tsfinder").join(FILE_NAME))
        }
        #[cfg(windows)]
        {
            std::env::var("PROGRAMDATA")
                .ok()
                .map(|pd| PathBuf::from(pd).join("tsfinder").join(FILE_NAME))
        }
    }

    /// Gets the user configuration file path.
    fn get_user_config_path() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            std::env::var("HOME").ok().map(|home| {
                PathBuf::from(home)
                    .join(".config")
                    .join("tsfinder")
                    .join(FILE_NAME)
            })
        }
        #[cfg(windows)]
        {
            std::env::var("APPDATA")
                .ok()
                .map(|appdata| PathBuf::from(appdata).join("tsfinder").join(FILE_NAME))
        }
    }
}

fn parse_into<T: FromStr>(section: &Section, key: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Some(Some(raw)) = section.get(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("Invalid {}: {}", key, raw)))?;
    }
    Ok(())
}

fn parse_program(section: &Section, key: &str) -> Result<Option<QMProgram>, ConfigError> {
    match section.get(key) {
        Some(Some(raw)) => QMProgram::from_name(raw)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue(format!("Unknown program for {}: {}", key, raw))),
        _ => Ok(None),
    }
}

/// Applies the keys of an INI document on top of `config`.
pub fn apply_ini(config: &mut Config, content: &str) -> Result<(), ConfigError> {
    let mut ini = Ini::new();
    ini.read(content.to_string())
        .map_err(|e| ConfigError::IniParse(format!("Failed to parse INI: {}", e)))?;
    let map = ini.get_map_ref();

    if let Some(methods) = map.get("methods") {
        if let Some(program) = parse_program(methods, "low_program")? {
            config.low_level.set_program(program);
        }
        if let Some(program) = parse_program(methods, "high_program")? {
            config.high_level.set_program(program);
        }
        if let Some(Some(path)) = methods.get("low_path") {
            config.low_level.path = Some(PathBuf::from(path));
        }
        if let Some(Some(path)) = methods.get("high_path") {
            config.high_level.path = Some(PathBuf::from(path));
        }
    }

    if let Some(resources) = map.get("resources") {
        parse_into(resources, "n_cores", &mut config.n_cores)?;
        parse_into(resources, "max_core_mb", &mut config.max_core_mb)?;
        parse_into(resources, "max_workers", &mut config.max_workers)?;
        parse_into(resources, "job_timeout_secs", &mut config.job_timeout_secs)?;
    }

    if let Some(search) = map.get("search") {
        let s = &mut config.search;
        parse_into(search, "bond_tolerance", &mut s.bond_tolerance)?;
        parse_into(search, "max_bond_changes", &mut s.max_bond_changes)?;
        parse_into(search, "max_automorphisms", &mut s.max_automorphisms)?;
        parse_into(search, "fragment_separation", &mut s.fragment_separation)?;
    }

    if let Some(ts_guess) = map.get("ts_guess") {
        let t = &mut config.ts_guess;
        parse_into(ts_guess, "ts_bond_scale", &mut t.ts_bond_scale)?;
        parse_into(ts_guess, "breaking_bond_scale", &mut t.breaking_bond_scale)?;
        parse_into(ts_guess, "scan_steps", &mut t.scan_steps)?;
        parse_into(ts_guess, "opt_level_scan_steps", &mut t.opt_level_scan_steps)?;
        parse_into(ts_guess, "scan_2d_steps", &mut t.scan_2d_steps)?;
        parse_into(ts_guess, "min_imag_freq", &mut t.min_imag_freq)?;
        parse_into(ts_guess, "save_templates", &mut t.save_templates)?;
        if let Some(Some(dir)) = ts_guess.get("template_dir") {
            t.template_dir = PathBuf::from(dir);
        }
    }

    if let Some(logging) = map.get("logging") {
        if let Some(Some(level)) = logging.get("level") {
            config.logging.level = level.trim().to_lowercase();
        }
        parse_into(logging, "file_logging", &mut config.logging.file_logging)?;
    }

    if let Some(files) = map.get("files") {
        if let Some(Some(dir)) = files.get("work_dir") {
            config.work_dir = PathBuf::from(dir);
        }
        parse_into(files, "keep_files", &mut config.keep_files)?;
        if let Some(Some(extensions)) = files.get("preserve_extensions") {
            config.preserve_extensions = extensions
                .split(',')
                .map(|s| s.trim().trim_start_matches('.').to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    Ok(())
}

impl SettingsManager {
    /// Creates a default tsfinder.cfg file with all available configuration options.
    pub fn create_template(path: &Path) -> Result<(), ConfigError> {
        fs::write(path, Self::generate_template_content())?;
        Ok(())
    }

    /// Generates the content for a tsfinder.cfg template file.
    fn generate_template_content() -> String {
        let d = Config::default();
        format!(
            r#"# tsfinder configuration file
#
# Files are read in this order, later files overriding earlier ones:
#
# 1. System config directory (/etc/tsfinder/tsfinder.cfg)
# 2. User config directory (~/.config/tsfinder/tsfinder.cfg)
# 3. Current working directory (./tsfinder.cfg)
#
# Missing sections or keys keep the built-in defaults shown below.

[methods]
# Programs: nwchem, orca, xtb
# The low level runs scans and constrained optimisations,
# the high level runs Hessians and TS optimisations.
low_program = {}
high_program = {}

# Explicit executable paths (default: search PATH)
# low_path = /opt/xtb/bin/xtb
# high_path = /opt/orca/orca

[resources]
# Cores per electronic structure job
n_cores = {}

# Memory per core in MB
max_core_mb = {}

# Bond rearrangements searched concurrently
max_workers = {}

# Wall-clock limit of a single job in seconds (0 = no limit)
job_timeout_secs = {}

[search]
# Multiplier on covalent radius sums used for bond detection
bond_tolerance = {}

# Maximum number of forming plus breaking bonds
max_bond_changes = {}

# Cap on enumerated graph automorphisms
max_automorphisms = {}

# Gap between fragments of a reaction complex in Angstrom
fragment_separation = {}

[ts_guess]
# Forming bond length at the TS as a multiple of the average bond length
ts_bond_scale = {}

# Breaking bond scan end point as a multiple of the average bond length
breaking_bond_scale = {}

# Points of 1D scans, of the final high-level scan and per dimension of 2D scans
scan_steps = {}
opt_level_scan_steps = {}
scan_2d_steps = {}

# Smallest |frequency| (cm-1) counted as an imaginary mode
min_imag_freq = {}

# TS template library
template_dir = {}
save_templates = {}

[logging]
# Log level: error, warn, info, debug, trace
level = {}

# Also write the log to tsfinder_<reaction>.log
file_logging = {}

[files]
# Root of the per-job working directories
work_dir = {}

# Keep every file written by the external programs
keep_files = {}

# Extra extensions that cleanup never removes (comma-separated)
preserve_extensions = {}
"#,
            d.low_level.program,
            d.high_level.program,
            d.n_cores,
            d.max_core_mb,
            d.max_workers,
            d.job_timeout_secs,
            d.search.bond_tolerance,
            d.search.max_bond_changes,
            d.search.max_automorphisms,
            d.search.fragment_separation,
            d.ts_guess.ts_bond_scale,
            d.ts_guess.breaking_bond_scale,
            d.ts_guess.scan_steps,
            d.ts_guess.opt_level_scan_steps,
            d.ts_guess.scan_2d_steps,
            d.ts_guess.min_imag_freq,
            d.ts_guess.template_dir.display(),
            d.ts_guess.save_templates,
            d.logging.level,
            d.logging.file_logging,
            d.work_dir.display(),
            d.keep_files,
            d.preserve_extensions.join(","),
        )
    }
}
