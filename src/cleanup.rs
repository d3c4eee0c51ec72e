//! Automated file cleanup for electronic structure jobs.
//!
//! Every job runs in its own directory, and the external programs leave
//! scratch files behind there (wavefunction files, restart files, integral
//! dumps). After a job finishes and its output has been parsed, the
//! [`CleanupManager`] removes everything except:
//!
//! - **Input and output files** (`.nw`, `.inp`, `.xyz`, `.out`, `.log`)
//! - **Constraint files** (`.xcontrol`)
//! - **Program-specific keepers** (ORCA `.hess`)
//! - **User extensions** from the `[files] preserve_extensions` setting
//!
//! Cleanup is skipped entirely when `keep_files = true`.

use crate::config::{Config, QMProgram};
use log::{debug, warn};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during cleanup operations.
#[derive(Error, Debug)]
pub enum CleanupError {
    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid file path
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Type alias for cleanup operation results
pub type Result<T> = std::result::Result<T, CleanupError>;

const ALWAYS_PRESERVED: &[&str] = &["out", "log", "nw", "inp", "xyz", "xcontrol", "json"];

/// Cleanup configuration derived from the run configuration.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Enable or disable automatic cleanup
    pub enabled: bool,
    /// Extensions preserved in addition to the built-in list
    pub preserve_extensions: Vec<String>,
}

impl CleanupConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: !config.keep_files,
            preserve_extensions: config.preserve_extensions.clone(),
        }
    }
}

/// Numbers of files removed and kept by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub removed: usize,
    pub preserved: usize,
}

/// Removes scratch files from job directories.
pub struct CleanupManager {
    config: CleanupConfig,
    program: QMProgram,
}

impl CleanupManager {
    pub fn new(config: CleanupConfig, program: QMProgram) -> Self {
        Self { config, program }
    }

    /// Cleans up scratch files in a job directory.
    ///
    /// Missing directories are ignored; a path that is not a directory is an
    /// error. Files that cannot be removed are logged and counted as preserved.
    pub fn cleanup_directory(&self, directory: &Path) -> Result<CleanupSummary> {
        let mut summary = CleanupSummary::default();
        if !self.config.enabled || !directory.exists() {
            return Ok(summary);
        }
        if !directory.is_dir() {
            return Err(CleanupError::InvalidPath(format!(
                "Path is not a directory: {}",
                directory.display()
            )));
        }

        for entry in fs::read_dir(directory)? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!("Error reading directory entry: {}", e);
                    continue;
                }
            };
            if path.is_dir() {
                continue;
            }
            let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
            if self.should_preserve_file(extension) {
                summary.preserved += 1;
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Cleaned up file: {}", path.display());
                    summary.removed += 1;
                }
                Err(e) => {
                    warn!("Failed to remove file {}: {}", path.display(), e);
                    summary.preserved += 1;
                }
            }
        }

        debug!(
            "Cleanup of {}: {} files deleted, {} files preserved",
            directory.display(),
            summary.removed,
            summary.preserved
        );
        Ok(summary)
    }

    /// True when files with this extension (without the dot) are kept.
    pub fn should_preserve_file(&self, extension: &str) -> bool {
        if ALWAYS_PRESERVED.contains(&extension) {
            return true;
        }
        if self.config.preserve_extensions.iter().any(|ext| ext == extension) {
            return true;
        }
        match self.program {
            // ORCA Hessians can seed later TS optimisations
            QMProgram::Orca => extension == "hess",
            QMProgram::NWChem | QMProgram::Xtb => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_keeps_outputs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["job_orca.inp", "job_orca.out", "job_orca.gbw", "job_orca.hess", "job.tmp", "job.chk"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        let config = CleanupConfig {
            enabled: true,
            preserve_extensions: vec!["chk".to_string()],
        };
        let manager = CleanupManager::new(config, QMProgram::Orca);
        let summary = manager.cleanup_directory(dir.path()).unwrap();

        assert_eq!(summary, CleanupSummary { removed: 2, preserved: 4 });
        assert!(dir.path().join("job_orca.out").exists());
        assert!(dir.path().join("job_orca.hess").exists());
        assert!(dir.path().join("job.chk").exists());
        assert!(!dir.path().join("job_orca.gbw").exists());
    }

    #[test]
    fn test_disabled_cleanup_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("scratch.tmp"), "x").unwrap();
        let mut config = Config::default();
        config.keep_files = true;
        let manager = CleanupManager::new(CleanupConfig::from_config(&config), QMProgram::Xtb);
        assert_eq!(manager.cleanup_directory(dir.path()).unwrap(), CleanupSummary::default());
        assert!(dir.path().join("scratch.tmp").exists());
    }

    #[test]
    fn test_file_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not_a_dir.out");
        fs::write(&file, "x").unwrap();
        let manager = CleanupManager::new(
            CleanupConfig { enabled: true, preserve_extensions: Vec::new() },
            QMProgram::NWChem,
        );
        assert!(matches!(
            manager.cleanup_directory(&file),
            Err(CleanupError::InvalidPath(_))
        ));
    }
}
