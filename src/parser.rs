//! Input file parsing for a transition state search.
//!
//! An input file describes one reaction: its reactant and product molecules
//! and a few run parameters. Molecules are given in blocks opened by a
//! `*REACTANT` or `*PRODUCT` header and closed by a line containing only `*`.
//!
//! # Input File Format
//!
//! ```text
//! # CH3 + HF -> CH4 + F
//! name = abstraction
//! solvent = water
//! low_program = xtb
//! high_program = orca
//!
//! *REACTANT methyl charge=0 mult=2
//! @methyl.xyz
//! *
//!
//! *REACTANT HF
//! H  0.0  0.0  0.0
//! F  0.92 0.0  0.0
//! *
//!
//! *PRODUCT methane
//! @methane.xyz
//! *
//!
//! *PRODUCT F charge=0 mult=2
//! F  0.0  0.0  0.0
//! *
//! ```
//!
//! Inside a block:
//!
//! - `El x y z` adds an atom (Angstrom)
//! - `@file.xyz` reads all atoms from an XYZ file, relative to the input file
//! - `bond i j` adds an explicit bond between 0-based atom indices; when any
//!   bond line is present the molecule graph is taken from these lines
//!
//! The header takes the molecule name followed by optional `charge=` and
//! `mult=` (defaults 0 and 1).
//!
//! ## Parameters
//!
//! `key = value` lines outside blocks override settings for this run:
//! `name`, `solvent`, `low_program`, `high_program`, `n_cores`,
//! `max_workers`, `max_bond_changes` and `work_dir`.
//!
//! Everything after a `#` is a comment.

use crate::config::{Config, QMProgram};
use crate::geometry::Geometry;
use crate::io::read_xyz;
use crate::molecule::{Molecule, MoleculeError, Role};
use crate::reaction::{Reaction, ReactionError};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Error type for parsing operations.
#[derive(Error, Debug)]
pub enum ParseError {
    /// I/O error when reading the input or a referenced XYZ file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed input, with the 1-based line number
    #[error("Parse error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// Input is well formed but incomplete
    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Molecule(#[from] MoleculeError),

    #[error(transparent)]
    Reaction(#[from] ReactionError),
}

type Result<T> = std::result::Result<T, ParseError>;

lazy_static! {
    // "*REACTANT methyl charge=0 mult=2"
    static ref BLOCK_RE: Regex = Regex::new(r"(?i)^\*\s*(reactant|product)\b(.*)$").unwrap();
}

/// One molecule block of the input file.
#[derive(Debug, Clone)]
pub struct MoleculeSpec {
    pub name: String,
    pub role: Role,
    pub charge: i32,
    pub mult: u32,
    pub geometry: Geometry,
    /// Explicit bonds; `None` when the block has no `bond` lines
    pub bonds: Option<Vec<(usize, usize)>>,
}

impl MoleculeSpec {
    /// Builds the molecule and its graph.
    pub fn build(&self, tolerance: f64) -> std::result::Result<Molecule, MoleculeError> {
        Molecule::new(
            &self.name,
            self.role,
            self.geometry.clone(),
            self.charge,
            self.mult,
            self.bonds.as_deref(),
            tolerance,
        )
    }
}

/// Parsed input file.
#[derive(Debug, Clone)]
pub struct InputData {
    /// Settings with the input file overrides applied
    pub config: Config,
    /// Explicit reaction name
    pub name: Option<String>,
    pub solvent: Option<String>,
    pub molecules: Vec<MoleculeSpec>,
}

impl InputData {
    /// Builds the reaction, checking every molecule graph.
    pub fn build_reaction(&self) -> Result<Reaction> {
        let tolerance = self.config.search.bond_tolerance;
        let molecules = self
            .molecules
            .iter()
            .map(|spec| spec.build(tolerance))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Reaction::new(molecules, self.name.as_deref(), self.solvent.clone())?)
    }
}

/// Parses an input file on top of `config`.
pub fn parse_input(path: &Path, config: Config) -> Result<InputData> {
    let content = fs::read_to_string(path)?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    parse_input_str(&content, &base_dir, config)
}

/// Parses input text; `@file` references are resolved against `base_dir`.
pub fn parse_input_str(content: &str, base_dir: &Path, config: Config) -> Result<InputData> {
    let mut data = InputData {
        config,
        name: None,
        solvent: None,
        molecules: Vec::new(),
    };
    let mut block: Option<BlockBuilder> = None;

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.split_once('#').map_or(raw, |(before, _)| before).trim();
        if line.is_empty() {
            continue;
        }
        let syntax = |message: String| ParseError::Syntax {
            line: line_no,
            message,
        };

        if line == "*" {
            let finished = block
                .take()
                .ok_or_else(|| syntax("'*' without an open molecule block".to_string()))?;
            data.molecules.push(finished.finish(data.molecules.len()).map_err(syntax)?);
            continue;
        }

        if let Some(caps) = BLOCK_RE.captures(line) {
            if block.is_some() {
                return Err(syntax("molecule block opened before the previous one was closed".into()));
            }
            let role = if caps[1].eq_ignore_ascii_case("reactant") {
                Role::Reactant
            } else {
                Role::Product
            };
            block = Some(BlockBuilder::from_header(role, &caps[2]).map_err(syntax)?);
            continue;
        }

        match block.as_mut() {
            Some(builder) => builder.add_line(line, base_dir).map_err(|e| match e {
                ParseError::Parse(message) => syntax(message),
                other => other,
            })?,
            None if line.contains('=') => parse_parameter(line, &mut data).map_err(syntax)?,
            None => return Err(syntax(format!("unexpected line '{}'", line))),
        }
    }

    if block.is_some() {
        return Err(ParseError::Parse("last molecule block is not closed with '*'".into()));
    }
    if !data.molecules.iter().any(|m| m.role == Role::Reactant) {
        return Err(ParseError::Parse("no *REACTANT block".into()));
    }
    if !data.molecules.iter().any(|m| m.role == Role::Product) {
        return Err(ParseError::Parse("no *PRODUCT block".into()));
    }
    debug!("Parsed {} molecules", data.molecules.len());
    Ok(data)
}

/// Molecule block being read.
struct BlockBuilder {
    name: Option<String>,
    role: Role,
    charge: i32,
    mult: u32,
    elements: Vec<String>,
    coords: Vec<f64>,
    bonds: Vec<(usize, usize)>,
}

impl BlockBuilder {
    fn from_header(role: Role, rest: &str) -> std::result::Result<Self, String> {
        let mut builder = Self {
            name: None,
            role,
            charge: 0,
            mult: 1,
            elements: Vec::new(),
            coords: Vec::new(),
            bonds: Vec::new(),
        };
        for token in rest.split_whitespace() {
            match token.split_once('=') {
                Some((key, value)) => match key.to_lowercase().as_str() {
                    "charge" => builder.charge = parse_value(key, value)?,
                    "mult" => builder.mult = parse_value(key, value)?,
                    _ => return Err(format!("unknown molecule option '{}'", key)),
                },
                None if builder.name.is_none() => builder.name = Some(token.to_string()),
                None => return Err(format!("unexpected token '{}' in molecule header", token)),
            }
        }
        Ok(builder)
    }

    fn add_line(&mut self, line: &str, base_dir: &Path) -> Result<()> {
        if let Some(file) = line.strip_prefix('@') {
            let path = resolve(base_dir, file.trim());
            let geometry = read_xyz(&path)?;
            self.elements.extend(geometry.elements.iter().cloned());
            self.coords.extend(geometry.coords.iter().copied());
            return Ok(());
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [keyword, i, j] if keyword.eq_ignore_ascii_case("bond") => {
                let i = parse_value("atom index", i).map_err(ParseError::Parse)?;
                let j = parse_value("atom index", j).map_err(ParseError::Parse)?;
                self.bonds.push((i, j));
            }
            [element, x, y, z] => {
                if !element.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
                    return Err(ParseError::Parse(format!("invalid element '{}'", element)));
                }
                self.elements.push(element.to_string());
                for value in [x, y, z] {
                    self.coords.push(parse_value("coordinate", value).map_err(ParseError::Parse)?);
                }
            }
            _ => return Err(ParseError::Parse(format!("cannot read atom line '{}'", line))),
        }
        Ok(())
    }

    fn finish(self, index: usize) -> std::result::Result<MoleculeSpec, String> {
        let name = self.name.unwrap_or_else(|| format!("{}{}", self.role, index));
        if self.elements.is_empty() {
            return Err(format!("molecule {} has no atoms", name));
        }
        let n_atoms = self.elements.len();
        if let Some(&(i, j)) = self.bonds.iter().find(|&&(i, j)| i >= n_atoms || j >= n_atoms) {
            return Err(format!("bond {}-{} of {} is out of range", i, j, name));
        }
        Ok(MoleculeSpec {
            name,
            role: self.role,
            charge: self.charge,
            mult: self.mult,
            geometry: Geometry::new(self.elements, self.coords),
            bonds: (!self.bonds.is_empty()).then_some(self.bonds),
        })
    }
}

fn resolve(base_dir: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn parse_value<T: FromStr>(what: &str, value: &str) -> std::result::Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("invalid {} '{}'", what, value.trim()))
}

fn parse_program(value: &str) -> std::result::Result<QMProgram, String> {
    QMProgram::from_name(value).ok_or_else(|| format!("unknown program '{}'", value))
}

fn parse_parameter(line: &str, data: &mut InputData) -> std::result::Result<(), String> {
    let Some((key, value)) = line.split_once('=') else {
        return Ok(());
    };
    let key = key.trim().to_lowercase();
    let value = value.trim();
    let config = &mut data.config;

    match key.as_str() {
        "name" => data.name = Some(value.to_string()),
        "solvent" => data.solvent = Some(value.to_string()),
        "low_program" => config.low_level.set_program(parse_program(value)?),
        "high_program" => config.high_level.set_program(parse_program(value)?),
        "n_cores" => config.n_cores = parse_value(&key, value)?,
        "max_workers" => config.max_workers = parse_value(&key, value)?,
        "max_bond_changes" => config.search.max_bond_changes = parse_value(&key, value)?,
        "work_dir" => config.work_dir = PathBuf::from(value),
        _ => warn!("Ignoring unknown input parameter '{}'", key),
    }
    Ok(())
}
