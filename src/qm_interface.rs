//! Electronic structure program interfaces.
//!
//! This module provides a unified interface for running calculations with
//! different electronic structure programs. It abstracts away the differences
//! between programs (NWChem, ORCA, xtb) and provides a consistent API for:
//!
//! - Writing input files, including distance and Cartesian constraints
//! - Executing calculations with an optional wall-clock limit
//! - Parsing output: termination, energy, convergence, imaginary frequencies,
//!   normal mode displacements and final geometry
//!
//! # Interface Design
//!
//! The [`QMInterface`] trait defines the contract every program implements.
//! Parsing methods take the full output text and never fail: a quantity that
//! cannot be found is reported as `None` (or an empty list) and the caller
//! decides whether that is fatal. [`create_interface`] is the registry that
//! maps a configured [`QMProgram`] to its implementation.
//!
//! # Usage Pattern
//!
//! ```no_run
//! use tsfinder::config::{MethodSettings, QMProgram};
//! use tsfinder::qm_interface::create_interface;
//!
//! let orca = create_interface(&MethodSettings::for_program(QMProgram::Orca));
//! if !orca.is_available() {
//!     eprintln!("ORCA executable not found");
//! }
//! ```
//!
//! # Error Handling
//!
//! Running a job returns a [`QMError`]:
//! - `Io`: File system errors (missing files, permission issues)
//! - `Calculation`: Program execution failures
//! - `Timeout`: The job exceeded its wall-clock limit and was killed
//! - `Parse`: Output parsing errors

use crate::calculation::Calculation;
use crate::config::{MethodSettings, QMProgram};
use crate::geometry::Geometry;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error type for QM interface operations.
#[derive(Error, Debug)]
pub enum QMError {
    /// File system or I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Electronic structure program execution failed
    #[error("QM calculation failed: {0}")]
    Calculation(String),
    /// Job exceeded its wall-clock limit
    #[error("QM calculation {job} killed after {seconds} s")]
    Timeout { job: String, seconds: u64 },
    /// Failed to parse program output
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Type alias for QM operation results
pub type Result<T> = std::result::Result<T, QMError>;

/// Trait implemented by each electronic structure program.
///
/// Implementations are shared between worker threads, hence `Send + Sync`.
pub trait QMInterface: Send + Sync {
    /// Program implemented by this interface.
    fn program(&self) -> QMProgram;

    /// True when the executable can be found.
    fn is_available(&self) -> bool;

    /// Implicit solvents the program accepts.
    fn available_solvents(&self) -> &'static [&'static str];

    /// Input file name of a job.
    fn input_filename(&self, job_name: &str) -> String;

    /// Output file name of a job.
    fn output_filename(&self, job_name: &str) -> String;

    /// Writes the input file for `calc` to `path`.
    fn write_input(&self, calc: &Calculation, path: &Path) -> Result<()>;

    /// Runs the program on `input_path`, writing its output to `output_path`.
    ///
    /// The process runs in the directory containing `input_path`. With a
    /// `timeout`, the process is killed once the limit is exceeded.
    fn run_calculation(
        &self,
        calc: &Calculation,
        input_path: &Path,
        output_path: &Path,
        timeout: Option<Duration>,
    ) -> Result<()>;

    /// True when the output shows a normal (or tolerated) termination.
    fn terminated_normally(&self, output: &str) -> bool;

    /// Final total energy in Hartree.
    fn get_energy(&self, output: &str) -> Option<f64>;

    fn optimisation_converged(&self, output: &str) -> bool;

    /// True when the optimisation stopped close enough to convergence to
    /// continue from its final geometry.
    fn optimisation_nearly_converged(&self, output: &str) -> bool;

    /// Negative (imaginary) frequencies in cm^-1, in output order.
    fn get_imag_freqs(&self, output: &str) -> Vec<f64>;

    /// Cartesian displacements of a normal mode, one `[dx, dy, dz]` per atom.
    ///
    /// Modes are numbered from 0 including the six translations and
    /// rotations, so mode 6 is the lowest vibrational (the imaginary) mode.
    fn get_normal_mode_displacements(
        &self,
        output: &str,
        mode_number: usize,
        n_atoms: usize,
    ) -> Option<Vec<[f64; 3]>>;

    /// Final Cartesian geometry in Angstrom.
    fn get_final_geometry(&self, output: &str, n_atoms: usize) -> Option<Geometry>;
}

/// Builds the interface for a configured method level.
pub fn create_interface(method: &MethodSettings) -> Box<dyn QMInterface> {
    let command = method
        .path
        .clone()
        .unwrap_or_else(|| PathBuf::from(method.program.default_executable()));
    match method.program {
        QMProgram::NWChem => Box::new(NWChemInterface::new(command)),
        QMProgram::Orca => Box::new(OrcaInterface::new(command)),
        QMProgram::Xtb => Box::new(XtbInterface::new(command)),
    }
}

/// Resolves an executable: explicit paths must exist, bare names are looked
/// up on `PATH`.
pub fn find_executable(command: &Path) -> Option<PathBuf> {
    if command.components().count() > 1 {
        return command.is_file().then(|| command.to_path_buf());
    }
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(command))
        .find(|candidate| candidate.is_file())
}

fn working_dir(input_path: &Path) -> &Path {
    match input_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name()
        .ok_or_else(|| QMError::Calculation(format!("Not a file path: {}", path.display())))
}

/// Spawns `command` with stdout redirected to `output_path` and waits for it.
fn execute(mut command: Command, job: &str, output_path: &Path, timeout: Option<Duration>) -> Result<()> {
    let output_file = fs::File::create(output_path)?;
    let mut child = command
        .stdout(Stdio::from(output_file))
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| QMError::Calculation(format!("Failed to start {}: {}", job, e)))?;

    let status = match timeout {
        None => child.wait()?,
        Some(limit) => {
            let start = Instant::now();
            loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if start.elapsed() > limit {
                    warn!("Job {} exceeded {} s, killing it", job, limit.as_secs());
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(QMError::Timeout {
                        job: job.to_string(),
                        seconds: limit.as_secs(),
                    });
                }
                thread::sleep(Duration::from_millis(200));
            }
        }
    };

    if !status.success() {
        // some programs exit non-zero after writing a usable output
        debug!("Job {} exited with {}", job, status);
    }
    Ok(())
}

lazy_static! {
    // Robust floating-point regex: handles 1.23, -0.032, 1.2e-4, .123, etc.
    static ref FLOAT_RE: String = r"[-+]?(?:\d+\.\d*|\.\d+)(?:[eE][-+]?\d+)?".to_string();

    // "FINAL SINGLE POINT ENERGY       -76.328156718920"
    static ref ORCA_ENERGY_RE: Regex = Regex::new(&format!(
        r"FINAL SINGLE POINT ENERGY\s+({0})",
        *FLOAT_RE
    )).unwrap();

    // "   6:      -523.32 cm**-1 ***imaginary mode***"
    static ref ORCA_FREQ_RE: Regex = Regex::new(&format!(
        r"^\s*\d+:\s+({0})\s+cm\*\*-1",
        *FLOAT_RE
    )).unwrap();

    // "          | TOTAL ENERGY               -5.070544440612 Eh   |"
    static ref XTB_ENERGY_RE: Regex = Regex::new(&format!(
        r"TOTAL ENERGY\s+({0})\s+Eh",
        *FLOAT_RE
    )).unwrap();
}

fn parse_floats(tokens: &[&str]) -> Vec<f64> {
    tokens.iter().filter_map(|t| t.parse::<f64>().ok()).collect()
}

/// Header line of a normal mode table: only mode indices.
fn mode_indices(line: &str) -> Option<Vec<usize>> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() || tokens.len() > 6 {
        return None;
    }
    tokens.iter().map(|t| t.parse::<usize>().ok()).collect()
}

fn chunk_xyz(values: &[f64], n_atoms: usize) -> Option<Vec<[f64; 3]>> {
    if values.len() != 3 * n_atoms {
        warn!(
            "Expected {} displacement components, found {}",
            3 * n_atoms,
            values.len()
        );
        return None;
    }
    Some(values.chunks(3).map(|c| [c[0], c[1], c[2]]).collect())
}

fn geometry_lines(geom: &Geometry) -> String {
    let mut block = String::new();
    for i in 0..geom.num_atoms {
        let [x, y, z] = geom.get_atom_coords(i);
        let _ = writeln!(block, "  {:<3} {:^12.8} {:^12.8} {:^12.8}", geom.elements[i], x, y, z);
    }
    block
}

// ---------------------------------------------------------------------------
// NWChem
// ---------------------------------------------------------------------------

const NWCHEM_SMD_SOLVENTS: &[&str] = &[
    "h2o", "water", "acetacid", "acetone", "acetntrl", "acetphen", "aniline", "anisole",
    "benzaldh", "benzene", "benzntrl", "benzylcl", "brisobut", "brbenzen", "brethane", "bromform",
    "broctane", "brpentan", "brpropa2", "brpropan", "butanal", "butacid", "butanol", "butanol2",
    "butanone", "butantrl", "butile", "nba", "nbutbenz", "sbutbenz", "tbutbenz", "cs2", "carbntet",
    "clbenzen", "secbutcl", "chcl3", "clhexane", "clpentan", "clpropan", "ocltolue", "m-cresol",
    "o-cresol", "cychexan", "cychexon", "cycpentn", "cycpntol", "cycpnton", "declncis",
    "declntra", "declnmix", "decane", "decanol", "edb12", "dibrmetn", "butyleth", "odiclbnz",
    "edc12", "c12dce", "t12dce", "dcm", "ether", "et2s", "dietamin", "mi", "dipe", "dmds", "dmso",
    "dma", "cisdmchx", "dmf", "dmepen24", "dmepyr24", "dmepyr26", "dioxane", "phoph", "dproamin",
    "dodecan", "meg", "etsh", "ethanol", "etoac", "etome", "eb", "phenetol", "c6h5f", "foctane",
    "formamid", "formacid", "heptane", "heptanol", "heptnon2", "heptnon4", "hexadecn", "hexane",
    "hexnacid", "hexanol", "hexanon2", "hexene", "hexyne", "c6h5i", "iobutane", "c2h5i",
    "iohexdec", "ch3i", "iopentan", "iopropan", "cumene", "p-cymene", "mesityln", "methanol",
    "egme", "meacetat", "mebnzate", "mebutate", "meformat", "mibk", "mepropyl", "isobutol",
    "terbutol", "nmeaniln", "mecychex", "nmfmixtr", "isohexan", "mepyrid2", "mepyrid3",
    "mepyrid4", "c6h5no2", "c2h5no2", "ch3no2", "ntrprop1", "ntrprop2", "ontrtolu", "nonane",
    "nonanol", "nonanone", "octane", "octanol", "octanon2", "pentdecn", "pentanal", "npentane",
    "pentacid", "pentanol", "pentnon2", "pentnon3", "pentene", "e2penten", "pentacet",
    "pentamin", "pfb", "benzalcl", "propanal", "propacid", "propanol", "propnol2", "propntrl",
    "propenol", "propacet", "propamin", "pyridine", "c2cl4", "thf", "sulfolan", "tetralin",
    "thiophen", "phsh", "toluene", "tbp", "tca111", "tca112", "tce", "et3n", "tfe222",
    "tmben124", "isoctane", "undecane", "m-xylene", "o-xylene", "p-xylene", "xylenemx",
];

/// NWChem interface.
///
/// Keywords are whole NWChem input blocks (`dft ... end`, `task dft freq`).
/// Multi-core jobs are launched through `mpirun`.
pub struct NWChemInterface {
    /// NWChem executable command (e.g., "nwchem", "/path/to/nwchem")
    pub command: PathBuf,
}

impl NWChemInterface {
    pub fn new(command: PathBuf) -> Self {
        Self { command }
    }

    /// Adapts the keyword blocks to the job: spin state insertion and
    /// single-atom optimisations turned into energies.
    fn prepare_keywords(calc: &Calculation) -> Vec<String> {
        let mut keywords = Vec::new();
        let mut scf_block = false;
        for keyword in &calc.keywords {
            let lower = keyword.to_lowercase();
            if (lower.contains("opt") || lower.contains("saddle")) && calc.n_atoms() == 1 {
                warn!("Cannot do an optimisation for a single atom");
                let words: Vec<&str> = keyword
                    .split_whitespace()
                    .map(|w| {
                        if w.contains("opt") || w.contains("saddle") {
                            "energy"
                        } else {
                            w
                        }
                    })
                    .collect();
                keywords.push(words.join(" "));
            } else if lower.starts_with("dft") {
                keywords.push(insert_after_first_line(keyword, &format!("  mult {}", calc.mult)));
            } else if lower.starts_with("scf") {
                scf_block = true;
                keywords.push(insert_after_first_line(
                    keyword,
                    &format!("  nopen {}", calc.mult - 1),
                ));
            } else if (lower.contains("ccsd") || lower.contains("mp2")) && !scf_block {
                keywords.push(format!("scf\n  nopen {}\nend", calc.mult - 1));
                keywords.push(keyword.clone());
                scf_block = true;
            } else {
                keywords.push(keyword.clone());
            }
        }
        keywords
    }
}

fn insert_after_first_line(block: &str, line: &str) -> String {
    let mut lines: Vec<&str> = block.split('\n').collect();
    lines.insert(1.min(lines.len()), line);
    lines.join("\n")
}

/// Compresses 1-based atom indices into NWChem ranges, e.g. `1:4 6 7`.
fn atom_ranges(atoms: &[usize]) -> Vec<String> {
    let mut sorted: Vec<usize> = atoms.iter().map(|a| a + 1).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j + 1 < sorted.len() && sorted[j + 1] == sorted[j] + 1 {
            j += 1;
        }
        if j - i >= 2 {
            ranges.push(format!("{}:{}", sorted[i], sorted[j]));
        } else {
            ranges.extend(sorted[i..=j].iter().map(|a| a.to_string()));
        }
        i = j + 1;
    }
    ranges
}

impl QMInterface for NWChemInterface {
    fn program(&self) -> QMProgram {
        QMProgram::NWChem
    }

    fn is_available(&self) -> bool {
        find_executable(&self.command).is_some()
    }

    fn available_solvents(&self) -> &'static [&'static str] {
        NWCHEM_SMD_SOLVENTS
    }

    fn input_filename(&self, job_name: &str) -> String {
        format!("{}_nwchem.nw", job_name)
    }

    fn output_filename(&self, job_name: &str) -> String {
        format!("{}_nwchem.out", job_name)
    }

    fn write_input(&self, calc: &Calculation, path: &Path) -> Result<()> {
        let keywords = Self::prepare_keywords(calc);
        let constrained = !calc.distance_constraints.is_empty() || !calc.cartesian_constraints.is_empty();

        let mut content = format!("start {}_nwchem\necho\n", calc.name);

        if let Some(solvent) = &calc.solvent {
            let _ = writeln!(content, "cosmo\n do_cosmo_smd true\n solvent {}\nend", solvent);
        }

        content.push_str(if constrained { "geometry noautoz\n" } else { "geometry\n" });
        content.push_str(&geometry_lines(&calc.geometry));

        let zcoord_bonds: Vec<(usize, usize)> = calc
            .bond_ids_to_add
            .iter()
            .copied()
            .chain(calc.distance_constraints.keys().copied())
            .collect();
        if !zcoord_bonds.is_empty() {
            content.push_str("  zcoord\n");
            for (i, j) in zcoord_bonds {
                let _ = writeln!(content, "    bond {} {}", i + 1, j + 1);
            }
            content.push_str("  end\n");
        }
        content.push_str("end\n");

        let _ = writeln!(content, "charge {}", calc.charge);

        if constrained {
            let mut force_constant = 10;
            if calc.constraints_already_met() {
                force_constant += 90;
            }
            content.push_str("constraints\n");
            for (&(i, j), &distance) in &calc.distance_constraints {
                let _ = writeln!(
                    content,
                    "  spring bond {} {} {} {:.3}",
                    i + 1,
                    j + 1,
                    force_constant,
                    distance
                );
            }
            if !calc.cartesian_constraints.is_empty() {
                let _ = writeln!(
                    content,
                    "  fix atom {}",
                    atom_ranges(&calc.cartesian_constraints).join(" ")
                );
            }
            content.push_str("end\n");
        }

        let _ = writeln!(content, "memory {} mb", calc.max_core_mb);
        content.push_str(&keywords.join("\n"));
        content.push('\n');

        fs::write(path, content)?;
        Ok(())
    }

    fn run_calculation(
        &self,
        calc: &Calculation,
        input_path: &Path,
        output_path: &Path,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let mut command = if calc.n_cores > 1 {
            let mut mpi = Command::new("mpirun");
            mpi.arg("-np").arg(calc.n_cores.to_string()).arg(&self.command);
            mpi
        } else {
            Command::new(&self.command)
        };
        command
            .arg(file_name(input_path)?)
            .current_dir(working_dir(input_path));
        execute(command, &calc.name, output_path, timeout)
    }

    fn terminated_normally(&self, output: &str) -> bool {
        output.lines().rev().take(500).any(|line| {
            line.contains("CITATION")
                || line.contains("Failed to converge in maximum number of steps or available time")
        })
    }

    fn get_energy(&self, output: &str) -> Option<f64> {
        for line in output.lines().rev() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if line.contains("Total DFT energy") || line.contains("Total SCF energy") {
                return tokens.get(4).and_then(|t| t.parse().ok());
            }
            if [
                "Total CCSD energy",
                "Total CCSD(T) energy",
                "Total SCS-MP2 energy",
                "Total MP2 energy",
                "Total RI-MP2 energy",
            ]
            .iter()
            .any(|s| line.contains(s))
            {
                return tokens.get(3).and_then(|t| t.parse().ok());
            }
        }
        None
    }

    fn optimisation_converged(&self, output: &str) -> bool {
        output.contains("Optimization converged")
    }

    fn optimisation_nearly_converged(&self, output: &str) -> bool {
        let lines: Vec<&str> = output.lines().collect();
        lines
            .windows(2)
            .any(|w| w[0].contains('@') && w[1].contains("ok"))
    }

    fn get_imag_freqs(&self, output: &str) -> Vec<f64> {
        let mut imag_freqs = Vec::new();
        let mut in_section = false;
        for line in output.lines() {
            if line.contains("Projected Frequencies") {
                in_section = true;
                imag_freqs.clear();
            }
            if line.contains("------------------------------") {
                in_section = false;
            }
            if in_section && line.contains("P.Frequency") {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                imag_freqs.extend(parse_floats(&tokens[1..]).into_iter().filter(|f| *f < 0.0));
            }
        }
        debug!("Found imaginary freqs {:?}", imag_freqs);
        imag_freqs
    }

    fn get_normal_mode_displacements(
        &self,
        output: &str,
        mode_number: usize,
        n_atoms: usize,
    ) -> Option<Vec<[f64; 3]>> {
        // Projected modes are numbered from 1 in ascending frequency, so the
        // imaginary mode precedes the translations and rotations
        let mode = mode_number.checked_sub(5)?;
        let lines: Vec<&str> = output.lines().collect();
        let mut in_section = false;
        let mut displacements = Vec::new();

        for (j, line) in lines.iter().enumerate() {
            if line.contains("Projected Frequencies") {
                in_section = true;
                displacements.clear();
            }
            if line.contains("------------------------------") {
                in_section = false;
            }
            if !in_section {
                continue;
            }
            let Some(modes) = mode_indices(line) else { continue };
            let Some(col) = modes.iter().position(|&m| m == mode) else { continue };

            let start = j + 4;
            let end = (start + 3 * n_atoms).min(lines.len());
            displacements = lines[start.min(end)..end]
                .iter()
                .filter_map(|row| row.split_whitespace().nth(col + 1)?.parse::<f64>().ok())
                .collect();
        }
        chunk_xyz(&displacements, n_atoms)
    }

    fn get_final_geometry(&self, output: &str, n_atoms: usize) -> Option<Geometry> {
        let mut in_section = false;
        let mut atoms: Vec<(String, [f64; 3])> = Vec::new();
        for line in output.lines() {
            if line.contains("Output coordinates in angstroms") {
                in_section = true;
                atoms.clear();
            }
            if line.contains("Atomic Mass") {
                in_section = false;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if in_section && tokens.len() == 6 && tokens[0].chars().all(|c| c.is_ascii_digit()) {
                let xyz = parse_floats(&tokens[3..6]);
                if xyz.len() == 3 {
                    atoms.push((tokens[1].to_string(), [xyz[0], xyz[1], xyz[2]]));
                }
            }
        }
        geometry_from_atoms(atoms, n_atoms)
    }
}

fn geometry_from_atoms(atoms: Vec<(String, [f64; 3])>, n_atoms: usize) -> Option<Geometry> {
    if atoms.is_empty() || atoms.len() != n_atoms {
        return None;
    }
    let elements = atoms.iter().map(|(el, _)| normalise_symbol(el)).collect();
    let coords = atoms.iter().flat_map(|(_, xyz)| *xyz).collect();
    Some(Geometry::new(elements, coords))
}

/// "CL" / "cl" / "Cl1" -> "Cl"
fn normalise_symbol(label: &str) -> String {
    let letters: String = label.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let mut chars = letters.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_lowercase(),
        None => label.to_string(),
    }
}

// ---------------------------------------------------------------------------
// ORCA
// ---------------------------------------------------------------------------

const ORCA_SMD_SOLVENTS: &[&str] = &[
    "1,4-dioxane", "acetone", "acetonitrile", "ammonia", "aniline", "benzene", "benzonitrile",
    "bromobenzene", "carbon disulfide", "ccl4", "ch2cl2", "chlorobenzene", "chloroform",
    "cyclohexane", "decalin", "dichloroethane", "diethyl ether", "dimethylacetamide", "dmf",
    "dmso", "ethanol", "ethyl acetate", "heptane", "hexane", "isopropanol", "methanol",
    "nitromethane", "octanol", "pentane", "pyridine", "tetrahydrofuran", "thf", "toluene",
    "water", "h2o",
];

/// ORCA interface.
///
/// Keywords go on the `!` simple input line. Atom indices in `%geom`
/// constraints are 0-based, as ORCA expects.
pub struct OrcaInterface {
    /// ORCA executable command (e.g., "orca", "/path/to/orca")
    pub command: PathBuf,
}

impl OrcaInterface {
    pub fn new(command: PathBuf) -> Self {
        Self { command }
    }

    fn simple_keywords(calc: &Calculation) -> Vec<String> {
        let single_atom = calc.n_atoms() == 1;
        let mut keywords: Vec<String> = calc
            .keywords
            .iter()
            .filter(|k| {
                let opt = k.to_lowercase().starts_with("opt");
                if opt && single_atom {
                    warn!("Cannot do an optimisation for a single atom");
                }
                !(opt && single_atom)
            })
            .cloned()
            .collect();
        if calc.solvent.is_some() {
            keywords.push("CPCM".to_string());
        }
        keywords
    }
}

impl QMInterface for OrcaInterface {
    fn program(&self) -> QMProgram {
        QMProgram::Orca
    }

    fn is_available(&self) -> bool {
        find_executable(&self.command).is_some()
    }

    fn available_solvents(&self) -> &'static [&'static str] {
        ORCA_SMD_SOLVENTS
    }

    fn input_filename(&self, job_name: &str) -> String {
        format!("{}_orca.inp", job_name)
    }

    fn output_filename(&self, job_name: &str) -> String {
        format!("{}_orca.out", job_name)
    }

    fn write_input(&self, calc: &Calculation, path: &Path) -> Result<()> {
        let keywords = Self::simple_keywords(calc);
        let mut content = format!("! {}\n", keywords.join(" "));

        let _ = writeln!(content, "%maxcore {}", calc.max_core_mb);
        if calc.n_cores > 1 {
            let _ = writeln!(content, "%pal nprocs {} end", calc.n_cores);
        }
        if let Some(solvent) = &calc.solvent {
            let _ = writeln!(content, "%cpcm\n smd true\n SMDsolvent \"{}\"\nend", solvent);
        }

        let ts_opt = keywords.iter().any(|k| k.eq_ignore_ascii_case("OptTS"));
        let constrained = !calc.distance_constraints.is_empty() || !calc.cartesian_constraints.is_empty();
        if ts_opt || constrained {
            content.push_str("%geom\n");
            if ts_opt {
                content.push_str(" Calc_Hess true\n Recalc_Hess 30\n Trust -0.1\n MaxIter 150\n");
            }
            if constrained {
                content.push_str(" Constraints\n");
                for (&(i, j), &distance) in &calc.distance_constraints {
                    let _ = writeln!(content, "  {{ B {} {} {:.4} C }}", i, j, distance);
                }
                for atom in &calc.cartesian_constraints {
                    let _ = writeln!(content, "  {{ C {} C }}", atom);
                }
                content.push_str(" end\n");
            }
            content.push_str("end\n");
        }

        let _ = writeln!(content, "* xyz {} {}", calc.charge, calc.mult);
        content.push_str(&geometry_lines(&calc.geometry));
        content.push_str("*\n");

        fs::write(path, content)?;
        Ok(())
    }

    fn run_calculation(
        &self,
        calc: &Calculation,
        input_path: &Path,
        output_path: &Path,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let mut command = Command::new(&self.command);
        command
            .arg(file_name(input_path)?)
            .current_dir(working_dir(input_path));
        execute(command, &calc.name, output_path, timeout)
    }

    fn terminated_normally(&self, output: &str) -> bool {
        output
            .lines()
            .rev()
            .take(50)
            .any(|line| line.contains("ORCA TERMINATED NORMALLY"))
    }

    fn get_energy(&self, output: &str) -> Option<f64> {
        output
            .lines()
            .rev()
            .find_map(|line| ORCA_ENERGY_RE.captures(line))
            .and_then(|caps| caps[1].parse().ok())
    }

    fn optimisation_converged(&self, output: &str) -> bool {
        output.contains("THE OPTIMIZATION HAS CONVERGED")
    }

    fn optimisation_nearly_converged(&self, output: &str) -> bool {
        if self.optimisation_converged(output) {
            return true;
        }
        // last convergence table with at most one unmet criterion
        let lines: Vec<&str> = output.lines().collect();
        let Some(start) = lines.iter().rposition(|l| l.contains("Geometry convergence")) else {
            return false;
        };
        let table: Vec<&&str> = lines[start..]
            .iter()
            .take_while(|l| !l.trim().starts_with("......."))
            .filter(|l| l.trim_end().ends_with("YES") || l.trim_end().ends_with("NO"))
            .collect();
        let unmet = table.iter().filter(|l| l.trim_end().ends_with("NO")).count();
        !table.is_empty() && unmet <= 1
    }

    fn get_imag_freqs(&self, output: &str) -> Vec<f64> {
        let mut imag_freqs = Vec::new();
        let mut in_section = false;
        for line in output.lines() {
            if line.contains("VIBRATIONAL FREQUENCIES") {
                in_section = true;
                imag_freqs.clear();
            }
            if line.contains("NORMAL MODES") {
                in_section = false;
            }
            if in_section {
                if let Some(caps) = ORCA_FREQ_RE.captures(line) {
                    if let Ok(freq) = caps[1].parse::<f64>() {
                        if freq < 0.0 {
                            imag_freqs.push(freq);
                        }
                    }
                }
            }
        }
        debug!("Found imaginary freqs {:?}", imag_freqs);
        imag_freqs
    }

    fn get_normal_mode_displacements(
        &self,
        output: &str,
        mode_number: usize,
        n_atoms: usize,
    ) -> Option<Vec<[f64; 3]>> {
        let lines: Vec<&str> = output.lines().collect();
        let mut in_section = false;
        let mut displacements = Vec::new();

        for (j, line) in lines.iter().enumerate() {
            if line.contains("NORMAL MODES") {
                in_section = true;
                displacements.clear();
            }
            if line.contains("IR SPECTRUM") {
                in_section = false;
            }
            if !in_section {
                continue;
            }
            let Some(modes) = mode_indices(line) else { continue };
            let Some(col) = modes.iter().position(|&m| m == mode_number) else { continue };

            let end = (j + 1 + 3 * n_atoms).min(lines.len());
            displacements = lines[j + 1..end]
                .iter()
                .filter_map(|row| row.split_whitespace().nth(col + 1)?.parse::<f64>().ok())
                .collect();
        }
        chunk_xyz(&displacements, n_atoms)
    }

    fn get_final_geometry(&self, output: &str, n_atoms: usize) -> Option<Geometry> {
        let lines: Vec<&str> = output.lines().collect();
        let start = lines
            .iter()
            .rposition(|l| l.contains("CARTESIAN COORDINATES (ANGSTROEM)"))?;
        let atoms: Vec<(String, [f64; 3])> = lines[start + 1..]
            .iter()
            .skip_while(|l| l.trim().starts_with('-'))
            .take_while(|l| !l.trim().is_empty())
            .filter_map(|l| {
                let tokens: Vec<&str> = l.split_whitespace().collect();
                let xyz = parse_floats(tokens.get(1..4)?);
                (tokens.len() == 4 && xyz.len() == 3).then(|| (tokens[0].to_string(), [xyz[0], xyz[1], xyz[2]]))
            })
            .collect();
        geometry_from_atoms(atoms, n_atoms)
    }
}

// ---------------------------------------------------------------------------
// xtb
// ---------------------------------------------------------------------------

const XTB_ALPB_SOLVENTS: &[&str] = &[
    "acetone", "acetonitrile", "aniline", "benzaldehyde", "benzene", "ch2cl2", "chcl3", "cs2",
    "dioxane", "dmf", "dmso", "ether", "ethylacetate", "furane", "hexandecane", "hexane",
    "methanol", "nitromethane", "octanol", "woctanol", "phenol", "toluene", "thf", "water",
];

/// xtb interface.
///
/// Keywords are command line flags (`--opt`, `--hess`). Constraints are
/// passed through an `xcontrol` file written next to the xyz input.
pub struct XtbInterface {
    /// xtb executable command (e.g., "xtb", "/path/to/xtb")
    pub command: PathBuf,
}

impl XtbInterface {
    pub fn new(command: PathBuf) -> Self {
        Self { command }
    }

    fn xcontrol_path(input_path: &Path) -> PathBuf {
        input_path.with_extension("xcontrol")
    }

    fn xcontrol_content(calc: &Calculation) -> Option<String> {
        if calc.distance_constraints.is_empty() && calc.cartesian_constraints.is_empty() {
            return None;
        }
        let mut content = String::new();
        if !calc.distance_constraints.is_empty() {
            content.push_str("$constrain\n   force constant=2\n");
            for (&(i, j), &distance) in &calc.distance_constraints {
                let _ = writeln!(content, "   distance: {}, {}, {:.4}", i + 1, j + 1, distance);
            }
        }
        if !calc.cartesian_constraints.is_empty() {
            let atoms: Vec<String> = calc
                .cartesian_constraints
                .iter()
                .map(|a| (a + 1).to_string())
                .collect();
            let _ = writeln!(content, "$fix\n   atoms: {}", atoms.join(","));
        }
        content.push_str("$end\n");
        Some(content)
    }
}

impl QMInterface for XtbInterface {
    fn program(&self) -> QMProgram {
        QMProgram::Xtb
    }

    fn is_available(&self) -> bool {
        find_executable(&self.command).is_some()
    }

    fn available_solvents(&self) -> &'static [&'static str] {
        XTB_ALPB_SOLVENTS
    }

    fn input_filename(&self, job_name: &str) -> String {
        format!("{}_xtb.xyz", job_name)
    }

    fn output_filename(&self, job_name: &str) -> String {
        format!("{}_xtb.out", job_name)
    }

    fn write_input(&self, calc: &Calculation, path: &Path) -> Result<()> {
        crate::io::write_xyz(&calc.geometry, path, &calc.name)?;
        if let Some(xcontrol) = Self::xcontrol_content(calc) {
            fs::write(Self::xcontrol_path(path), xcontrol)?;
        }
        Ok(())
    }

    fn run_calculation(
        &self,
        calc: &Calculation,
        input_path: &Path,
        output_path: &Path,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let mut command = Command::new(&self.command);
        command.arg(file_name(input_path)?);
        if calc.n_atoms() > 1 {
            command.args(&calc.keywords);
        }
        command
            .arg("--chrg")
            .arg(calc.charge.to_string())
            .arg("--uhf")
            .arg((calc.mult - 1).to_string())
            .arg("-P")
            .arg(calc.n_cores.to_string());
        if let Some(solvent) = &calc.solvent {
            command.arg("--alpb").arg(solvent);
        }
        let xcontrol = Self::xcontrol_path(input_path);
        if xcontrol.exists() {
            command.arg("--input").arg(file_name(&xcontrol)?);
        }
        command.current_dir(working_dir(input_path));
        execute(command, &calc.name, output_path, timeout)
    }

    fn terminated_normally(&self, output: &str) -> bool {
        output
            .lines()
            .rev()
            .take(50)
            .any(|line| line.contains("* finished run"))
    }

    fn get_energy(&self, output: &str) -> Option<f64> {
        output
            .lines()
            .rev()
            .find_map(|line| XTB_ENERGY_RE.captures(line))
            .and_then(|caps| caps[1].parse().ok())
    }

    fn optimisation_converged(&self, output: &str) -> bool {
        output.contains("GEOMETRY OPTIMIZATION CONVERGED")
    }

    fn optimisation_nearly_converged(&self, output: &str) -> bool {
        self.optimisation_converged(output)
    }

    fn get_imag_freqs(&self, output: &str) -> Vec<f64> {
        let mut imag_freqs = Vec::new();
        let mut in_section = false;
        for line in output.lines() {
            if line.contains("projected vibrational frequencies") {
                in_section = true;
                imag_freqs.clear();
                continue;
            }
            if in_section {
                let trimmed = line.trim_start();
                if let Some(values) = trimmed.strip_prefix("eigval :") {
                    let tokens: Vec<&str> = values.split_whitespace().collect();
                    imag_freqs.extend(parse_floats(&tokens).into_iter().filter(|f| *f < 0.0));
                } else if !trimmed.is_empty() {
                    in_section = false;
                }
            }
        }
        imag_freqs
    }

    fn get_normal_mode_displacements(
        &self,
        _output: &str,
        _mode_number: usize,
        _n_atoms: usize,
    ) -> Option<Vec<[f64; 3]>> {
        // xtb writes normal modes to a separate binary file
        None
    }

    fn get_final_geometry(&self, output: &str, n_atoms: usize) -> Option<Geometry> {
        let lines: Vec<&str> = output.lines().collect();
        let start = lines.iter().rposition(|l| l.contains("final structure:"))?;
        // skip the banner, the atom count and the comment line
        let body = lines[start + 1..]
            .iter()
            .skip_while(|l| l.trim().starts_with('=') || l.trim().is_empty())
            .skip(2);
        let atoms: Vec<(String, [f64; 3])> = body
            .take(n_atoms)
            .filter_map(|l| {
                let tokens: Vec<&str> = l.split_whitespace().collect();
                let xyz = parse_floats(tokens.get(1..4)?);
                (xyz.len() == 3).then(|| (tokens[0].to_string(), [xyz[0], xyz[1], xyz[2]]))
            })
            .collect();
        geometry_from_atoms(atoms, n_atoms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::CalcResult;
    use crate::config::Config;

    fn h2_calc(name: &str, keywords: &[&str]) -> Calculation {
        let geometry = Geometry::from_atoms(&[("H", 0.0, 0.0, 0.0), ("H", 0.7, 0.0, 0.0)]);
        let keywords = keywords.iter().map(|k| k.to_string()).collect();
        Calculation::new(name, geometry, 0, 1, keywords, &Config::default())
    }

    const NWCHEM_FREQ_OUTPUT: &str = "\
             NORMAL MODE EIGENVECTORS IN CARTESIAN COORDINATES
             (Projected Frequencies expressed in cm-1)

                    1           2           3           4           5           6

 P.Frequency    -1523.40       -0.00        0.00        0.00        0.00        0.00

           1    -0.70710     0.10000     0.00000     0.00000     0.00000     0.00000
           2     0.00000     0.00000     0.00000     0.00000     0.00000     0.00000
           3     0.00000     0.00000     0.00000     0.00000     0.00000     0.00000
           4     0.70710    -0.10000     0.00000     0.00000     0.00000     0.00000
           5     0.00000     0.00000     0.00000     0.00000     0.00000     0.00000
           6     0.00000     0.00000     0.00000     0.00000     0.00000     0.00000
 ----------------------------------------------------------------------------
 Total DFT energy =     -1.166529478500
 CITATION
";

    #[test]
    fn test_nwchem_parsers() {
        let nw = NWChemInterface::new(PathBuf::from("nwchem"));
        assert!(nw.terminated_normally(NWCHEM_FREQ_OUTPUT));
        assert_eq!(nw.get_energy(NWCHEM_FREQ_OUTPUT), Some(-1.166529478500));
        assert_eq!(nw.get_imag_freqs(NWCHEM_FREQ_OUTPUT), vec![-1523.40]);

        let modes = nw
            .get_normal_mode_displacements(NWCHEM_FREQ_OUTPUT, 6, 2)
            .unwrap();
        assert_eq!(modes, vec![[-0.70710, 0.0, 0.0], [0.70710, 0.0, 0.0]]);
        assert!(nw.get_normal_mode_displacements(NWCHEM_FREQ_OUTPUT, 20, 2).is_none());
        assert!(nw.get_normal_mode_displacements(NWCHEM_FREQ_OUTPUT, 3, 2).is_none());
    }

    #[test]
    fn test_nwchem_imaginary_mode_is_listed_first() {
        let nw = NWChemInterface::new(PathBuf::from("nwchem"));
        let result = CalcResult::from_output(&nw, "h2_hess", NWCHEM_FREQ_OUTPUT, 2);
        assert_eq!(result.imag_freqs, vec![-1523.40]);
        assert_eq!(
            result.imag_mode,
            Some(vec![[-0.70710, 0.0, 0.0], [0.70710, 0.0, 0.0]])
        );
    }

    #[test]
    fn test_nwchem_convergence_and_geometry() {
        let nw = NWChemInterface::new(PathBuf::from("nwchem"));
        let output = "\
@ Step       Energy      Delta E   Gmax     Grms     Xrms     Xmax   Walltime
@    3      -1.16652948 -1.2D-06  0.00001  0.00001  0.00002  0.00003      1.2
                                     ok       ok       ok       ok
      Optimization converged

                         Geometry \"geometry\" -> \"geometry\"
 Output coordinates in angstroms (scale by  1.889725989 to convert to a.u.)

  No.       Tag          Charge          X              Y              Z
 ---- ---------------- ---------- -------------- -------------- --------------
    1 H                    1.0000     0.00000000     0.00000000     0.37100000
    2 H                    1.0000     0.00000000     0.00000000    -0.37100000

      Atomic Mass
";
        assert!(nw.optimisation_converged(output));
        assert!(nw.optimisation_nearly_converged(output));
        let geom = nw.get_final_geometry(output, 2).unwrap();
        assert_eq!(geom.elements, vec!["H", "H"]);
        assert!((geom.distance(0, 1) - 0.742).abs() < 1e-9);
        assert!(nw.get_final_geometry(output, 3).is_none());
    }

    #[test]
    fn test_nwchem_input_with_constraints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h2_nwchem.nw");
        let mut calc = h2_calc(
            "h2",
            &["dft\n  xc pbe0\nend", "task dft optimize"],
        );
        calc.distance_constraints.insert((0, 1), 1.2);
        calc.cartesian_constraints = vec![0];

        let nw = NWChemInterface::new(PathBuf::from("nwchem"));
        nw.write_input(&calc, &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();

        assert!(content.starts_with("start h2_nwchem\necho\n"));
        assert!(content.contains("geometry noautoz\n"));
        assert!(content.contains("  zcoord\n    bond 1 2\n  end\n"));
        assert!(content.contains("  spring bond 1 2 10 1.200\n"));
        assert!(content.contains("  fix atom 1\n"));
        assert!(content.contains("dft\n  mult 1\n  xc pbe0\nend"));
        assert!(content.contains("memory 4000 mb"));
    }

    #[test]
    fn test_nwchem_single_atom_optimisation_becomes_energy() {
        let geometry = Geometry::from_atoms(&[("H", 0.0, 0.0, 0.0)]);
        let calc = Calculation::new(
            "h",
            geometry,
            0,
            2,
            vec!["task dft optimize".to_string(), "scf\nend".to_string()],
            &Config::default(),
        );
        let keywords = NWChemInterface::prepare_keywords(&calc);
        assert_eq!(keywords[0], "task dft energy");
        assert_eq!(keywords[1], "scf\n  nopen 1\nend");
    }

    #[test]
    fn test_atom_ranges() {
        assert_eq!(atom_ranges(&[0, 1, 2, 3, 5, 6]), vec!["1:4", "6", "7"]);
        assert_eq!(atom_ranges(&[4]), vec!["5"]);
    }

    const ORCA_OUTPUT: &str = "\
---------------------------------
CARTESIAN COORDINATES (ANGSTROEM)
---------------------------------
  H      0.000000    0.000000    0.000000
  H      0.740000    0.000000    0.000000

FINAL SINGLE POINT ENERGY        -1.169312345678
-----------------------
VIBRATIONAL FREQUENCIES
-----------------------
   0:         0.00 cm**-1
   5:         0.00 cm**-1
   6:     -1425.15 cm**-1 ***imaginary mode***

------------
NORMAL MODES
------------
                  0          1          2          3          4          5
      0       0.000000   0.000000   0.000000   0.000000   0.000000   0.000000
      1       0.000000   0.000000   0.000000   0.000000   0.000000   0.000000
      2       0.000000   0.000000   0.000000   0.000000   0.000000   0.000000
      3       0.000000   0.000000   0.000000   0.000000   0.000000   0.000000
      4       0.000000   0.000000   0.000000   0.000000   0.000000   0.000000
      5       0.000000   0.000000   0.000000   0.000000   0.000000   0.000000
                  6
      0      -0.707107
      1       0.000000
      2       0.000000
      3       0.707107
      4       0.000000
      5       0.000000

-----------
IR SPECTRUM
-----------
                             ****ORCA TERMINATED NORMALLY****
";

    #[test]
    fn test_orca_parsers() {
        let orca = OrcaInterface::new(PathBuf::from("orca"));
        assert!(orca.terminated_normally(ORCA_OUTPUT));
        assert_eq!(orca.get_energy(ORCA_OUTPUT), Some(-1.169312345678));
        assert_eq!(orca.get_imag_freqs(ORCA_OUTPUT), vec![-1425.15]);
        let modes = orca.get_normal_mode_displacements(ORCA_OUTPUT, 6, 2).unwrap();
        assert_eq!(modes[0], [-0.707107, 0.0, 0.0]);
        assert_eq!(modes[1], [0.707107, 0.0, 0.0]);
        let geom = orca.get_final_geometry(ORCA_OUTPUT, 2).unwrap();
        assert!((geom.distance(0, 1) - 0.74).abs() < 1e-9);
    }

    #[test]
    fn test_orca_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h2_orca.inp");
        let mut calc = h2_calc("h2", &["OptTS", "Freq", "PBE0", "def2-SVP"]);
        calc.distance_constraints.insert((0, 1), 0.9);
        calc.solvent = Some("water".to_string());

        let orca = OrcaInterface::new(PathBuf::from("orca"));
        orca.write_input(&calc, &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("! OptTS Freq PBE0 def2-SVP CPCM\n"));
        assert!(content.contains("%pal nprocs 4 end"));
        assert!(content.contains("SMDsolvent \"water\""));
        assert!(content.contains(" Calc_Hess true\n"));
        assert!(content.contains("  { B 0 1 0.9000 C }\n"));
        assert!(content.contains("* xyz 0 1\n"));
        assert!(content.trim_end().ends_with('*'));
    }

    #[test]
    fn test_xtb_parsers_and_xcontrol() {
        let xtb = XtbInterface::new(PathBuf::from("xtb"));
        let output = "\
          | TOTAL ENERGY               -0.982686950 Eh   |
   *** GEOMETRY OPTIMIZATION CONVERGED AFTER 3 ITERATIONS ***
 projected vibrational frequencies (cm⁻¹)
eigval :       -0.00     0.00     0.00     0.00     0.00     0.00
eigval :     -812.50
 reduced masses (amu)
 ================
  final structure:
 ================
2
 xtb: 6.4.1
H            0.00000000000000        0.00000000000000        0.00000000000000
H            0.74000000000000        0.00000000000000        0.00000000000000
 * finished run on 2024/01/01 at 00:00:00.000
";
        assert!(xtb.terminated_normally(output));
        assert_eq!(xtb.get_energy(output), Some(-0.982686950));
        assert!(xtb.optimisation_converged(output));
        assert_eq!(xtb.get_imag_freqs(output), vec![-812.50]);
        assert!(xtb.get_normal_mode_displacements(output, 6, 2).is_none());
        let geom = xtb.get_final_geometry(output, 2).unwrap();
        assert!((geom.distance(0, 1) - 0.74).abs() < 1e-9);

        let mut calc = h2_calc("h2", &["--opt"]);
        assert!(XtbInterface::xcontrol_content(&calc).is_none());
        calc.distance_constraints.insert((0, 1), 1.1);
        let xcontrol = XtbInterface::xcontrol_content(&calc).unwrap();
        assert!(xcontrol.contains("distance: 1, 2, 1.1000"));
    }

    #[test]
    fn test_registry_and_symbols() {
        let mut method = MethodSettings::for_program(QMProgram::NWChem);
        method.path = Some(PathBuf::from("/nonexistent/dir/nwchem"));
        let interface = create_interface(&method);
        assert_eq!(interface.program(), QMProgram::NWChem);
        assert!(!interface.is_available());
        assert_eq!(interface.input_filename("job"), "job_nwchem.nw");

        assert_eq!(normalise_symbol("CL"), "Cl");
        assert_eq!(normalise_symbol("h1"), "H");
    }
}
