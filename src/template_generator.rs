use crate::bonds::atomic_number;
use crate::io::read_xyz;
use crate::molecule::calc_multiplicity;
use std::fs;
use std::path::{Path, PathBuf};

/// Template generator for creating input files from geometry files
///
/// The geometry becomes the reactant block; a placeholder product block
/// points to `<stem>_product.xyz`. Charge 0 is assumed and the multiplicity
/// is guessed from the electron count.
pub fn generate_template_from_file<P: AsRef<Path>>(
    geometry_file: P,
) -> Result<String, Box<dyn std::error::Error>> {
    let geometry_file = geometry_file.as_ref();

    if !geometry_file.exists() {
        return Err(format!("File not found: {}", geometry_file.display()).into());
    }
    if !is_supported_format(geometry_file) {
        return Err(format!("Unsupported file format: {}", geometry_file.display()).into());
    }

    let geometry = read_xyz(geometry_file)?;
    let n_electrons: u32 = geometry
        .elements
        .iter()
        .map(|el| atomic_number(el).ok_or_else(|| format!("Unknown element: {}", el)))
        .sum::<Result<u32, String>>()?;
    let mult = calc_multiplicity((n_electrons % 2) as usize)?;

    let stem = geometry_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("molecule");
    let geom_filename = geometry_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("geometry.xyz");

    Ok(generate_template(stem, geom_filename, mult))
}

/// Generate the template input file content
fn generate_template(stem: &str, geom_filename: &str, mult: u32) -> String {
    format!(
        r#"# Reaction name; used as prefix for every job and output file.
# Defaults to reactant names--product names.
name = {stem}_reaction

# Implicit solvent for every calculation (optional)
#solvent = water

# Programs for the low-level scans and the high-level TS optimisation
# (xtb, orca, nwchem). Further settings are read from tsfinder.cfg.
low_program = xtb
high_program = orca
n_cores = 4
max_workers = 1       # rearrangements searched concurrently
max_bond_changes = 4  # forming plus breaking bonds considered
work_dir = tsfinder_jobs

# One block per reactant and product:  *REACTANT <name> charge=<q> mult=<m>
# Atoms are 'El x y z' lines (Angstrom) or '@file.xyz'.
# Optional 'bond i j' lines (0-based) give the bonds explicitly.
*REACTANT {stem} charge=0 mult={mult}
@{geom_filename}
*

*PRODUCT {stem}_product charge=0 mult={mult}
@{stem}_product.xyz
*
"#
    )
}

/// Write template to file
pub fn write_template_to_file<P: AsRef<Path>>(
    template: &str,
    output_path: P,
) -> Result<(), Box<dyn std::error::Error>> {
    let output_path = output_path.as_ref();

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(output_path, template)?;
    Ok(())
}

/// Get default output filename based on input geometry file
pub fn get_default_output_path<P: AsRef<Path>>(geometry_file: P) -> PathBuf {
    let geometry_file = geometry_file.as_ref();
    let stem = geometry_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("template");

    PathBuf::from(format!("{}.inp", stem))
}

/// Validate file extension
pub fn is_supported_format(path: &Path) -> bool {
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => ext.eq_ignore_ascii_case("xyz"),
        None => false,
    }
}
