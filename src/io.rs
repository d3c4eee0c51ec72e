//! File I/O utilities for geometries and result files.
//!
//! This module reads and writes XYZ files and serialises result structures
//! to pretty-printed JSON.

use crate::geometry::Geometry;
use serde::Serialize;
use std::fs;
use std::io::{Error, ErrorKind, Result};
use std::path::Path;

/// Writes a molecular geometry to an XYZ file.
///
/// The XYZ format consists of:
/// 1. Number of atoms
/// 2. A comment line (the `title`)
/// 3. Lines for each atom: Element X Y Z (Angstrom)
///
/// # Examples
///
/// ```
/// use tsfinder::geometry::Geometry;
/// use tsfinder::io;
///
/// fn main() -> std::io::Result<()> {
///     let dir = std::env::temp_dir().join("tsfinder_io_doctest");
///     std::fs::create_dir_all(&dir)?;
///     let path = dir.join("h2.xyz");
///
///     let geometry = Geometry::from_atoms(&[("H", 0.0, 0.0, 0.0), ("H", 0.74, 0.0, 0.0)]);
///     io::write_xyz(&geometry, &path, "hydrogen")?;
///     assert_eq!(io::read_xyz(&path)?, geometry);
///     std::fs::remove_dir_all(&dir)?;
///     Ok(())
/// }
/// ```
pub fn write_xyz(geom: &Geometry, path: &Path, title: &str) -> Result<()> {
    let mut content = format!("{}\n{}\n", geom.num_atoms, title);

    for i in 0..geom.num_atoms {
        let coords = geom.get_atom_coords(i);
        content.push_str(&format!(
            "{}  {:.8}  {:.8}  {:.8}\n",
            geom.elements[i], coords[0], coords[1], coords[2]
        ));
    }

    fs::write(path, content)
}

/// Reads the first structure of an XYZ file.
pub fn read_xyz(path: &Path) -> Result<Geometry> {
    let content = fs::read_to_string(path)?;
    parse_xyz(&content).map_err(|msg| Error::new(ErrorKind::InvalidData, format!("{}: {}", path.display(), msg)))
}

/// Parses XYZ text: atom count, comment line, then `El x y z` lines.
pub fn parse_xyz(content: &str) -> std::result::Result<Geometry, String> {
    let mut lines = content.lines();
    let n_atoms: usize = lines
        .next()
        .and_then(|l| l.trim().parse().ok())
        .ok_or_else(|| "first line must hold the number of atoms".to_string())?;
    lines.next();

    let mut elements = Vec::with_capacity(n_atoms);
    let mut coords = Vec::with_capacity(3 * n_atoms);
    for (k, line) in lines.take(n_atoms).enumerate() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(format!("atom line {} is incomplete: '{}'", k + 1, line.trim()));
        }
        elements.push(parts[0].to_string());
        for value in &parts[1..4] {
            coords.push(
                value
                    .parse::<f64>()
                    .map_err(|_| format!("invalid coordinate '{}' on atom line {}", value, k + 1))?,
            );
        }
    }
    if elements.len() != n_atoms {
        return Err(format!("expected {} atoms, found {}", n_atoms, elements.len()));
    }
    Ok(Geometry::new(elements, coords))
}

/// Writes any serialisable value as pretty-printed JSON.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)
}
