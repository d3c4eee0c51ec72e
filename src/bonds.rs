//! Covalent radii and reference bond lengths.
//!
//! Bonding is decided per element pair from tabulated average bond lengths
//! ([`avg_bond_length`]), with covalent radius sums ([`covalent_radius`]) for
//! pairs missing from the table. The molecular graph builder and the
//! reference bond list ([`get_xyz_bond_list`]) share this threshold, so they
//! agree on any geometry.

use crate::geometry::Geometry;

/// Radius used for elements missing from the table (Angstrom).
const DEFAULT_RADIUS: f64 = 1.5;

/// Single-bond covalent radius in Angstrom (Cordero et al. 2008).
pub fn covalent_radius(element: &str) -> f64 {
    match element {
        "H" => 0.31,
        "He" => 0.28,
        "Li" => 1.28,
        "Be" => 0.96,
        "B" => 0.84,
        "C" => 0.76,
        "N" => 0.71,
        "O" => 0.66,
        "F" => 0.57,
        "Ne" => 0.58,
        "Na" => 1.66,
        "Mg" => 1.41,
        "Al" => 1.21,
        "Si" => 1.11,
        "P" => 1.07,
        "S" => 1.05,
        "Cl" => 1.02,
        "Ar" => 1.06,
        "K" => 2.03,
        "Ca" => 1.76,
        "Fe" => 1.32,
        "Co" => 1.26,
        "Ni" => 1.24,
        "Cu" => 1.32,
        "Zn" => 1.22,
        "Ga" => 1.22,
        "Ge" => 1.20,
        "As" => 1.19,
        "Se" => 1.20,
        "Br" => 1.20,
        "Kr" => 1.16,
        "Rh" => 1.42,
        "Pd" => 1.39,
        "Ag" => 1.45,
        "Sn" => 1.39,
        "I" => 1.39,
        "Pt" => 1.36,
        "Au" => 1.36,
        _ => DEFAULT_RADIUS,
    }
}

/// Atomic number, `None` for symbols missing from the table.
pub fn atomic_number(element: &str) -> Option<u32> {
    const SYMBOLS: [&str; 54] = [
        "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S",
        "Cl", "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga",
        "Ge", "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd",
        "Ag", "Cd", "In", "Sn", "Sb", "Te", "I", "Xe",
    ];
    match element {
        "Pt" => Some(78),
        "Au" => Some(79),
        _ => SYMBOLS
            .iter()
            .position(|&s| s == element)
            .map(|i| i as u32 + 1),
    }
}

/// Average equilibrium bond length between two elements in Angstrom.
///
/// Pairs missing from the table fall back to the covalent radius sum.
pub fn avg_bond_length(a: &str, b: &str) -> f64 {
    let (x, y) = if a <= b { (a, b) } else { (b, a) };
    match (x, y) {
        ("H", "H") => 0.74,
        ("C", "H") => 1.09,
        ("H", "N") => 1.01,
        ("H", "O") => 0.96,
        ("F", "H") => 0.92,
        ("Cl", "H") => 1.27,
        ("Br", "H") => 1.41,
        ("H", "I") => 1.61,
        ("H", "S") => 1.34,
        ("H", "P") => 1.44,
        ("B", "H") => 1.19,
        ("H", "Si") => 1.48,
        ("C", "C") => 1.54,
        ("C", "N") => 1.47,
        ("C", "O") => 1.43,
        ("C", "F") => 1.35,
        ("C", "Cl") => 1.77,
        ("Br", "C") => 1.94,
        ("C", "I") => 2.14,
        ("C", "S") => 1.82,
        ("C", "P") => 1.84,
        ("C", "Si") => 1.86,
        ("B", "C") => 1.56,
        ("N", "N") => 1.45,
        ("N", "O") => 1.40,
        ("O", "O") => 1.48,
        ("O", "S") => 1.51,
        ("O", "P") => 1.63,
        ("Cl", "Cl") => 1.99,
        ("F", "F") => 1.42,
        _ => covalent_radius(x) + covalent_radius(y),
    }
}

/// Reference bond list from average bond lengths.
///
/// A pair is bonded when its distance is below `tolerance` times the average
/// bond length for the element pair. Pairs are returned as `(i, j)` with
/// `i < j`, in ascending order.
pub fn get_xyz_bond_list(geometry: &Geometry, tolerance: f64) -> Vec<(usize, usize)> {
    let mut bonds = Vec::new();
    for i in 0..geometry.num_atoms {
        for j in (i + 1)..geometry.num_atoms {
            let limit = avg_bond_length(&geometry.elements[i], &geometry.elements[j]) * tolerance;
            if geometry.distance(i, j) < limit {
                bonds.push((i, j));
            }
        }
    }
    bonds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_numbers() {
        assert_eq!(atomic_number("H"), Some(1));
        assert_eq!(atomic_number("F"), Some(9));
        assert_eq!(atomic_number("I"), Some(53));
        assert_eq!(atomic_number("Au"), Some(79));
        assert_eq!(atomic_number("Q"), None);
    }

    #[test]
    fn test_avg_bond_length_is_symmetric() {
        assert_eq!(avg_bond_length("C", "H"), avg_bond_length("H", "C"));
        assert_eq!(avg_bond_length("F", "C"), 1.35);
    }

    #[test]
    fn test_unknown_pair_falls_back_to_radii() {
        let expected = covalent_radius("Pd") + covalent_radius("Se");
        assert!((avg_bond_length("Pd", "Se") - expected).abs() < 1e-12);
        assert_eq!(covalent_radius("Xx"), DEFAULT_RADIUS);
    }

    #[test]
    fn test_reference_bond_list_for_water() {
        let water = Geometry::from_atoms(&[
            ("O", 0.0, 0.0, 0.0),
            ("H", 0.757, 0.586, 0.0),
            ("H", -0.757, 0.586, 0.0),
        ]);
        assert_eq!(get_xyz_bond_list(&water, 1.25), vec![(0, 1), (0, 2)]);
    }
}
