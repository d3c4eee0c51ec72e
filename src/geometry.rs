//! Core geometry data structures for molecular representations.
//!
//! This module provides the fundamental Cartesian representation used by every
//! other part of the crate:
//!
//! - [`Geometry`]: Element symbols and a flat coordinate vector
//! - [`SerializableGeometry`]: JSON-friendly mirror of [`Geometry`]
//!
//! All coordinates are in Angstroms.

use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};

/// Represents a molecular geometry with atomic elements and Cartesian coordinates.
///
/// The `Geometry` struct stores the chemical elements of each atom and their 3D
/// positions using a flat representation where coordinates are stored as a
/// single-dimensional vector in the order [x1, y1, z1, x2, y2, z2, ...].
///
/// A `Geometry` is a by-value snapshot: TS guesses, scan points and calculation
/// results each own their own copy, so nothing downstream mutates a geometry
/// that is still referenced elsewhere.
///
/// # Examples
///
/// ```
/// use tsfinder::geometry::Geometry;
///
/// let elements = vec!["O".to_string(), "H".to_string(), "H".to_string()];
/// let coords = vec![
///     0.0, 0.0, 0.0,
///     0.757, 0.586, 0.0,
///     -0.757, 0.586, 0.0,
/// ];
///
/// let geometry = Geometry::new(elements, coords);
/// assert_eq!(geometry.num_atoms, 3);
/// assert!((geometry.distance(0, 1) - 0.9571).abs() < 1e-3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// Chemical element symbols for each atom in order
    pub elements: Vec<String>,
    /// Flattened Cartesian coordinates [x1, y1, z1, x2, y2, z2, ...] in Angstroms
    pub coords: DVector<f64>,
    /// Number of atoms in the molecule
    pub num_atoms: usize,
}

impl Geometry {
    /// Create a new `Geometry` from element list and coordinate vector.
    ///
    /// # Panics
    ///
    /// Panics if `coords.len() != elements.len() * 3`, ensuring data consistency.
    pub fn new(elements: Vec<String>, coords: Vec<f64>) -> Self {
        let num_atoms = elements.len();
        assert_eq!(coords.len(), num_atoms * 3);
        Self {
            elements,
            coords: DVector::from_vec(coords),
            num_atoms,
        }
    }

    /// Builds a geometry from `(element, x, y, z)` tuples.
    pub fn from_atoms(atoms: &[(&str, f64, f64, f64)]) -> Self {
        let elements = atoms.iter().map(|a| a.0.to_string()).collect();
        let coords = atoms.iter().flat_map(|a| [a.1, a.2, a.3]).collect();
        Self::new(elements, coords)
    }

    /// Get the Cartesian coordinates of a specific atom.
    pub fn get_atom_coords(&self, atom_idx: usize) -> [f64; 3] {
        let i = atom_idx * 3;
        [self.coords[i], self.coords[i + 1], self.coords[i + 2]]
    }

    /// Position of an atom as a nalgebra vector.
    pub fn position(&self, atom_idx: usize) -> Vector3<f64> {
        let [x, y, z] = self.get_atom_coords(atom_idx);
        Vector3::new(x, y, z)
    }

    /// Overwrites the coordinates of a single atom.
    pub fn set_atom_coords(&mut self, atom_idx: usize, xyz: [f64; 3]) {
        let i = atom_idx * 3;
        self.coords[i] = xyz[0];
        self.coords[i + 1] = xyz[1];
        self.coords[i + 2] = xyz[2];
    }

    /// Interatomic distance in Angstroms.
    pub fn distance(&self, a: usize, b: usize) -> f64 {
        (self.position(a) - self.position(b)).norm()
    }

    /// Rigidly shifts every atom by `shift`.
    pub fn translate(&mut self, shift: [f64; 3]) {
        for i in 0..self.num_atoms {
            let [x, y, z] = self.get_atom_coords(i);
            self.set_atom_coords(i, [x + shift[0], y + shift[1], z + shift[2]]);
        }
    }

    /// Minimum and maximum x coordinate, `None` for an empty geometry.
    pub fn x_extent(&self) -> Option<(f64, f64)> {
        (0..self.num_atoms)
            .map(|i| self.coords[i * 3])
            .fold(None, |acc, x| match acc {
                None => Some((x, x)),
                Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
            })
    }

    /// Appends the atoms of `other` after the atoms of `self`.
    pub fn concatenated(&self, other: &Geometry) -> Geometry {
        let mut elements = self.elements.clone();
        elements.extend(other.elements.iter().cloned());
        let mut coords: Vec<f64> = self.coords.iter().copied().collect();
        coords.extend(other.coords.iter().copied());
        Geometry::new(elements, coords)
    }

    /// Returns `true` when both geometries list the same elements in the same order.
    pub fn same_atoms(&self, other: &Geometry) -> bool {
        self.elements == other.elements
    }
}

/// Serializable wrapper for Geometry.
///
/// Since `Geometry` contains a `DVector<f64>` which doesn't directly serialize,
/// this wrapper converts the vector to a plain `Vec<f64>` for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableGeometry {
    /// Chemical element symbols
    pub elements: Vec<String>,
    /// Flattened coordinates in Angstroms
    pub coords: Vec<f64>,
}

impl From<&Geometry> for SerializableGeometry {
    fn from(geom: &Geometry) -> Self {
        Self {
            elements: geom.elements.clone(),
            coords: geom.coords.iter().copied().collect(),
        }
    }
}

impl From<SerializableGeometry> for Geometry {
    fn from(ser_geom: SerializableGeometry) -> Self {
        Geometry::new(ser_geom.elements, ser_geom.coords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h2() -> Geometry {
        Geometry::from_atoms(&[("H", 0.0, 0.0, 0.0), ("H", 0.7, 0.0, 0.0)])
    }

    #[test]
    fn test_distance_and_coords() {
        let geom = h2();
        assert_eq!(geom.num_atoms, 2);
        assert_eq!(geom.get_atom_coords(1), [0.7, 0.0, 0.0]);
        assert!((geom.distance(0, 1) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_translate_preserves_distances() {
        let mut geom = h2();
        geom.translate([1.0, -2.0, 3.0]);
        assert_eq!(geom.get_atom_coords(0), [1.0, -2.0, 3.0]);
        assert!((geom.distance(0, 1) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_x_extent_and_concatenation() {
        let geom = h2();
        assert_eq!(geom.x_extent(), Some((0.0, 0.7)));

        let joined = geom.concatenated(&Geometry::from_atoms(&[("F", 5.0, 0.0, 0.0)]));
        assert_eq!(joined.num_atoms, 3);
        assert_eq!(joined.elements[2], "F");
        assert_eq!(joined.get_atom_coords(2), [5.0, 0.0, 0.0]);

        let empty = Geometry::new(Vec::new(), Vec::new());
        assert_eq!(empty.x_extent(), None);
    }

    #[test]
    fn test_serializable_round_trip_keeps_atoms() {
        let geom = h2();
        let ser = SerializableGeometry::from(&geom);
        let json = serde_json::to_string(&ser).unwrap();
        let back: Geometry = serde_json::from_str::<SerializableGeometry>(&json).unwrap().into();
        assert_eq!(back, geom);
    }
}
