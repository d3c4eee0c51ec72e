//! Reactant and product molecules.
//!
//! A [`Molecule`] owns its geometry, charge, spin multiplicity, optional
//! solvent, last computed energy and its molecular graph. Whether it is a
//! reactant or a product is a [`Role`] tag rather than a separate type.
//!
//! # Graph consistency
//!
//! The graph is built from pairwise bond thresholds ([`build_graph`]) and
//! then cross-checked:
//!
//! - against the explicit bond list when one is given, or
//! - against the reference bond list from the same thresholds otherwise.
//!
//! A disagreement is fatal for the molecule. Bond rearrangement reasoning
//! assumes graph edges and chemical bonds coincide exactly.
//!
//! # Energies and geometries
//!
//! [`Molecule::optimise`] and [`Molecule::single_point`] replace the
//! geometry and energy only when the external job succeeds; on failure the
//! molecule is left exactly as it was.

use crate::bonds::atomic_number;
use crate::calculation::Calculation;
use crate::config::{Config, KeywordKind, MethodLevel};
use crate::geometry::Geometry;
use crate::graph::{build_graph, check_bond_agreement, GraphError, MolecularGraph};
use crate::naming::JobNaming;
use crate::qm_interface::{QMError, QMInterface};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised when a molecule cannot be represented.
#[derive(Error, Debug)]
pub enum MoleculeError {
    #[error("Molecule {0} has no atoms")]
    Empty(String),

    #[error("Molecule {name}: spin multiplicity {mult} is not supported (only singlets and doublets)")]
    UnsupportedMultiplicity { name: String, mult: u32 },

    #[error("Diradicals are not supported ({0} radical electrons)")]
    Diradical(usize),

    #[error("Molecule {name}: {source}")]
    Graph {
        name: String,
        #[source]
        source: GraphError,
    },
}

/// Which side of the reaction a molecule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Reactant,
    Product,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Reactant => f.write_str("reactant"),
            Role::Product => f.write_str("product"),
        }
    }
}

/// Spin multiplicity for a number of unpaired electrons.
pub fn calc_multiplicity(n_radical_electrons: usize) -> Result<u32, MoleculeError> {
    match n_radical_electrons {
        0 => Ok(1),
        1 => Ok(2),
        n => Err(MoleculeError::Diradical(n)),
    }
}

/// A reactant or product molecule.
#[derive(Debug, Clone)]
pub struct Molecule {
    pub name: String,
    pub role: Role,
    pub geometry: Geometry,
    pub charge: i32,
    pub mult: u32,
    pub solvent: Option<String>,
    /// Last computed energy in Hartree
    pub energy: Option<f64>,
    pub graph: MolecularGraph,
}

impl Molecule {
    /// Builds a molecule and its graph.
    ///
    /// With `bonds`, the explicit list defines the graph and must contain
    /// as many bonds as are detected from the coordinates.
    pub fn new(
        name: &str,
        role: Role,
        geometry: Geometry,
        charge: i32,
        mult: u32,
        bonds: Option<&[(usize, usize)]>,
        tolerance: f64,
    ) -> Result<Self, MoleculeError> {
        if geometry.num_atoms == 0 {
            return Err(MoleculeError::Empty(name.to_string()));
        }
        if mult == 0 || mult > 2 {
            return Err(MoleculeError::UnsupportedMultiplicity {
                name: name.to_string(),
                mult,
            });
        }
        check_spin_parity(name, &geometry, charge, mult);

        let graph_error = |source| MoleculeError::Graph {
            name: name.to_string(),
            source,
        };
        let detected = build_graph(&geometry, tolerance);
        let graph = match bonds {
            Some(bonds) => {
                let explicit = MolecularGraph::with_bonds(&geometry.elements, bonds).map_err(graph_error)?;
                if explicit.n_bonds() != detected.n_bonds() {
                    return Err(graph_error(GraphError::BondCountMismatch {
                        graph_bonds: detected.n_bonds(),
                        expected: explicit.n_bonds(),
                    }));
                }
                explicit
            }
            None => {
                check_bond_agreement(&detected, &geometry, tolerance).map_err(graph_error)?;
                detected
            }
        };

        Ok(Self {
            name: name.to_string(),
            role,
            geometry,
            charge,
            mult,
            solvent: None,
            energy: None,
            graph,
        })
    }

    pub fn with_solvent(mut self, solvent: Option<String>) -> Self {
        self.solvent = solvent;
        self
    }

    pub fn n_atoms(&self) -> usize {
        self.geometry.num_atoms
    }

    pub fn n_bonds(&self) -> usize {
        self.graph.n_bonds()
    }

    /// Copy of the graph with `active_bonds` flagged, adding absent edges.
    pub fn active_graph(&self, active_bonds: &[(usize, usize)]) -> MolecularGraph {
        self.graph.with_active_bonds(active_bonds)
    }

    fn calculation(&self, job: &str, keywords: &[String], config: &Config) -> Calculation {
        Calculation::new(job, self.geometry.clone(), self.charge, self.mult, keywords.to_vec(), config)
            .with_solvent(self.solvent.clone())
    }

    /// Optimises the geometry at `level`.
    ///
    /// The geometry and energy are replaced only when the job terminated
    /// normally and both could be parsed.
    pub fn optimise(
        &mut self,
        engine: &dyn QMInterface,
        config: &Config,
        level: MethodLevel,
    ) -> Result<(), QMError> {
        let job = format!("{}_{}", JobNaming::molecule_opt(&self.name), level.tag());
        let calc = self.calculation(&job, config.keywords(level, KeywordKind::Opt), config);
        let result = calc.run(engine, config)?;
        let (geometry, energy) = result
            .geometry_and_energy()
            .ok_or_else(|| QMError::Calculation(format!("Optimisation of {} failed", self.name)))?;
        self.geometry = geometry;
        self.energy = Some(energy);
        info!("Optimised {} {}: E = {:.6} Ha", self.role, self.name, energy);
        Ok(())
    }

    /// Computes a single point energy at `level` without moving the atoms.
    pub fn single_point(
        &mut self,
        engine: &dyn QMInterface,
        config: &Config,
        level: MethodLevel,
    ) -> Result<(), QMError> {
        let job = format!("{}_{}", JobNaming::molecule_sp(&self.name), level.tag());
        let calc = self.calculation(&job, config.keywords(level, KeywordKind::SinglePoint), config);
        let result = calc.run(engine, config)?;
        match (result.terminated_normally, result.energy) {
            (true, Some(energy)) => {
                self.energy = Some(energy);
                Ok(())
            }
            _ => Err(QMError::Calculation(format!(
                "Single point energy of {} failed",
                self.name
            ))),
        }
    }
}

/// Warns when the electron count and multiplicity have different parity.
fn check_spin_parity(name: &str, geometry: &Geometry, charge: i32, mult: u32) {
    let Some(n_protons) = geometry
        .elements
        .iter()
        .map(|el| atomic_number(el))
        .sum::<Option<u32>>()
    else {
        return;
    };
    let n_electrons = n_protons as i64 - charge as i64;
    if n_electrons.rem_euclid(2) != (mult as i64 - 1).rem_euclid(2) {
        warn!(
            "Molecule {} has {} electrons, which is inconsistent with spin multiplicity {}",
            name, n_electrons, mult
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water() -> Geometry {
        Geometry::from_atoms(&[
            ("O", 0.0, 0.0, 0.0),
            ("H", 0.757, 0.586, 0.0),
            ("H", -0.757, 0.586, 0.0),
        ])
    }

    #[test]
    fn test_graph_from_coordinates() {
        let mol = Molecule::new("water", Role::Reactant, water(), 0, 1, None, 1.25).unwrap();
        assert_eq!(mol.n_bonds(), 2);
        assert!(mol.graph.has_bond(0, 1));
        assert!(!mol.graph.has_bond(1, 2));
        assert_eq!(mol.energy, None);
    }

    #[test]
    fn test_near_threshold_diatomics_are_consistent() {
        let diatomic = |el: &str, r: f64| Geometry::from_atoms(&[(el, 0.0, 0.0, 0.0), (el, r, 0.0, 0.0)]);
        // stretched but still bonded: 1.25 x 1.42 = 1.775 and 1.25 x 0.74 = 0.925
        for (el, r) in [("F", 1.43), ("F", 1.77), ("H", 0.78), ("H", 0.92)] {
            let mol = Molecule::new("x2", Role::Reactant, diatomic(el, r), 0, 1, None, 1.25).unwrap();
            assert_eq!(mol.n_bonds(), 1, "{} at {}", el, r);
        }
        for (el, r) in [("F", 1.78), ("H", 0.93)] {
            let mol = Molecule::new("x2", Role::Reactant, diatomic(el, r), 0, 1, None, 1.25).unwrap();
            assert_eq!(mol.n_bonds(), 0, "{} at {}", el, r);
        }
    }

    #[test]
    fn test_explicit_bonds_must_match_detected_count() {
        let ok = Molecule::new("water", Role::Product, water(), 0, 1, Some(&[(0, 1), (0, 2)]), 1.25);
        assert!(ok.is_ok());

        let bad = Molecule::new("water", Role::Product, water(), 0, 1, Some(&[(0, 1)]), 1.25);
        assert!(matches!(
            bad,
            Err(MoleculeError::Graph {
                source: GraphError::BondCountMismatch { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_unsupported_chemistry_is_rejected() {
        assert!(matches!(
            Molecule::new("o2", Role::Reactant, water(), 0, 3, None, 1.25),
            Err(MoleculeError::UnsupportedMultiplicity { mult: 3, .. })
        ));
        let empty = Geometry::new(Vec::new(), Vec::new());
        assert!(matches!(
            Molecule::new("none", Role::Reactant, empty, 0, 1, None, 1.25),
            Err(MoleculeError::Empty(_))
        ));
        assert_eq!(calc_multiplicity(1).unwrap(), 2);
        assert!(matches!(calc_multiplicity(2), Err(MoleculeError::Diradical(2))));
    }

    #[test]
    fn test_active_graph_adds_forming_bond() {
        let mol = Molecule::new("water", Role::Reactant, water(), 0, 1, None, 1.25).unwrap();
        let active = mol.active_graph(&[(0, 1), (1, 2)]);
        assert_eq!(active.active_bonds(), vec![(0, 1), (1, 2)]);
        assert_eq!(mol.graph.n_bonds(), 2);
        assert_eq!(active.n_bonds(), 3);
    }
}
