//! Reactant and product complexes.
//!
//! Bond rearrangements are searched between two *complexes*: the reactants
//! combined into one aggregate and the products combined into another. A
//! single molecule is used as is. Several molecules are laid out along the x
//! axis with a fixed gap between consecutive fragments; their graphs are
//! joined disjointly and bonds between fragments that end up within bonding
//! distance are added.
//!
//! Charge is summed over the fragments and the multiplicity is
//! `sum(mult_i - 1) + 1`, i.e. unpaired electrons of all fragments are
//! assumed to couple high-spin.

use crate::config::Config;
use crate::geometry::Geometry;
use crate::graph::{build_graph, MolecularGraph};
use crate::molecule::{Molecule, Role};
use crate::reaction::Reaction;
use log::debug;

/// A reactant or product aggregate.
#[derive(Debug, Clone)]
pub struct ReactionComplex {
    pub name: String,
    pub role: Role,
    pub geometry: Geometry,
    pub graph: MolecularGraph,
    pub charge: i32,
    pub mult: u32,
    pub solvent: Option<String>,
    /// Number of molecules combined into the complex
    pub n_fragments: usize,
}

impl ReactionComplex {
    /// Combines molecules of one side of a reaction.
    ///
    /// `molecules` must not be empty.
    pub fn from_molecules(molecules: &[Molecule], role: Role, separation: f64, tolerance: f64) -> Self {
        if let [single] = molecules {
            return Self {
                name: single.name.clone(),
                role,
                geometry: single.geometry.clone(),
                graph: single.graph.clone(),
                charge: single.charge,
                mult: single.mult,
                solvent: single.solvent.clone(),
                n_fragments: 1,
            };
        }

        let mut geometry = Geometry::new(Vec::new(), Vec::new());
        let mut graph = MolecularGraph::new::<&str>(&[]);
        for molecule in molecules {
            let mut fragment = molecule.geometry.clone();
            if let (Some((_, max_x)), Some((min_x, _))) = (geometry.x_extent(), fragment.x_extent()) {
                fragment.translate([max_x + separation - min_x, 0.0, 0.0]);
            }
            geometry = geometry.concatenated(&fragment);
            graph = graph.disjoint_union(&molecule.graph);
        }

        // fragments close enough to interact keep their contacts
        for (i, j) in build_graph(&geometry, tolerance).bonds() {
            if graph.add_bond(i, j) {
                debug!("Added inter-fragment bond {}-{}", i, j);
            }
        }

        let name = molecules
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join("+");
        let mult = molecules.iter().map(|m| m.mult - 1).sum::<u32>() + 1;
        Self {
            name,
            role,
            geometry,
            graph,
            charge: molecules.iter().map(|m| m.charge).sum(),
            mult,
            solvent: molecules.first().and_then(|m| m.solvent.clone()),
            n_fragments: molecules.len(),
        }
    }

    pub fn n_atoms(&self) -> usize {
        self.geometry.num_atoms
    }

    /// Copy of the graph with the active bonds of a rearrangement flagged.
    pub fn active_graph(&self, active_bonds: &[(usize, usize)]) -> MolecularGraph {
        self.graph.with_active_bonds(active_bonds)
    }

    /// Copy with atoms renumbered: atom `i` becomes atom `mapping[i]`.
    pub fn reordered(&self, mapping: &[usize]) -> Self {
        let n = self.n_atoms();
        let mut elements = vec![String::new(); n];
        let mut coords = vec![0.0; 3 * n];
        for (old, &new) in mapping.iter().enumerate() {
            elements[new] = self.geometry.elements[old].clone();
            coords[3 * new..3 * new + 3].copy_from_slice(&self.geometry.get_atom_coords(old));
        }
        Self {
            geometry: Geometry::new(elements, coords),
            graph: self.graph.relabeled(mapping),
            ..self.clone()
        }
    }
}

/// Builds the reactant and product complexes of a reaction.
pub fn get_reactant_and_product_complexes(
    reaction: &Reaction,
    config: &Config,
) -> (ReactionComplex, ReactionComplex) {
    let separation = config.search.fragment_separation;
    let tolerance = config.search.bond_tolerance;
    (
        ReactionComplex::from_molecules(&reaction.reactants, Role::Reactant, separation, tolerance),
        ReactionComplex::from_molecules(&reaction.products, Role::Product, separation, tolerance),
    )
}
