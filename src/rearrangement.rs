//! Bond rearrangements between reactant and product graphs.
//!
//! A [`BondRearrangement`] is a pair of bond sets: bonds formed and bonds
//! broken on the way from the reactant complex to the product complex. This
//! module enumerates every rearrangement, up to a configurable number of bond
//! changes, that turns the reactant graph into a graph isomorphic to the
//! product graph.
//!
//! # Search order
//!
//! Rearrangement *shapes* `(n_break, n_form)` are visited in increasing total
//! size and only shapes whose size difference matches the change in bond
//! count are considered. For each shape the symmetric difference between the
//! two bond sets is tried first; if that yields nothing, the full space of
//! reactant bonds and non-bonded pairs is searched, pruned by the change in
//! element-pair bond counts. The first shape producing at least one valid
//! rearrangement ends the search.

use crate::graph::{normalise_bond, MolecularGraph};
use crate::isomorphism::is_isomorphic;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Errors raised while comparing reactant and product graphs.
#[derive(Error, Debug)]
pub enum RearrangementError {
    #[error("Atom count mismatch: reactants have {reactant} atoms, products have {product}")]
    AtomCountMismatch { reactant: usize, product: usize },

    #[error("Element mismatch: product atom {index} ({element}) has no partner in the reactants")]
    ElementMismatch { index: usize, element: String },
}

/// A set of forming and breaking bonds.
///
/// Pairs are stored as `(i, j)` with `i < j`. Two rearrangements are equal
/// when their bond lists are equal; symmetry equivalence is handled by
/// [`crate::isomorphism::strip_equivalent`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BondRearrangement {
    forming_bonds: Vec<(usize, usize)>,
    breaking_bonds: Vec<(usize, usize)>,
}

impl BondRearrangement {
    pub fn new(forming: &[(usize, usize)], breaking: &[(usize, usize)]) -> Self {
        Self {
            forming_bonds: forming.iter().map(|&b| normalise_bond(b)).collect(),
            breaking_bonds: breaking.iter().map(|&b| normalise_bond(b)).collect(),
        }
    }

    pub fn forming_bonds(&self) -> &[(usize, usize)] {
        &self.forming_bonds
    }

    pub fn breaking_bonds(&self) -> &[(usize, usize)] {
        &self.breaking_bonds
    }

    /// Forming bonds followed by breaking bonds.
    pub fn all(&self) -> Vec<(usize, usize)> {
        self.forming_bonds
            .iter()
            .chain(self.breaking_bonds.iter())
            .copied()
            .collect()
    }

    pub fn n_fbonds(&self) -> usize {
        self.forming_bonds.len()
    }

    pub fn n_bbonds(&self) -> usize {
        self.breaking_bonds.len()
    }

    /// Total number of bond changes.
    pub fn n_changes(&self) -> usize {
        self.n_fbonds() + self.n_bbonds()
    }

    /// Atoms participating in any forming or breaking bond.
    pub fn active_atoms(&self) -> BTreeSet<usize> {
        self.all().into_iter().flat_map(|(i, j)| [i, j]).collect()
    }

    /// Forming and breaking sets after renumbering atoms with `perm`
    /// (atom `i` becomes `perm[i]`).
    pub fn mapped(&self, perm: &[usize]) -> (BTreeSet<(usize, usize)>, BTreeSet<(usize, usize)>) {
        let map = |bonds: &[(usize, usize)]| {
            bonds
                .iter()
                .map(|&(i, j)| normalise_bond((perm[i], perm[j])))
                .collect()
        };
        (map(&self.forming_bonds), map(&self.breaking_bonds))
    }

    /// Forming and breaking sets without renumbering.
    pub fn bond_sets(&self) -> (BTreeSet<(usize, usize)>, BTreeSet<(usize, usize)>) {
        (
            self.forming_bonds.iter().copied().collect(),
            self.breaking_bonds.iter().copied().collect(),
        )
    }
}

impl fmt::Display for BondRearrangement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "forming {:?} breaking {:?}", self.forming_bonds, self.breaking_bonds)
    }
}

/// Applies a rearrangement to a graph: breaking bonds are removed, then
/// forming bonds are added.
pub fn generate_rearranged_graph(
    graph: &MolecularGraph,
    fbonds: &[(usize, usize)],
    bbonds: &[(usize, usize)],
) -> MolecularGraph {
    let mut rearranged = graph.clone();
    for &(i, j) in bbonds {
        rearranged.remove_bond(i, j);
    }
    for &(i, j) in fbonds {
        rearranged.add_bond(i, j);
    }
    rearranged
}

/// Appends `(fbonds, bbonds)` to `rearrangements` if applying it to
/// `reactant` yields a graph isomorphic to `product`.
///
/// Returns `true` when the rearrangement was accepted.
pub fn add_bond_rearrangement(
    rearrangements: &mut Vec<BondRearrangement>,
    reactant: &MolecularGraph,
    product: &MolecularGraph,
    fbonds: &[(usize, usize)],
    bbonds: &[(usize, usize)],
) -> bool {
    let rearranged = generate_rearranged_graph(reactant, fbonds, bbonds);
    if !is_isomorphic(&rearranged, product) {
        return false;
    }
    let candidate = BondRearrangement::new(fbonds, bbonds);
    if rearrangements.contains(&candidate) {
        return false;
    }
    rearrangements.push(candidate);
    true
}

/// Maps product atoms onto reactant atoms of the same element.
///
/// Returns `mapping` with `mapping[product_index] = reactant_index`. Atoms of
/// equal element are paired in order, so complexes already listed in a
/// consistent order receive the identity mapping.
pub fn align_atoms<S: AsRef<str>>(
    reactant_elements: &[S],
    product_elements: &[S],
) -> Result<Vec<usize>, RearrangementError> {
    if reactant_elements.len() != product_elements.len() {
        return Err(RearrangementError::AtomCountMismatch {
            reactant: reactant_elements.len(),
            product: product_elements.len(),
        });
    }

    let mut used = vec![false; reactant_elements.len()];
    let mut mapping = Vec::with_capacity(product_elements.len());
    for (index, element) in product_elements.iter().enumerate() {
        let element = element.as_ref();
        let partner = (0..reactant_elements.len())
            .find(|&r| !used[r] && reactant_elements[r].as_ref() == element)
            .ok_or_else(|| RearrangementError::ElementMismatch {
                index,
                element: element.to_string(),
            })?;
        used[partner] = true;
        mapping.push(partner);
    }
    Ok(mapping)
}

/// Rearrangement sizes `(n_break, n_form)` compatible with a change in bond
/// count of `delta` (reactant minus product), smallest first.
pub fn bond_change_shapes(delta: isize, max_bond_changes: usize) -> Vec<(usize, usize)> {
    let mut shapes = Vec::new();
    for total in 1..=max_bond_changes {
        for n_break in 0..=total {
            let n_form = total - n_break;
            if n_break as isize - n_form as isize == delta {
                shapes.push((n_break, n_form));
            }
        }
    }
    shapes
}

/// Largest system for which isomorphic reactant and product graphs are
/// still searched for a degenerate exchange.
const MAX_ATOMS_ISOMORPHIC_EXCHANGE: usize = 3;

/// Enumerates bond rearrangements turning `reactant` into `product`.
///
/// Both graphs must already share an atom ordering (see [`align_atoms`]).
/// Returns an empty list when the graphs are already isomorphic (systems of
/// more than three atoms) or identical, or when no rearrangement with at
/// most `max_bond_changes` changes exists. The result may still contain
/// symmetry-equivalent entries.
pub fn enumerate_rearrangements(
    reactant: &MolecularGraph,
    product: &MolecularGraph,
    max_bond_changes: usize,
) -> Result<Vec<BondRearrangement>, RearrangementError> {
    if reactant.n_atoms() != product.n_atoms() {
        return Err(RearrangementError::AtomCountMismatch {
            reactant: reactant.n_atoms(),
            product: product.n_atoms(),
        });
    }
    for index in 0..product.n_atoms() {
        if reactant.element(index) != product.element(index) {
            return Err(RearrangementError::ElementMismatch {
                index,
                element: product.element(index).to_string(),
            });
        }
    }

    // isomorphic graphs only describe a bond exchange for the smallest
    // systems, e.g. H + H2 -> H2 + H
    if reactant.bonds() == product.bonds()
        || (is_isomorphic(reactant, product) && reactant.n_atoms() > MAX_ATOMS_ISOMORPHIC_EXCHANGE)
    {
        debug!("Reactant and product graphs are isomorphic, no rearrangement needed");
        return Ok(Vec::new());
    }

    let delta = reactant.n_bonds() as isize - product.n_bonds() as isize;
    for (n_break, n_form) in bond_change_shapes(delta, max_bond_changes) {
        debug!("Searching rearrangements breaking {} and forming {} bonds", n_break, n_form);

        let found = search_symmetric_difference(reactant, product, n_break, n_form);
        if !found.is_empty() {
            return Ok(found);
        }
        let found = search_full_space(reactant, product, n_break, n_form);
        if !found.is_empty() {
            return Ok(found);
        }
    }
    Ok(Vec::new())
}

fn search_symmetric_difference(
    reactant: &MolecularGraph,
    product: &MolecularGraph,
    n_break: usize,
    n_form: usize,
) -> Vec<BondRearrangement> {
    let reactant_bonds: BTreeSet<_> = reactant.bonds().into_iter().collect();
    let product_bonds: BTreeSet<_> = product.bonds().into_iter().collect();
    let only_reactant: Vec<_> = reactant_bonds.difference(&product_bonds).copied().collect();
    let only_product: Vec<_> = product_bonds.difference(&reactant_bonds).copied().collect();

    let mut found = Vec::new();
    for bbonds in only_reactant.iter().copied().combinations(n_break) {
        for fbonds in only_product.iter().copied().combinations(n_form) {
            add_bond_rearrangement(&mut found, reactant, product, &fbonds, &bbonds);
        }
    }
    found
}

type PairType = (String, String);

fn pair_type(graph: &MolecularGraph, (i, j): (usize, usize)) -> PairType {
    let (a, b) = (graph.element(i).to_string(), graph.element(j).to_string());
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn pair_type_counts(graph: &MolecularGraph, bonds: &[(usize, usize)]) -> BTreeMap<PairType, isize> {
    let mut counts = BTreeMap::new();
    for &bond in bonds {
        *counts.entry(pair_type(graph, bond)).or_insert(0) += 1;
    }
    counts
}

fn search_full_space(
    reactant: &MolecularGraph,
    product: &MolecularGraph,
    n_break: usize,
    n_form: usize,
) -> Vec<BondRearrangement> {
    // delta[t] = reactant bonds of type t minus product bonds of type t
    let mut delta = pair_type_counts(reactant, &reactant.bonds());
    for (t, count) in pair_type_counts(product, &product.bonds()) {
        *delta.entry(t).or_insert(0) -= count;
    }

    let non_bonded = reactant.non_bonded_pairs();
    let mut found = Vec::new();

    for bbonds in reactant.bonds().into_iter().combinations(n_break) {
        let broken = pair_type_counts(reactant, &bbonds);

        // forming bonds of type t must equal broken[t] - delta[t]
        let mut need: BTreeMap<PairType, isize> = BTreeMap::new();
        for t in delta.keys().chain(broken.keys()) {
            let n = broken.get(t).copied().unwrap_or(0) - delta.get(t).copied().unwrap_or(0);
            need.insert(t.clone(), n);
        }
        if need.values().any(|&n| n < 0) || need.values().sum::<isize>() != n_form as isize {
            continue;
        }

        let candidates: Vec<_> = non_bonded
            .iter()
            .copied()
            .filter(|&pair| need.get(&pair_type(reactant, pair)).copied().unwrap_or(0) > 0)
            .collect();

        for fbonds in candidates.iter().copied().combinations(n_form) {
            let formed = pair_type_counts(reactant, &fbonds);
            let balanced = need
                .iter()
                .all(|(t, &n)| formed.get(t).copied().unwrap_or(0) == n);
            if balanced {
                add_bond_rearrangement(&mut found, reactant, product, &fbonds, &bbonds);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h3(bonds: &[(usize, usize)]) -> MolecularGraph {
        MolecularGraph::with_bonds(&["H", "H", "H"], bonds).unwrap()
    }

    #[test]
    fn test_rearrangement_accessors() {
        let rearr = BondRearrangement::new(&[(1, 0)], &[(1, 2)]);
        assert_eq!(rearr.forming_bonds(), &[(0, 1)]);
        assert_eq!(rearr.all(), vec![(0, 1), (1, 2)]);
        assert_eq!(rearr.n_changes(), 2);
        assert_eq!(rearr.active_atoms().into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_generate_rearranged_graph() {
        let reactant = h3(&[(1, 2)]);
        let product = h3(&[(0, 1)]);
        let rearranged = generate_rearranged_graph(&reactant, &[(0, 1)], &[(1, 2)]);
        assert!(is_isomorphic(&rearranged, &product));
        assert_eq!(rearranged.bonds(), vec![(0, 1)]);
    }

    #[test]
    fn test_add_bond_rearrangement_rejects_non_isomorphic() {
        let reactant = h3(&[(1, 2)]);
        let product = h3(&[(0, 1)]);
        let mut found = Vec::new();
        assert!(!add_bond_rearrangement(&mut found, &reactant, &product, &[(0, 1)], &[]));
        assert!(found.is_empty());

        assert!(add_bond_rearrangement(&mut found, &reactant, &product, &[(0, 1)], &[(1, 2)]));
        // duplicates are not appended twice
        assert!(!add_bond_rearrangement(&mut found, &reactant, &product, &[(0, 1)], &[(1, 2)]));
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_bond_change_shapes() {
        assert_eq!(bond_change_shapes(0, 4), vec![(1, 1), (2, 2)]);
        assert_eq!(bond_change_shapes(1, 4), vec![(1, 0), (2, 1)]);
        assert_eq!(bond_change_shapes(-2, 4), vec![(0, 2), (1, 3)]);
        assert!(bond_change_shapes(5, 4).is_empty());
    }

    #[test]
    fn test_enumerate_substitution() {
        let reactant = h3(&[(1, 2)]);
        let product = h3(&[(0, 1)]);
        let found = enumerate_rearrangements(&reactant, &product, 4).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].all(), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_enumerate_uses_symmetric_difference() {
        let reactant = MolecularGraph::with_bonds(&["H", "H", "F"], &[(0, 1)]).unwrap();
        let product = MolecularGraph::with_bonds(&["H", "H", "F"], &[(1, 2)]).unwrap();
        let found = enumerate_rearrangements(&reactant, &product, 2).unwrap();
        assert_eq!(found, vec![BondRearrangement::new(&[(1, 2)], &[(0, 1)])]);
    }

    #[test]
    fn test_enumerate_falls_back_to_full_space() {
        // H2 + 2H -> 2 H2 with the product atoms numbered differently, so no
        // single bond from the symmetric difference gives two H2 molecules
        let reactant = MolecularGraph::with_bonds(&["H", "H", "H", "H"], &[(0, 1)]).unwrap();
        let product =
            MolecularGraph::with_bonds(&["H", "H", "H", "H"], &[(0, 2), (1, 3)]).unwrap();
        let found = enumerate_rearrangements(&reactant, &product, 4).unwrap();
        assert_eq!(found, vec![BondRearrangement::new(&[(2, 3)], &[])]);
    }

    #[test]
    fn test_enumerate_isomorphic_graphs() {
        // degenerate exchange in a three-atom system is still a reaction
        let found = enumerate_rearrangements(&h3(&[(0, 1)]), &h3(&[(1, 2)]), 4).unwrap();
        assert_eq!(found, vec![BondRearrangement::new(&[(1, 2)], &[(0, 1)])]);
        assert!(enumerate_rearrangements(&h3(&[(0, 1)]), &h3(&[(0, 1)]), 4)
            .unwrap()
            .is_empty());

        let reactant = MolecularGraph::with_bonds(&["H", "H", "H", "H"], &[(0, 1)]).unwrap();
        let product = MolecularGraph::with_bonds(&["H", "H", "H", "H"], &[(2, 3)]).unwrap();
        assert!(enumerate_rearrangements(&reactant, &product, 4).unwrap().is_empty());
    }

    #[test]
    fn test_enumerate_respects_depth_limit() {
        let reactant = MolecularGraph::new(&["H", "H", "H", "H"]);
        let product = MolecularGraph::with_bonds(&["H", "H", "H", "H"], &[(0, 1), (2, 3)]).unwrap();
        assert!(enumerate_rearrangements(&reactant, &product, 1).unwrap().is_empty());
        assert!(!enumerate_rearrangements(&reactant, &product, 2).unwrap().is_empty());
    }

    #[test]
    fn test_align_atoms() {
        let mapping = align_atoms(&["C", "H", "H"], &["H", "C", "H"]).unwrap();
        assert_eq!(mapping, vec![1, 0, 2]);
        assert!(matches!(
            align_atoms(&["C", "H"], &["C", "O"]),
            Err(RearrangementError::ElementMismatch { index: 1, .. })
        ));
        assert!(matches!(
            align_atoms(&["C"], &["C", "H"]),
            Err(RearrangementError::AtomCountMismatch { reactant: 1, product: 2 })
        ));
    }
}
