//! Graph isomorphism, automorphisms and symmetry-equivalent rearrangements.
//!
//! Isomorphism tests and automorphism enumeration both use `petgraph`'s VF2
//! implementation with an element-matching node predicate.

use crate::graph::{AtomNode, BondEdge, MolecularGraph};
use crate::rearrangement::BondRearrangement;
use log::debug;
use petgraph::algo::{is_isomorphic_matching, subgraph_isomorphisms_iter};

/// True when the graphs are isomorphic with elements matched on nodes.
///
/// Edge attributes (the active flag) are ignored.
pub fn is_isomorphic(a: &MolecularGraph, b: &MolecularGraph) -> bool {
    if a.n_atoms() != b.n_atoms() || a.n_bonds() != b.n_bonds() {
        return false;
    }
    if a.degree_signature() != b.degree_signature() {
        return false;
    }
    is_isomorphic_matching(
        a.inner(),
        b.inner(),
        |x: &AtomNode, y: &AtomNode| x.element == y.element,
        |_: &BondEdge, _: &BondEdge| true,
    )
}

/// Element-preserving automorphisms of `graph`, at most `limit` of them.
///
/// Each permutation `p` maps atom `i` to atom `p[i]`. Unless the limit cuts
/// the enumeration short the identity is among the results.
pub fn automorphisms(graph: &MolecularGraph, limit: usize) -> Vec<Vec<usize>> {
    let inner = graph.inner();
    let found: Vec<Vec<usize>> = subgraph_isomorphisms_iter(
        &inner,
        &inner,
        &mut |x: &AtomNode, y: &AtomNode| x.element == y.element,
        &mut |_: &BondEdge, _: &BondEdge| true,
    )
    .map(|mappings| mappings.take(limit).collect())
    .unwrap_or_default();

    if limit > 0 && found.len() == limit {
        debug!("Automorphism enumeration stopped at the limit of {}", limit);
    }
    found
}

/// True when some automorphism maps `a`'s forming and breaking sets onto `b`'s.
pub fn are_equivalent(a: &BondRearrangement, b: &BondRearrangement, automorphisms: &[Vec<usize>]) -> bool {
    if a.n_fbonds() != b.n_fbonds() || a.n_bbonds() != b.n_bbonds() {
        return false;
    }
    let target = b.bond_sets();
    automorphisms.iter().any(|perm| a.mapped(perm) == target)
}

/// Removes rearrangements that are symmetry-equivalent under the automorphisms
/// of `reference`, keeping the first representative of each class.
pub fn strip_equivalent(
    rearrangements: Vec<BondRearrangement>,
    reference: &MolecularGraph,
    max_automorphisms: usize,
) -> Vec<BondRearrangement> {
    if rearrangements.len() < 2 {
        return rearrangements;
    }
    let autos = automorphisms(reference, max_automorphisms);
    let mut unique: Vec<BondRearrangement> = Vec::new();
    for rearr in rearrangements {
        if unique.iter().any(|kept| are_equivalent(kept, &rearr, &autos)) {
            debug!("Discarding rearrangement equivalent by symmetry: {}", rearr);
            continue;
        }
        unique.push(rearr);
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn methane() -> MolecularGraph {
        MolecularGraph::with_bonds(&["C", "H", "H", "H", "H"], &[(0, 1), (0, 2), (0, 3), (0, 4)])
            .unwrap()
    }

    #[test]
    fn test_isomorphism_respects_elements() {
        let hf = MolecularGraph::with_bonds(&["H", "F", "H"], &[(0, 1)]).unwrap();
        let hh = MolecularGraph::with_bonds(&["H", "F", "H"], &[(0, 2)]).unwrap();
        let fh = MolecularGraph::with_bonds(&["H", "F", "H"], &[(1, 2)]).unwrap();
        assert!(is_isomorphic(&hf, &fh));
        assert!(!is_isomorphic(&hf, &hh));
    }

    #[test]
    fn test_isomorphism_is_reflexive_and_symmetric() {
        // ethanol with two different atom numberings
        let a = MolecularGraph::with_bonds(
            &["C", "C", "O", "H", "H", "H", "H", "H", "H"],
            &[(0, 1), (1, 2), (2, 8), (0, 3), (0, 4), (0, 5), (1, 6), (1, 7)],
        )
        .unwrap();
        let b = MolecularGraph::with_bonds(
            &["H", "O", "H", "C", "H", "C", "H", "H", "H"],
            &[(1, 0), (1, 3), (3, 5), (3, 2), (3, 4), (5, 6), (5, 7), (5, 8)],
        )
        .unwrap();
        // dimethyl ether: same formula and bond count
        let c = MolecularGraph::with_bonds(
            &["C", "O", "C", "H", "H", "H", "H", "H", "H"],
            &[(0, 1), (1, 2), (0, 3), (0, 4), (0, 5), (2, 6), (2, 7), (2, 8)],
        )
        .unwrap();

        assert!(is_isomorphic(&a, &a));
        assert!(is_isomorphic(&c, &c));
        assert!(is_isomorphic(&a, &b));
        assert!(is_isomorphic(&b, &a));
        assert!(!is_isomorphic(&a, &c));
        assert!(!is_isomorphic(&c, &a));
    }

    #[test]
    fn test_isomorphism_ignores_active_flag() {
        let h2 = MolecularGraph::with_bonds(&["H", "H"], &[(0, 1)]).unwrap();
        assert!(is_isomorphic(&h2, &h2.with_active_bonds(&[(0, 1)])));
    }

    #[test]
    fn test_methane_has_24_automorphisms() {
        let autos = automorphisms(&methane(), 1000);
        assert_eq!(autos.len(), 24);
        assert!(autos.contains(&vec![0, 1, 2, 3, 4]));
        assert!(autos.iter().all(|p| p[0] == 0));
    }

    #[test]
    fn test_automorphisms_are_permutations() {
        // propane: swapping the two methyls and the hydrogens on each carbon
        let propane = MolecularGraph::with_bonds(
            &["C", "C", "C", "H", "H", "H", "H", "H", "H", "H", "H"],
            &[(0, 1), (1, 2), (0, 3), (0, 4), (0, 5), (1, 6), (1, 7), (2, 8), (2, 9), (2, 10)],
        )
        .unwrap();
        let autos = automorphisms(&propane, 1000);
        // 3! x 3! x 2! x 2 (methyl swap)
        assert_eq!(autos.len(), 144);
        for perm in &autos {
            let mut sorted = perm.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..11).collect::<Vec<_>>());
            assert_eq!(perm[1], 1);
        }
    }

    #[test]
    fn test_automorphism_limit() {
        assert_eq!(automorphisms(&methane(), 5).len(), 5);
        assert!(automorphisms(&methane(), 0).is_empty());
    }

    #[test]
    fn test_strip_equivalent_methane_abstraction() {
        let rearrs: Vec<_> = (1..5)
            .map(|h| BondRearrangement::new(&[], &[(0, h)]))
            .collect();
        let unique = strip_equivalent(rearrs, &methane(), 1000);
        assert_eq!(unique, vec![BondRearrangement::new(&[], &[(0, 1)])]);
    }

    #[test]
    fn test_inequivalent_rearrangements_are_kept() {
        // H-F...H: breaking H-F differs from forming F-H
        let graph = MolecularGraph::with_bonds(&["H", "F", "H"], &[(0, 1)]).unwrap();
        let rearrs = vec![
            BondRearrangement::new(&[], &[(0, 1)]),
            BondRearrangement::new(&[(1, 2)], &[]),
        ];
        assert_eq!(strip_equivalent(rearrs.clone(), &graph, 100), rearrs);
    }
}
