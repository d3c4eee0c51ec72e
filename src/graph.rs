//! Molecular graphs built on `petgraph`.
//!
//! Nodes are atoms labelled by element, edges are bonds. An edge may be
//! flagged *active* when it takes part in a bond rearrangement; the flag is
//! only used by the TS machinery and is ignored by isomorphism checks.
//!
//! Node indices always equal atom indices: nodes are added in atom order and
//! never removed.

use crate::bonds::{avg_bond_length, get_xyz_bond_list};
use crate::geometry::Geometry;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::{Dfs, EdgeRef};
use thiserror::Error;

/// Errors raised while building or cross-checking a molecular graph.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error(
        "Bond mismatch: graph has {graph_bonds} bonds but {expected} bonds were detected independently"
    )]
    BondCountMismatch { graph_bonds: usize, expected: usize },

    #[error("Atom index {index} out of range for {n_atoms} atoms")]
    AtomOutOfRange { index: usize, n_atoms: usize },

    #[error("An atom cannot be bonded to itself (atom {0})")]
    SelfBond(usize),
}

/// Atom label stored on graph nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomNode {
    pub element: String,
}

/// Bond label stored on graph edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BondEdge {
    /// Bond is formed or broken in the rearrangement under study
    pub active: bool,
}

/// Canonical `(min, max)` ordering of an atom pair.
pub fn normalise_bond((i, j): (usize, usize)) -> (usize, usize) {
    if i <= j {
        (i, j)
    } else {
        (j, i)
    }
}

/// Undirected, element-labelled molecular graph.
#[derive(Debug, Clone)]
pub struct MolecularGraph {
    graph: UnGraph<AtomNode, BondEdge>,
}

impl MolecularGraph {
    /// Graph with one node per element and no edges.
    pub fn new<S: AsRef<str>>(elements: &[S]) -> Self {
        let mut graph = UnGraph::with_capacity(elements.len(), elements.len());
        for el in elements {
            graph.add_node(AtomNode {
                element: el.as_ref().to_string(),
            });
        }
        Self { graph }
    }

    /// Graph from elements plus an explicit bond list.
    pub fn with_bonds<S: AsRef<str>>(
        elements: &[S],
        bonds: &[(usize, usize)],
    ) -> Result<Self, GraphError> {
        let mut graph = Self::new(elements);
        for &(i, j) in bonds {
            graph.check_pair(i, j)?;
            graph.add_bond(i, j);
        }
        Ok(graph)
    }

    fn check_pair(&self, i: usize, j: usize) -> Result<(), GraphError> {
        let n_atoms = self.n_atoms();
        for index in [i, j] {
            if index >= n_atoms {
                return Err(GraphError::AtomOutOfRange { index, n_atoms });
            }
        }
        if i == j {
            return Err(GraphError::SelfBond(i));
        }
        Ok(())
    }

    pub fn n_atoms(&self) -> usize {
        self.graph.node_count()
    }

    pub fn n_bonds(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn element(&self, atom: usize) -> &str {
        &self.graph[NodeIndex::new(atom)].element
    }

    pub fn elements(&self) -> Vec<String> {
        self.graph.node_weights().map(|n| n.element.clone()).collect()
    }

    /// Read-only access to the underlying petgraph graph.
    pub fn inner(&self) -> &UnGraph<AtomNode, BondEdge> {
        &self.graph
    }

    pub fn has_bond(&self, i: usize, j: usize) -> bool {
        i < self.n_atoms()
            && j < self.n_atoms()
            && self.graph.find_edge(NodeIndex::new(i), NodeIndex::new(j)).is_some()
    }

    /// Adds an inactive bond. Returns `false` if the bond already existed or is
    /// a self bond.
    pub fn add_bond(&mut self, i: usize, j: usize) -> bool {
        if i == j || self.has_bond(i, j) {
            return false;
        }
        self.graph
            .add_edge(NodeIndex::new(i), NodeIndex::new(j), BondEdge::default());
        true
    }

    /// Removes a bond. Returns `false` if no such bond existed.
    pub fn remove_bond(&mut self, i: usize, j: usize) -> bool {
        match self.graph.find_edge(NodeIndex::new(i), NodeIndex::new(j)) {
            Some(edge) => {
                self.graph.remove_edge(edge);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, i: usize, j: usize) -> bool {
        self.graph
            .find_edge(NodeIndex::new(i), NodeIndex::new(j))
            .map(|e| self.graph[e].active)
            .unwrap_or(false)
    }

    /// Bonds as sorted `(i, j)` pairs with `i < j`.
    pub fn bonds(&self) -> Vec<(usize, usize)> {
        let mut bonds: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| normalise_bond((e.source().index(), e.target().index())))
            .collect();
        bonds.sort_unstable();
        bonds
    }

    /// Atom pairs that are not bonded, sorted.
    pub fn non_bonded_pairs(&self) -> Vec<(usize, usize)> {
        let n = self.n_atoms();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                if !self.has_bond(i, j) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    /// Neighbour atom indices of `atom`, sorted.
    pub fn neighbors(&self, atom: usize) -> Vec<usize> {
        let mut nbrs: Vec<usize> = self
            .graph
            .neighbors(NodeIndex::new(atom))
            .map(|n| n.index())
            .collect();
        nbrs.sort_unstable();
        nbrs
    }

    pub fn degree(&self, atom: usize) -> usize {
        self.graph.neighbors(NodeIndex::new(atom)).count()
    }

    /// Multiset of `(element, degree)` pairs, sorted. Equal signatures are a
    /// necessary condition for isomorphism.
    pub fn degree_signature(&self) -> Vec<(String, usize)> {
        let mut sig: Vec<_> = (0..self.n_atoms())
            .map(|i| (self.element(i).to_string(), self.degree(i)))
            .collect();
        sig.sort();
        sig
    }

    /// Connected components as sorted atom index lists.
    pub fn fragments(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.n_atoms()];
        let mut fragments = Vec::new();
        for start in 0..self.n_atoms() {
            if seen[start] {
                continue;
            }
            let mut dfs = Dfs::new(&self.graph, NodeIndex::new(start));
            let mut members = Vec::new();
            while let Some(node) = dfs.next(&self.graph) {
                seen[node.index()] = true;
                members.push(node.index());
            }
            members.sort_unstable();
            fragments.push(members);
        }
        fragments
    }

    /// Disjoint union; atoms of `other` are renumbered after the atoms of `self`.
    pub fn disjoint_union(&self, other: &MolecularGraph) -> MolecularGraph {
        let offset = self.n_atoms();
        let mut graph = self.graph.clone();
        for node in other.graph.node_weights() {
            graph.add_node(node.clone());
        }
        for edge in other.graph.edge_references() {
            graph.add_edge(
                NodeIndex::new(edge.source().index() + offset),
                NodeIndex::new(edge.target().index() + offset),
                *edge.weight(),
            );
        }
        MolecularGraph { graph }
    }

    /// Renumbers atoms: atom `i` of `self` becomes atom `mapping[i]`.
    ///
    /// `mapping` must be a permutation of `0..n_atoms`.
    pub fn relabeled(&self, mapping: &[usize]) -> MolecularGraph {
        let n = self.n_atoms();
        let mut elements = vec![String::new(); n];
        for (old, &new) in mapping.iter().enumerate() {
            elements[new] = self.element(old).to_string();
        }
        let mut relabeled = MolecularGraph::new(&elements);
        for edge in self.graph.edge_references() {
            let i = mapping[edge.source().index()];
            let j = mapping[edge.target().index()];
            relabeled
                .graph
                .add_edge(NodeIndex::new(i), NodeIndex::new(j), *edge.weight());
        }
        relabeled
    }

    /// Copy of the graph with the given bonds flagged active.
    ///
    /// Forming bonds that are not yet edges are added as active edges so the
    /// returned graph carries the whole rearrangement.
    pub fn with_active_bonds(&self, bonds: &[(usize, usize)]) -> MolecularGraph {
        let mut active = self.clone();
        for &(i, j) in bonds {
            let (a, b) = (NodeIndex::new(i), NodeIndex::new(j));
            match active.graph.find_edge(a, b) {
                Some(edge) => active.graph[edge].active = true,
                None => {
                    active.graph.add_edge(a, b, BondEdge { active: true });
                }
            }
        }
        active
    }

    /// Bonds currently flagged active.
    pub fn active_bonds(&self) -> Vec<(usize, usize)> {
        let mut bonds: Vec<_> = self
            .graph
            .edge_references()
            .filter(|e| e.weight().active)
            .map(|e| normalise_bond((e.source().index(), e.target().index())))
            .collect();
        bonds.sort_unstable();
        bonds
    }
}

/// Builds a molecular graph from 3D coordinates.
///
/// Atoms `i` and `j` are bonded when their distance is below `tolerance`
/// times the threshold for their element pair ([`avg_bond_length`], which
/// falls back to the covalent radius sum).
pub fn build_graph(geometry: &Geometry, tolerance: f64) -> MolecularGraph {
    let mut graph = MolecularGraph::new(&geometry.elements);
    for i in 0..geometry.num_atoms {
        for j in (i + 1)..geometry.num_atoms {
            let limit = avg_bond_length(&geometry.elements[i], &geometry.elements[j]) * tolerance;
            if geometry.distance(i, j) < limit {
                graph.add_bond(i, j);
            }
        }
    }
    graph
}

/// Compares the graph's edge count with an independently detected bond list.
///
/// Both apply the same pairwise threshold, so a mismatch means the graph was
/// edited or built from other coordinates.
pub fn check_bond_agreement(
    graph: &MolecularGraph,
    geometry: &Geometry,
    tolerance: f64,
) -> Result<(), GraphError> {
    let expected = get_xyz_bond_list(geometry, tolerance).len();
    if graph.n_bonds() != expected {
        return Err(GraphError::BondCountMismatch {
            graph_bonds: graph.n_bonds(),
            expected,
        });
    }
    Ok(())
}
