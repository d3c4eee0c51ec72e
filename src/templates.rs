//! Library of solved transition states.
//!
//! Every validated TS can be stored as a [`TsTemplate`]: the distances of its
//! active bonds together with a [`TemplateKey`] describing the chemistry
//! around them. A later search for a reaction with the same key starts from
//! a constrained optimisation holding the active bonds at the template
//! distances, which is usually much cheaper than a scan.
//!
//! # Matching
//!
//! Two keys match when they agree on reaction type, charge, multiplicity,
//! solvent, the element pairs of the active bonds and the local environment
//! of every active atom. The environment of an atom is its element followed
//! by the sorted elements of its neighbours in the graph that already
//! contains the forming bonds, e.g. `C(C,F,H,H)`.
//!
//! Templates are JSON files (`template<N>.json`) in the template directory.

use crate::complex::ReactionComplex;
use crate::constraints::DistanceConstraints;
use crate::geometry::Geometry;
use crate::graph::{normalise_bond, MolecularGraph};
use crate::reaction::ReactionType;
use crate::rearrangement::BondRearrangement;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Chemistry a template applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateKey {
    pub reaction_type: ReactionType,
    pub charge: i32,
    pub mult: u32,
    pub solvent: Option<String>,
    /// Sorted element pairs of the active bonds
    pub bond_elements: Vec<(String, String)>,
    /// Sorted environments of the active atoms
    pub environments: Vec<String>,
}

impl TemplateKey {
    pub fn new(
        reaction_type: ReactionType,
        complex: &ReactionComplex,
        rearrangement: &BondRearrangement,
    ) -> Self {
        let graph = complex.active_graph(&rearrangement.all());
        let mut bond_elements: Vec<(String, String)> = rearrangement
            .all()
            .into_iter()
            .map(|(i, j)| element_pair(&graph, i, j))
            .collect();
        bond_elements.sort();
        let mut environments: Vec<String> = rearrangement
            .active_atoms()
            .into_iter()
            .map(|atom| environment(&graph, atom))
            .collect();
        environments.sort();

        Self {
            reaction_type,
            charge: complex.charge,
            mult: complex.mult,
            solvent: complex.solvent.clone(),
            bond_elements,
            environments,
        }
    }
}

/// Distance of one active bond, labelled by the environments of its atoms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateBond {
    pub environments: (String, String),
    pub distance: f64,
}

/// A stored transition state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsTemplate {
    pub key: TemplateKey,
    pub bonds: Vec<TemplateBond>,
}

impl TsTemplate {
    /// Template from a validated TS geometry.
    pub fn from_ts(
        key: TemplateKey,
        complex: &ReactionComplex,
        rearrangement: &BondRearrangement,
        geometry: &Geometry,
    ) -> Self {
        let graph = complex.active_graph(&rearrangement.all());
        let bonds = rearrangement
            .all()
            .into_iter()
            .map(|(i, j)| TemplateBond {
                environments: environment_pair(&graph, i, j),
                distance: geometry.distance(i, j),
            })
            .collect();
        Self { key, bonds }
    }

    /// Distance constraints for the active bonds of `rearrangement`.
    ///
    /// Returns `None` when some active bond has no counterpart in the
    /// template. Each template bond is used at most once.
    pub fn distances_for(
        &self,
        complex: &ReactionComplex,
        rearrangement: &BondRearrangement,
    ) -> Option<DistanceConstraints> {
        let graph = complex.active_graph(&rearrangement.all());
        let mut used = vec![false; self.bonds.len()];
        let mut constraints = DistanceConstraints::new();
        for (i, j) in rearrangement.all() {
            let label = environment_pair(&graph, i, j);
            let k = (0..self.bonds.len()).find(|&k| !used[k] && self.bonds[k].environments == label)?;
            used[k] = true;
            constraints.insert(normalise_bond((i, j)), self.bonds[k].distance);
        }
        Some(constraints)
    }
}

fn element_pair(graph: &MolecularGraph, i: usize, j: usize) -> (String, String) {
    let (a, b) = (graph.element(i).to_string(), graph.element(j).to_string());
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn environment(graph: &MolecularGraph, atom: usize) -> String {
    let mut neighbours: Vec<&str> = graph.neighbors(atom).into_iter().map(|n| graph.element(n)).collect();
    neighbours.sort_unstable();
    format!("{}({})", graph.element(atom), neighbours.join(","))
}

fn environment_pair(graph: &MolecularGraph, i: usize, j: usize) -> (String, String) {
    let (a, b) = (environment(graph, i), environment(graph, j));
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Templates loaded from one directory.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    dir: PathBuf,
    templates: Vec<TsTemplate>,
}

impl TemplateLibrary {
    /// Loads every `*.json` template in `dir`.
    ///
    /// A missing directory gives an empty library; unreadable files are
    /// skipped with a warning.
    pub fn load(dir: &Path) -> Self {
        let mut library = Self {
            dir: dir.to_path_buf(),
            templates: Vec::new(),
        };
        let Ok(entries) = fs::read_dir(dir) else {
            debug!("No template directory at {}", dir.display());
            return library;
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect();
        paths.sort();
        for path in paths {
            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str::<TsTemplate>(&s).map_err(|e| e.to_string()));
            match parsed {
                Ok(template) => library.templates.push(template),
                Err(e) => warn!("Skipping template {}: {}", path.display(), e),
            }
        }
        info!("Loaded {} TS templates from {}", library.len(), dir.display());
        library
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// First template whose key equals `key`.
    pub fn find(&self, key: &TemplateKey) -> Option<&TsTemplate> {
        self.templates.iter().find(|t| &t.key == key)
    }

    /// Adds a template and writes it to the library directory.
    ///
    /// A template with an identical key is replaced in memory but the
    /// earlier file is left in place.
    pub fn save(&mut self, template: TsTemplate) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let mut index = self.templates.len();
        let path = loop {
            let candidate = self.dir.join(format!("template{}.json", index));
            if !candidate.exists() {
                break candidate;
            }
            index += 1;
        };
        crate::io::write_json(&template, &path)?;

        self.templates.retain(|t| t.key != template.key);
        self.templates.push(template);
        Ok(path)
    }

    /// Number of templates per reaction type.
    pub fn summary(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for template in &self.templates {
            *counts.entry(template.key.reaction_type.to_string()).or_insert(0) += 1;
        }
        counts
    }
}
