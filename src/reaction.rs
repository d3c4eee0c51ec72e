//! Reactions and their classification.
//!
//! A [`Reaction`] groups the reactant and product [`Molecule`]s of one
//! elementary step. Its name stem (`reac1+reac2--prod1+prod2` unless named
//! explicitly) prefixes every job and output file of the search.
//!
//! [`ReactionType`] is derived from the shape of a bond rearrangement:
//!
//! | breaking | forming | molecules       | type          |
//! |----------|---------|-----------------|---------------|
//! | n > 0    | 0       | any             | Dissociation  |
//! | 0        | n > 0   | any             | Addition      |
//! | 1        | 1       | 1 -> 1          | Rearrangement |
//! | 1        | 1       | otherwise       | Substitution  |
//! | b > f    | f > 0   | any             | Elimination   |
//! | b <= f   | f > 1   | any             | Rearrangement |

use crate::molecule::{Molecule, Role};
use crate::rearrangement::BondRearrangement;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised when assembling a reaction.
#[derive(Error, Debug)]
pub enum ReactionError {
    #[error("A reaction needs at least one reactant and one product")]
    MissingSide,

    #[error("Charge is not conserved: reactants {reactants}, products {products}")]
    ChargeNotConserved { reactants: i32, products: i32 },

    #[error("Atoms are not conserved: reactants contain {reactants}, products contain {products}")]
    AtomsNotConserved { reactants: String, products: String },
}

/// Reaction class of a bond rearrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionType {
    Addition,
    Dissociation,
    Substitution,
    Elimination,
    Rearrangement,
}

impl fmt::Display for ReactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReactionType::Addition => "addition",
            ReactionType::Dissociation => "dissociation",
            ReactionType::Substitution => "substitution",
            ReactionType::Elimination => "elimination",
            ReactionType::Rearrangement => "rearrangement",
        };
        f.write_str(name)
    }
}

/// An elementary reaction step.
#[derive(Debug, Clone)]
pub struct Reaction {
    pub name: String,
    pub reactants: Vec<Molecule>,
    pub products: Vec<Molecule>,
    pub solvent: Option<String>,
}

impl Reaction {
    /// Builds a reaction from molecules sorted by their role.
    ///
    /// With `name == None` the stem is generated from the molecule names.
    /// The solvent, when given, is applied to every molecule.
    pub fn new(
        molecules: Vec<Molecule>,
        name: Option<&str>,
        solvent: Option<String>,
    ) -> Result<Self, ReactionError> {
        let (reactants, products): (Vec<Molecule>, Vec<Molecule>) = molecules
            .into_iter()
            .map(|m| m.with_solvent(solvent.clone()))
            .partition(|m| m.role == Role::Reactant);

        if reactants.is_empty() || products.is_empty() {
            return Err(ReactionError::MissingSide);
        }

        let charge = |mols: &[Molecule]| mols.iter().map(|m| m.charge).sum::<i32>();
        if charge(&reactants) != charge(&products) {
            return Err(ReactionError::ChargeNotConserved {
                reactants: charge(&reactants),
                products: charge(&products),
            });
        }

        let formula_r = formula(&reactants);
        let formula_p = formula(&products);
        if formula_r != formula_p {
            return Err(ReactionError::AtomsNotConserved {
                reactants: formula_r,
                products: formula_p,
            });
        }

        let name = match name {
            Some(name) => name.to_string(),
            None => format!("{}--{}", join_names(&reactants), join_names(&products)),
        };
        Ok(Self {
            name,
            reactants,
            products,
            solvent,
        })
    }

    /// Both sides consist of a single molecule.
    pub fn is_unimolecular(&self) -> bool {
        self.reactants.len() == 1 && self.products.len() == 1
    }

    /// Classifies a rearrangement of this reaction.
    pub fn classify(&self, rearrangement: &BondRearrangement) -> ReactionType {
        classify(
            rearrangement.n_bbonds(),
            rearrangement.n_fbonds(),
            self.is_unimolecular(),
        )
    }

    /// All molecules, reactants first.
    pub fn molecules_mut(&mut self) -> impl Iterator<Item = &mut Molecule> {
        self.reactants.iter_mut().chain(self.products.iter_mut())
    }
}

/// Reaction type from the numbers of breaking and forming bonds.
pub fn classify(n_breaking: usize, n_forming: usize, unimolecular: bool) -> ReactionType {
    match (n_breaking, n_forming) {
        (_, 0) => ReactionType::Dissociation,
        (0, _) => ReactionType::Addition,
        (1, 1) if unimolecular => ReactionType::Rearrangement,
        (1, 1) => ReactionType::Substitution,
        (b, f) if b > f => ReactionType::Elimination,
        _ => ReactionType::Rearrangement,
    }
}

fn join_names(molecules: &[Molecule]) -> String {
    molecules
        .iter()
        .map(|m| m.name.as_str())
        .collect::<Vec<_>>()
        .join("+")
}

/// Hill-ordered element count string, e.g. `C2H5F`.
fn formula(molecules: &[Molecule]) -> String {
    let mut counts = std::collections::BTreeMap::new();
    for el in molecules.iter().flat_map(|m| m.geometry.elements.iter()) {
        *counts.entry(el.as_str()).or_insert(0usize) += 1;
    }
    let mut out = String::new();
    let mut push = |el: &str, n: usize| {
        out.push_str(el);
        if n > 1 {
            out.push_str(&n.to_string());
        }
    };
    if let Some(n) = counts.remove("C") {
        push("C", n);
        if let Some(n) = counts.remove("H") {
            push("H", n);
        }
    }
    for (el, n) in counts {
        push(el, n);
    }
    out
}
