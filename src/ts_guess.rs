//! Transition state guess generation.
//!
//! Each function here implements one guess strategy. A strategy runs one or
//! more constrained optimisations on the reactant complex and returns a
//! [`TSGuess`] geometry, or `None` when it could not produce one (failed jobs,
//! no barrier along a scan, no matching template). Failures are logged and
//! never propagated: the pipeline simply tries the next strategy.
//!
//! # Starting geometry
//!
//! When a forming bond joins two fragments of a complex, the fragments are
//! first brought together ([`position_fragments`]) so that the forming bond
//! starts at `breaking_bond_scale` times its equilibrium length. Scans then
//! shorten it towards the equilibrium length.
//!
//! # Target distances
//!
//! | strategy            | forming bond                     | breaking bond                           |
//! |---------------------|----------------------------------|-----------------------------------------|
//! | constrained opt     | `ts_bond_scale * r_eq`           | `ts_bond_scale * r_eq`                  |
//! | 1D / 2D scan end    | `r_eq`                           | `breaking_bond_scale * r_eq`            |
//! | template            | template distance                | template distance                       |
//!
//! `r_eq` is the average bond length of the element pair
//! ([`crate::bonds::avg_bond_length`]).

use crate::bonds::avg_bond_length;
use crate::complex::ReactionComplex;
use crate::config::Config;
use crate::constraints::DistanceConstraints;
use crate::geometry::Geometry;
use crate::graph::normalise_bond;
use crate::reaction::ReactionType;
use crate::rearrangement::BondRearrangement;
use crate::scan::{find_1d_maximum, find_2d_saddle, relaxed_scan_1d, relaxed_scan_2d, JobContext};
use crate::templates::TsTemplate;
use log::{debug, info};
use nalgebra::Vector3;
use std::collections::BTreeSet;

/// A candidate transition state geometry.
#[derive(Debug, Clone)]
pub struct TSGuess {
    /// Name of the strategy job that produced the guess
    pub name: String,
    pub geometry: Geometry,
    pub rearrangement: BondRearrangement,
    pub reaction_type: ReactionType,
    /// Bonds held fixed while generating the guess
    pub constrained_bonds: Vec<(usize, usize)>,
    /// Energy of the constrained geometry in Hartree
    pub energy: Option<f64>,
}

/// Equilibrium length of the bond between atoms `i` and `j` of `geometry`.
pub fn equilibrium_length(geometry: &Geometry, (i, j): (usize, usize)) -> f64 {
    avg_bond_length(&geometry.elements[i], &geometry.elements[j])
}

/// Scan end point of an active bond.
pub fn scan_end_distance(
    geometry: &Geometry,
    rearrangement: &BondRearrangement,
    bond: (usize, usize),
    config: &Config,
) -> f64 {
    let r_eq = equilibrium_length(geometry, bond);
    if rearrangement.forming_bonds().contains(&normalise_bond(bond)) {
        r_eq
    } else {
        config.ts_guess.breaking_bond_scale * r_eq
    }
}

/// Places the fragments joined by forming bonds next to each other.
///
/// For a forming bond `(i, j)` across two fragments, the fragment of `j` is
/// translated so that `j` sits `breaking_bond_scale * r_eq` away from `i`,
/// along the direction from the centroid of `i`'s fragment to `i`. Every
/// fragment moves at most once; the fragment of the first forming bond's
/// first atom stays in place.
pub fn position_fragments(
    complex: &ReactionComplex,
    rearrangement: &BondRearrangement,
    config: &Config,
) -> Geometry {
    let mut geometry = complex.geometry.clone();
    if complex.n_fragments < 2 {
        return geometry;
    }

    let fragments = complex.graph.fragments();
    let fragment_of = |atom: usize| fragments.iter().position(|f| f.contains(&atom));
    let mut placed: BTreeSet<usize> = BTreeSet::new();

    for &(a, b) in rearrangement.forming_bonds() {
        let (Some(fa), Some(fb)) = (fragment_of(a), fragment_of(b)) else {
            continue;
        };
        if fa == fb {
            continue;
        }
        if placed.is_empty() {
            placed.insert(fa);
        }
        // move whichever side has not been positioned yet
        let (anchor, moving, moving_fragment) = if !placed.contains(&fb) {
            (a, b, fb)
        } else if !placed.contains(&fa) {
            (b, a, fa)
        } else {
            continue;
        };
        let anchor_fragment = if moving_fragment == fb { fa } else { fb };

        let direction = outward_direction(&geometry, &fragments[anchor_fragment], anchor);
        let distance = config.ts_guess.breaking_bond_scale * equilibrium_length(&geometry, (anchor, moving));
        let target = geometry.position(anchor) + direction * distance;
        let shift = target - geometry.position(moving);
        for &atom in &fragments[moving_fragment] {
            let p = geometry.position(atom) + shift;
            geometry.set_atom_coords(atom, [p.x, p.y, p.z]);
        }
        debug!(
            "Placed fragment of atom {} at {:.2} A from atom {}",
            moving, distance, anchor
        );
        placed.insert(moving_fragment);
    }
    geometry
}

/// Unit vector from the centroid of `fragment` to `atom`, or +x when the
/// atom sits on the centroid.
fn outward_direction(geometry: &Geometry, fragment: &[usize], atom: usize) -> Vector3<f64> {
    let centroid = fragment
        .iter()
        .fold(Vector3::zeros(), |acc, &i| acc + geometry.position(i))
        / fragment.len() as f64;
    let outward = geometry.position(atom) - centroid;
    if outward.norm() < 1e-6 {
        Vector3::x()
    } else {
        outward.normalize()
    }
}

/// Wraps a constrained optimisation result into a guess.
fn guess_from(
    name: &str,
    outcome: Option<(Geometry, f64)>,
    rearrangement: &BondRearrangement,
    reaction_type: ReactionType,
    constrained_bonds: Vec<(usize, usize)>,
) -> Option<TSGuess> {
    let (geometry, energy) = outcome?;
    Some(TSGuess {
        name: name.to_string(),
        geometry,
        rearrangement: rearrangement.clone(),
        reaction_type,
        constrained_bonds,
        energy: Some(energy),
    })
}

/// Guess from a stored template: a constrained optimisation holding the
/// active bonds at the template distances.
pub fn template_guess(
    ctx: &JobContext,
    start: &Geometry,
    template: &TsTemplate,
    rearrangement: &BondRearrangement,
    reaction_type: ReactionType,
    name: &str,
) -> Option<TSGuess> {
    let Some(constraints) = template.distances_for(ctx.complex, rearrangement) else {
        debug!("Template does not cover every active bond of {}", name);
        return None;
    };
    info!("Trying TS template for {}", name);
    let bonds = constraints.keys().copied().collect();
    let outcome = ctx.constrained_opt(start, constraints, name);
    guess_from(name, outcome, rearrangement, reaction_type, bonds)
}

/// Guess from one constrained optimisation with every active bond held at
/// `ts_bond_scale` times its equilibrium length.
pub fn constrained_opt_guess(
    ctx: &JobContext,
    start: &Geometry,
    rearrangement: &BondRearrangement,
    reaction_type: ReactionType,
    name: &str,
) -> Option<TSGuess> {
    let scale = ctx.config.ts_guess.ts_bond_scale;
    let constraints: DistanceConstraints = rearrangement
        .all()
        .into_iter()
        .map(|bond| (bond, scale * equilibrium_length(start, bond)))
        .collect();
    info!("Constrained optimisation guess {}", name);
    let bonds = constraints.keys().copied().collect();
    let outcome = ctx.constrained_opt(start, constraints, name);
    guess_from(name, outcome, rearrangement, reaction_type, bonds)
}

/// Guess from the highest interior point of a relaxed 1D scan over `bond`.
pub fn scan_1d_guess(
    ctx: &JobContext,
    start: &Geometry,
    bond: (usize, usize),
    n_steps: usize,
    rearrangement: &BondRearrangement,
    reaction_type: ReactionType,
    name: &str,
) -> Option<TSGuess> {
    let end = scan_end_distance(start, rearrangement, bond, ctx.config);
    info!(
        "1D scan {}: r({}-{}) {:.3} -> {:.3} A in {} steps",
        name,
        bond.0,
        bond.1,
        start.distance(bond.0, bond.1),
        end,
        n_steps
    );
    let points = relaxed_scan_1d(ctx, start, bond, end, n_steps, name);
    let Some(index) = find_1d_maximum(&points) else {
        info!("Scan {} has no interior energy maximum", name);
        return None;
    };
    let point = &points[index];
    let outcome = point.geometry.clone().zip(point.energy);
    guess_from(name, outcome, rearrangement, reaction_type, vec![normalise_bond(bond)])
}

/// Guess from the lowest-barrier path of a relaxed 2D scan over two bonds.
pub fn scan_2d_guess(
    ctx: &JobContext,
    start: &Geometry,
    bonds: ((usize, usize), (usize, usize)),
    n_steps: usize,
    rearrangement: &BondRearrangement,
    reaction_type: ReactionType,
    name: &str,
) -> Option<TSGuess> {
    let ends = (
        scan_end_distance(start, rearrangement, bonds.0, ctx.config),
        scan_end_distance(start, rearrangement, bonds.1, ctx.config),
    );
    info!(
        "2D scan {}: {:?} -> {:.3} A, {:?} -> {:.3} A on a {}x{} grid",
        name, bonds.0, ends.0, bonds.1, ends.1, n_steps, n_steps
    );
    let grid = relaxed_scan_2d(ctx, start, bonds, ends, n_steps, name);
    let energies: Vec<Vec<Option<f64>>> = grid
        .iter()
        .map(|row| row.iter().map(|p| p.energy).collect())
        .collect();
    let Some((i, j)) = find_2d_saddle(&energies) else {
        info!("Scan {} has no saddle point", name);
        return None;
    };
    let point = &grid[i][j];
    let outcome = point.geometry.clone().zip(point.energy);
    guess_from(
        name,
        outcome,
        rearrangement,
        reaction_type,
        vec![normalise_bond(bonds.0), normalise_bond(bonds.1)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::{Molecule, Role};

    fn atom(name: &str, el: &str) -> Molecule {
        let geom = Geometry::from_atoms(&[(el, 0.0, 0.0, 0.0)]);
        Molecule::new(name, Role::Reactant, geom, 0, 2, None, 1.25).unwrap()
    }

    fn h2() -> Molecule {
        let geom = Geometry::from_atoms(&[("H", 0.0, 0.0, 0.0), ("H", 0.74, 0.0, 0.0)]);
        Molecule::new("H2", Role::Reactant, geom, 0, 1, None, 1.25).unwrap()
    }

    #[test]
    fn test_scan_end_distance_depends_on_bond_role() {
        let complex = ReactionComplex::from_molecules(&[atom("H", "H"), h2()], Role::Reactant, 2.0, 1.25);
        let rearr = BondRearrangement::new(&[(0, 1)], &[(1, 2)]);
        let config = Config::default();
        let geom = &complex.geometry;
        assert!((scan_end_distance(geom, &rearr, (1, 0), &config) - 0.74).abs() < 1e-9);
        assert!((scan_end_distance(geom, &rearr, (1, 2), &config) - 1.48).abs() < 1e-9);
    }

    #[test]
    fn test_fragments_brought_together_for_forming_bond() {
        let complex = ReactionComplex::from_molecules(&[h2(), atom("H", "H")], Role::Reactant, 2.0, 1.25);
        assert!((complex.geometry.distance(1, 2) - 2.0).abs() < 1e-9);

        let rearr = BondRearrangement::new(&[(1, 2)], &[(0, 1)]);
        let config = Config::default();
        let placed = position_fragments(&complex, &rearr, &config);

        // H2 stays, the atom approaches along the H-H axis
        assert_eq!(placed.get_atom_coords(0), complex.geometry.get_atom_coords(0));
        assert!((placed.distance(1, 2) - 1.48).abs() < 1e-9);
        assert!((placed.distance(0, 2) - (0.74 + 1.48)).abs() < 1e-9);
    }

    #[test]
    fn test_single_fragment_is_not_moved() {
        let complex = ReactionComplex::from_molecules(&[h2()], Role::Reactant, 2.0, 1.25);
        let rearr = BondRearrangement::new(&[], &[(0, 1)]);
        let placed = position_fragments(&complex, &rearr, &Config::default());
        assert_eq!(placed, complex.geometry);
    }
}
