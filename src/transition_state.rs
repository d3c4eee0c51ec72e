//! Transition state validation and optimisation.
//!
//! A TS guess is accepted only when a frequency calculation shows exactly one
//! significant imaginary mode and that mode moves the atoms of the active
//! bonds. The guess is then optimised to the saddle point with the
//! high-level `opt_ts` keywords and validated again.
//!
//! # Mode alignment
//!
//! For a normal mode `u` and an atom pair `(i, j)` the instantaneous rate of
//! bond length change is
//!
//! ```text
//! dr_ij = |(u_j - u_i) . r_ij / |r_ij||
//! ```
//!
//! which is the projection of `u` on the Wilson B-matrix row of the bond
//! (see [`bond_gradient`]). The mode is *aligned* when the largest rate over
//! the active bonds is positive and not smaller than the largest rate over
//! every other bond of the graph.
//!
//! Rejections are ordinary values: the pipeline logs them and moves on to
//! the next strategy.

use crate::calculation::{CalcResult, Calculation};
use crate::complex::ReactionComplex;
use crate::config::{Config, KeywordKind, MethodLevel};
use crate::constraints::bond_gradient;
use crate::geometry::Geometry;
use crate::graph::normalise_bond;
use crate::naming::JobNaming;
use crate::qm_interface::QMInterface;
use crate::reaction::ReactionType;
use crate::rearrangement::BondRearrangement;
use crate::ts_guess::TSGuess;
use log::{debug, info};
use nalgebra::DVector;
use std::collections::BTreeSet;
use thiserror::Error;

/// Rates below this are treated as no motion at all.
const MIN_ALIGNMENT: f64 = 1e-6;

/// Why a TS guess or TS optimisation was not accepted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("calculation {0} failed")]
    JobFailed(String),

    #[error("no imaginary frequency of at least {threshold} cm^-1")]
    NoImaginaryMode { threshold: f64 },

    #[error("{} significant imaginary frequencies: {freqs:?}", .freqs.len())]
    MultipleImaginaryModes { freqs: Vec<f64> },

    #[error("normal mode displacements are not available")]
    NoModeDisplacements,

    #[error("imaginary mode does not follow the active bonds (active {active:.4}, other {other:.4})")]
    NotAligned { active: f64, other: f64 },
}

/// A validated transition state.
#[derive(Debug, Clone)]
pub struct TransitionState {
    pub name: String,
    pub geometry: Geometry,
    /// Energy in Hartree
    pub energy: Option<f64>,
    /// The single imaginary frequency in cm^-1 (negative)
    pub imag_freq: f64,
    pub mode_displacements: Vec<[f64; 3]>,
    pub rearrangement: BondRearrangement,
    pub reaction_type: ReactionType,
}

/// Rate of change of the `(i, j)` distance along a displacement.
pub fn bond_change_rate(geometry: &Geometry, mode: &DVector<f64>, (i, j): (usize, usize)) -> f64 {
    bond_gradient(&geometry.coords, i, j).dot(mode).abs()
}

/// Largest bond change rates over active bonds and over all other bonds.
pub fn mode_alignment(
    geometry: &Geometry,
    displacements: &[[f64; 3]],
    graph_bonds: &[(usize, usize)],
    active_bonds: &[(usize, usize)],
) -> (f64, f64) {
    let mode = DVector::from_iterator(
        displacements.len() * 3,
        displacements.iter().flat_map(|d| d.iter().copied()),
    );
    let active: BTreeSet<(usize, usize)> = active_bonds.iter().map(|&b| normalise_bond(b)).collect();
    let active_rate = max_rate(geometry, &mode, active.iter().copied());
    let other_rate = max_rate(
        geometry,
        &mode,
        graph_bonds
            .iter()
            .map(|&b| normalise_bond(b))
            .filter(|b| !active.contains(b)),
    );
    (active_rate, other_rate)
}

fn max_rate(
    geometry: &Geometry,
    mode: &DVector<f64>,
    bonds: impl Iterator<Item = (usize, usize)>,
) -> f64 {
    bonds
        .map(|b| bond_change_rate(geometry, mode, b))
        .fold(0.0, f64::max)
}

/// Checks that a frequency calculation describes a TS for `active_bonds`.
///
/// Returns the imaginary frequency on success.
pub fn check_imaginary_mode(
    imag_freqs: &[f64],
    min_imag_freq: f64,
    displacements: Option<&[[f64; 3]]>,
    geometry: &Geometry,
    graph_bonds: &[(usize, usize)],
    active_bonds: &[(usize, usize)],
) -> Result<f64, Rejection> {
    let significant: Vec<f64> = imag_freqs
        .iter()
        .copied()
        .filter(|f| f.abs() >= min_imag_freq)
        .collect();
    let freq = match significant.as_slice() {
        [] => {
            return Err(Rejection::NoImaginaryMode {
                threshold: min_imag_freq,
            })
        }
        [freq] => *freq,
        _ => return Err(Rejection::MultipleImaginaryModes { freqs: significant }),
    };

    let displacements = displacements.ok_or(Rejection::NoModeDisplacements)?;
    if displacements.len() != geometry.num_atoms {
        return Err(Rejection::NoModeDisplacements);
    }
    let (active, other) = mode_alignment(geometry, displacements, graph_bonds, active_bonds);
    debug!(
        "Imaginary mode {:.1} cm^-1: active bond rate {:.4}, other bond rate {:.4}",
        freq, active, other
    );
    if active < MIN_ALIGNMENT || active < other {
        return Err(Rejection::NotAligned { active, other });
    }
    Ok(freq)
}

/// Runs a high-level job on a guess geometry; failed jobs become rejections.
fn run_job(
    engine: &dyn QMInterface,
    config: &Config,
    complex: &ReactionComplex,
    guess: &TSGuess,
    geometry: &Geometry,
    kind: KeywordKind,
    name: &str,
) -> Result<CalcResult, Rejection> {
    let calc = Calculation::new(
        name,
        geometry.clone(),
        complex.charge,
        complex.mult,
        config.keywords(MethodLevel::High, kind).to_vec(),
        config,
    )
    .with_solvent(complex.solvent.clone())
    .with_bonds_to_add(guess.rearrangement.forming_bonds().to_vec());

    match calc.run(engine, config) {
        Ok(result) if result.terminated_normally => Ok(result),
        Ok(_) => Err(Rejection::JobFailed(name.to_string())),
        Err(e) => {
            debug!("{} could not be run: {}", name, e);
            Err(Rejection::JobFailed(name.to_string()))
        }
    }
}

/// Checks a guess with a Hessian calculation.
///
/// Returns the imaginary frequency when the guess is a plausible TS.
pub fn validate_guess(
    engine: &dyn QMInterface,
    config: &Config,
    complex: &ReactionComplex,
    guess: &TSGuess,
) -> Result<f64, Rejection> {
    let naming = JobNaming::new(&guess.name);
    let name = naming.hess_job(&guess.name);
    let result = run_job(engine, config, complex, guess, &guess.geometry, KeywordKind::Hess, &name)?;
    check_imaginary_mode(
        &result.imag_freqs,
        config.ts_guess.min_imag_freq,
        result.imag_mode.as_deref(),
        &guess.geometry,
        &complex.graph.bonds(),
        &guess.rearrangement.all(),
    )
}

/// Validates a guess, optimises it to the saddle point and validates again.
pub fn optimise_ts(
    engine: &dyn QMInterface,
    config: &Config,
    complex: &ReactionComplex,
    guess: &TSGuess,
) -> Result<TransitionState, Rejection> {
    validate_guess(engine, config, complex, guess)?;

    let naming = JobNaming::new(&guess.name);
    let name = naming.optts_job(&guess.name);
    let result = run_job(engine, config, complex, guess, &guess.geometry, KeywordKind::OptTs, &name)?;
    let geometry = result
        .final_geometry
        .clone()
        .ok_or_else(|| Rejection::JobFailed(name.clone()))?;
    let imag_freq = check_imaginary_mode(
        &result.imag_freqs,
        config.ts_guess.min_imag_freq,
        result.imag_mode.as_deref(),
        &geometry,
        &complex.graph.bonds(),
        &guess.rearrangement.all(),
    )?;

    info!(
        "Found TS {} with imaginary frequency {:.1} cm^-1",
        guess.name, imag_freq
    );
    Ok(TransitionState {
        name: guess.name.clone(),
        geometry,
        energy: result.energy,
        imag_freq,
        mode_displacements: result.imag_mode.unwrap_or_default(),
        rearrangement: guess.rearrangement.clone(),
        reaction_type: guess.reaction_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h3() -> Geometry {
        Geometry::from_atoms(&[("H", 0.0, 0.0, 0.0), ("H", 0.93, 0.0, 0.0), ("H", 1.86, 0.0, 0.0)])
    }

    // antisymmetric stretch: the central atom moves between the outer two
    fn asymmetric_stretch() -> Vec<[f64; 3]> {
        vec![[0.3, 0.0, 0.0], [-0.6, 0.0, 0.0], [0.3, 0.0, 0.0]]
    }

    #[test]
    fn test_single_aligned_mode_is_accepted() {
        let freq = check_imaginary_mode(
            &[-1500.0, -12.0],
            50.0,
            Some(asymmetric_stretch().as_slice()),
            &h3(),
            &[(1, 2)],
            &[(0, 1), (1, 2)],
        )
        .unwrap();
        assert_eq!(freq, -1500.0);
    }

    #[test]
    fn test_frequency_count_rejections() {
        let geom = h3();
        let mode = asymmetric_stretch();
        assert_eq!(
            check_imaginary_mode(&[-20.0], 50.0, Some(mode.as_slice()), &geom, &[], &[(0, 1)]),
            Err(Rejection::NoImaginaryMode { threshold: 50.0 })
        );
        assert!(matches!(
            check_imaginary_mode(&[-900.0, -300.0], 50.0, Some(mode.as_slice()), &geom, &[], &[(0, 1)]),
            Err(Rejection::MultipleImaginaryModes { .. })
        ));
        assert_eq!(
            check_imaginary_mode(&[-900.0], 50.0, None, &geom, &[], &[(0, 1)]),
            Err(Rejection::NoModeDisplacements)
        );
    }

    #[test]
    fn test_misaligned_mode_is_rejected() {
        let geom = h3();
        // atom 2 moves alone: only the spectator bond (1, 2) changes
        let mode = vec![[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.7, 0.0, 0.0]];
        let result = check_imaginary_mode(&[-700.0], 50.0, Some(mode.as_slice()), &geom, &[(1, 2)], &[(0, 1)]);
        assert!(matches!(result, Err(Rejection::NotAligned { .. })));

        // perpendicular motion changes no bond length to first order
        let mode = vec![[0.0, 0.5, 0.0], [0.0, -0.5, 0.0], [0.0, 0.5, 0.0]];
        let (active, _) = mode_alignment(&geom, &mode, &[], &[(0, 1)]);
        assert!(active < 1e-12);
    }
}
