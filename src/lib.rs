//! tsfinder - Automated Transition State Search
//!
//! tsfinder locates the transition states (TSs) of an elementary reaction
//! from nothing more than reactant and product structures. Every bond
//! rearrangement that turns the reactant molecular graph into the product
//! graph is enumerated, and for each one a fixed sequence of guess strategies
//! is tried until a geometry is found that optimises to a first-order saddle
//! point whose imaginary mode moves the active bonds.
//!
//! # Overview
//!
//! 1. **Graphs**: Molecules are turned into molecular graphs from covalent
//!    radii, or from bonds given explicitly in the input.
//! 2. **Complexes**: All reactants (and all products) are merged into one
//!    complex with the fragments spaced apart.
//! 3. **Rearrangements**: Product atoms are aligned onto reactant atoms and
//!    the sets of forming and breaking bonds are enumerated, smallest first,
//!    up to `max_bond_changes` changes.
//! 4. **Symmetry**: Rearrangements equivalent under the automorphisms of the
//!    reactant graph are searched only once.
//! 5. **Guesses**: Per rearrangement, TS guesses come from saved templates,
//!    constrained optimisations and 1D/2D relaxed scans at a low and a high
//!    method level.
//! 6. **Validation**: A guess is accepted when its Hessian has exactly one
//!    significant imaginary frequency whose mode stretches the active bonds,
//!    both before and after TS optimisation.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use tsfinder::config::Config;
//! use tsfinder::locate::locate_tss;
//! use tsfinder::parser::parse_input;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let input = parse_input(Path::new("reaction.inp"), Config::default())?;
//!     let reaction = input.build_reaction()?;
//!
//!     for outcome in locate_tss(&reaction, &input.config)? {
//!         match outcome.ts {
//!             Some(ts) => println!("{}: {:.1} cm^-1", ts.name, ts.imag_freq),
//!             None => println!("{}: no TS", outcome.rearrangement),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Supported QM Programs
//!
//! | Program | Typical use | Hessian | Implicit solvent |
//! |---------|-------------|---------|------------------|
//! | XTB     | Low level scans | `--hess` | ALPB |
//! | ORCA    | Low or high level | `Freq` | CPCM |
//! | NWChem  | Low or high level | `task freq` | COSMO |
//!
//! # Input File Format
//!
//! ```text
//! name = SN2
//! solvent = water
//! low_program = xtb
//! high_program = orca
//!
//! *REACTANT F- charge=-1 mult=1
//! F  -4.0 0.0 0.0
//! *
//!
//! *REACTANT CH3Cl charge=0 mult=1
//! @ch3cl.xyz
//! *
//!
//! *PRODUCT CH3F charge=0 mult=1
//! @ch3f.xyz
//! *
//!
//! *PRODUCT Cl- charge=-1 mult=1
//! Cl 4.0 0.0 0.0
//! *
//! ```
//!
//! # Modules
//!
//! - [`geometry`] / [`bonds`] / [`io`] - Cartesian structures and xyz files
//! - [`graph`] / [`isomorphism`] - Molecular graphs and graph symmetry
//! - [`molecule`] / [`reaction`] / [`complex`] - Chemical species
//! - [`rearrangement`] - Bond rearrangement enumeration
//! - [`qm_interface`] / [`calculation`] - Electronic structure programs
//! - [`scan`] / [`constraints`] - Relaxed scans and distance constraints
//! - [`ts_guess`] / [`templates`] / [`pipeline`] - TS guess strategies
//! - [`transition_state`] - TS validation and optimisation
//! - [`locate`] - The complete search
//! - [`config`] / [`settings`] / [`parser`] / [`validation`] - Setup

pub mod bonds;
pub mod calculation;
/// Automated file cleanup for quantum chemistry calculations
pub mod cleanup;
pub mod complex;
pub mod config;
pub mod constraints;
pub mod geometry;
pub mod graph;
pub mod io;
pub mod isomorphism;
pub mod locate;
pub mod molecule;
/// Job and file naming based on the reaction name
pub mod naming;
pub mod parser;
pub mod pipeline;
pub mod qm_interface;
pub mod reaction;
pub mod rearrangement;
/// Relaxed 1D and 2D scans along bond distances
pub mod scan;
/// Configuration management system
pub mod settings;
/// Input file templates
pub mod template_generator;
pub mod templates;
pub mod transition_state;
pub mod ts_guess;
/// Pre-flight checks of a search setup
pub mod validation;

pub use config::Config;
pub use geometry::Geometry;
pub use locate::{locate_tss, RearrangementOutcome};
pub use reaction::Reaction;
