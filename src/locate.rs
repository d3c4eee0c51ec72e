//! Transition state search for a whole reaction.
//!
//! This is the top level of the library:
//!
//! 1. Build the reactant and product complexes.
//! 2. Align product atoms onto reactant atoms and enumerate the bond
//!    rearrangements connecting the two graphs, smallest first.
//! 3. Remove rearrangements that are equivalent by the symmetry of the
//!    reactant complex.
//! 4. Run the strategy pipeline of every remaining rearrangement. Pipelines
//!    of different rearrangements are independent and run concurrently on a
//!    thread pool of `max_workers` threads.
//! 5. Write every TS found as `<name>_ts.xyz`, save new TS templates and
//!    write the JSON summary `<reaction>_tss.json`.
//!
//! Structural problems (bad input topology, atoms that cannot be aligned)
//! are errors. A rearrangement for which no TS could be found is not: it is
//! reported in the result with `ts == None`.

use crate::complex::{get_reactant_and_product_complexes, ReactionComplex};
use crate::config::{Config, MethodLevel, QMProgram};
use crate::geometry::SerializableGeometry;
use crate::io::{write_json, write_xyz};
use crate::isomorphism::strip_equivalent;
use crate::molecule::MoleculeError;
use crate::naming::JobNaming;
use crate::pipeline::{find_ts, SearchContext};
use crate::qm_interface::{create_interface, QMError, QMInterface};
use crate::reaction::{Reaction, ReactionError, ReactionType};
use crate::rearrangement::{align_atoms, enumerate_rearrangements, BondRearrangement, RearrangementError};
use crate::templates::{TemplateKey, TemplateLibrary, TsTemplate};
use crate::transition_state::TransitionState;
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use thiserror::Error;

/// Errors that abort a TS search.
#[derive(Error, Debug)]
pub enum LocateError {
    #[error(transparent)]
    Molecule(#[from] MoleculeError),

    #[error(transparent)]
    Reaction(#[from] ReactionError),

    #[error(transparent)]
    Rearrangement(#[from] RearrangementError),

    #[error(transparent)]
    Qm(#[from] QMError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("{level:?} level program {program} is not available")]
    EngineUnavailable { level: MethodLevel, program: QMProgram },
}

pub type Result<T> = std::result::Result<T, LocateError>;

/// Search result for one bond rearrangement.
#[derive(Debug, Clone)]
pub struct RearrangementOutcome {
    pub rearrangement: BondRearrangement,
    pub reaction_type: ReactionType,
    pub ts: Option<TransitionState>,
}

/// Enumerates the symmetry-unique rearrangements from `reactant` to
/// `product`.
pub fn get_bond_rearrangs(
    reactant: &ReactionComplex,
    product: &ReactionComplex,
    config: &Config,
) -> Result<Vec<BondRearrangement>> {
    let mapping = align_atoms(&reactant.geometry.elements, &product.geometry.elements)?;
    let aligned = product.reordered(&mapping);
    let found = enumerate_rearrangements(&reactant.graph, &aligned.graph, config.search.max_bond_changes)?;
    let n_found = found.len();
    let unique = strip_equivalent(found, &reactant.graph, config.search.max_automorphisms);
    info!(
        "Found {} bond rearrangement(s), {} unique by symmetry",
        n_found,
        unique.len()
    );
    Ok(unique)
}

/// Runs the pipelines of all rearrangements, `max_workers` at a time.
///
/// Outcomes are returned in the order of `rearrangements`.
pub fn find_tss(
    ctx: &SearchContext,
    reaction: &Reaction,
    reactant: &ReactionComplex,
    rearrangements: &[BondRearrangement],
) -> Result<Vec<RearrangementOutcome>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ctx.config.max_workers.max(1))
        .build()?;

    let outcomes: Vec<RearrangementOutcome> = pool.install(|| {
        rearrangements
            .par_iter()
            .map(|rearrangement| RearrangementOutcome {
                rearrangement: rearrangement.clone(),
                reaction_type: reaction.classify(rearrangement),
                ts: find_ts(ctx, reaction, reactant, rearrangement),
            })
            .collect()
    });
    Ok(outcomes)
}

/// Locates transition states with the configured electronic structure
/// programs.
pub fn locate_tss(reaction: &Reaction, config: &Config) -> Result<Vec<RearrangementOutcome>> {
    let low = create_interface(&config.low_level);
    let high = create_interface(&config.high_level);
    for (level, engine) in [(MethodLevel::Low, &low), (MethodLevel::High, &high)] {
        if !engine.is_available() {
            return Err(LocateError::EngineUnavailable {
                level,
                program: engine.program(),
            });
        }
    }
    locate_tss_with(reaction, config, low.as_ref(), high.as_ref())
}

/// Locates transition states with the given engines.
pub fn locate_tss_with(
    reaction: &Reaction,
    config: &Config,
    low: &dyn QMInterface,
    high: &dyn QMInterface,
) -> Result<Vec<RearrangementOutcome>> {
    info!("Locating transition states for {}", reaction.name);
    let (reactant, product) = get_reactant_and_product_complexes(reaction, config);

    let rearrangements = get_bond_rearrangs(&reactant, &product, config)?;
    if rearrangements.is_empty() {
        warn!("No bond rearrangement connects reactants and products");
    }

    let mut templates = TemplateLibrary::load(&config.ts_guess.template_dir);
    let ctx = SearchContext {
        config,
        low,
        high,
        templates: &templates,
    };
    let outcomes = find_tss(&ctx, reaction, &reactant, &rearrangements)?;

    fs::create_dir_all(&config.work_dir)?;
    let naming = JobNaming::new(&reaction.name);
    for outcome in &outcomes {
        let Some(ts) = &outcome.ts else {
            continue;
        };
        let path = config.work_dir.join(naming.ts_xyz(&ts.name));
        write_xyz(&ts.geometry, &path, &format!("{} E = {:?}", ts.name, ts.energy))?;
        info!("Wrote TS {} to {}", ts.name, path.display());

        if config.ts_guess.save_templates {
            let key = TemplateKey::new(outcome.reaction_type, &reactant, &outcome.rearrangement);
            if templates.find(&key).is_none() {
                let template = TsTemplate::from_ts(key, &reactant, &outcome.rearrangement, &ts.geometry);
                match templates.save(template) {
                    Ok(path) => info!("Saved TS template {}", path.display()),
                    Err(e) => warn!("Could not save TS template: {}", e),
                }
            }
        }
    }

    let summary = SearchSummary::new(reaction, &outcomes);
    let summary_path = config.work_dir.join(naming.summary_file());
    write_json(&summary, &summary_path)?;
    info!(
        "{} of {} rearrangement(s) gave a TS, summary in {}",
        summary.n_found,
        outcomes.len(),
        summary_path.display()
    );
    Ok(outcomes)
}

#[derive(Debug, Serialize)]
struct TsRecord {
    name: String,
    energy: Option<f64>,
    imag_freq: f64,
    geometry: SerializableGeometry,
    mode_displacements: Vec<[f64; 3]>,
}

#[derive(Debug, Serialize)]
struct RearrangementRecord {
    reaction_type: ReactionType,
    forming_bonds: Vec<(usize, usize)>,
    breaking_bonds: Vec<(usize, usize)>,
    ts: Option<TsRecord>,
}

/// JSON summary of a search.
#[derive(Debug, Serialize)]
struct SearchSummary {
    reaction: String,
    n_found: usize,
    rearrangements: Vec<RearrangementRecord>,
}

impl SearchSummary {
    fn new(reaction: &Reaction, outcomes: &[RearrangementOutcome]) -> Self {
        let rearrangements: Vec<RearrangementRecord> = outcomes
            .iter()
            .map(|outcome| RearrangementRecord {
                reaction_type: outcome.reaction_type,
                forming_bonds: outcome.rearrangement.forming_bonds().to_vec(),
                breaking_bonds: outcome.rearrangement.breaking_bonds().to_vec(),
                ts: outcome.ts.as_ref().map(|ts| TsRecord {
                    name: ts.name.clone(),
                    energy: ts.energy,
                    imag_freq: ts.imag_freq,
                    geometry: SerializableGeometry::from(&ts.geometry),
                    mode_displacements: ts.mode_displacements.clone(),
                }),
            })
            .collect();
        Self {
            reaction: reaction.name.clone(),
            n_found: rearrangements.iter().filter(|r| r.ts.is_some()).count(),
            rearrangements,
        }
    }
}
