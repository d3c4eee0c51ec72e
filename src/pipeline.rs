//! Ordered TS guess strategies for one bond rearrangement.
//!
//! [`generate_ts_guesses`] builds a fixed plan of strategy entries from the
//! shape of a rearrangement. [`find_ts`] runs the entries strictly in order
//! and stops at the first guess that survives validation and TS
//! optimisation; later entries are never started.
//!
//! # Plans
//!
//! | active bonds                                | entries                                                              |
//! |---------------------------------------------|----------------------------------------------------------------------|
//! | 1                                           | template, ll1d, hl1d, hl1d_opt_level                                 |
//! | 1 forming + 1 breaking sharing an atom      | template, ll_const, ll1d_fbond, ll1d_bbond, ll2d, hl_const, hl2d     |
//! | 2, any other case                           | template, ll_const, ll2d, hl_const, hl2d                             |
//! | 3 or more                                   | template, ll_const, ll2d per atom-sharing (forming, breaking) pair, hl_const |
//!
//! `ll` entries run at the low method level, `hl` entries at the high one.

use crate::complex::ReactionComplex;
use crate::config::{Config, KeywordKind, MethodLevel};
use crate::geometry::Geometry;
use crate::naming::JobNaming;
use crate::qm_interface::QMInterface;
use crate::reaction::{Reaction, ReactionType};
use crate::rearrangement::BondRearrangement;
use crate::scan::JobContext;
use crate::templates::{TemplateKey, TemplateLibrary};
use crate::transition_state::{optimise_ts, TransitionState};
use crate::ts_guess::{self, TSGuess};
use log::{debug, info, warn};
use std::fmt;

/// Shared, read-only state of a TS search.
pub struct SearchContext<'a> {
    pub config: &'a Config,
    pub low: &'a dyn QMInterface,
    pub high: &'a dyn QMInterface,
    pub templates: &'a TemplateLibrary,
}

impl SearchContext<'_> {
    pub fn engine(&self, level: MethodLevel) -> &dyn QMInterface {
        match level {
            MethodLevel::Low => self.low,
            MethodLevel::High => self.high,
        }
    }
}

/// Kind of TS guess strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Template,
    ConstrainedOpt,
    Scan1d,
    Scan2d,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Template => "template",
            Strategy::ConstrainedOpt => "constrained optimisation",
            Strategy::Scan1d => "1D scan",
            Strategy::Scan2d => "2D scan",
        };
        f.write_str(name)
    }
}

/// One planned strategy run.
#[derive(Debug, Clone)]
pub struct PipelineEntry<'a> {
    pub strategy: Strategy,
    pub complex: &'a ReactionComplex,
    /// Bonds the strategy acts on
    pub bonds: Vec<(usize, usize)>,
    /// Points per scanned dimension, 0 for non-scan strategies
    pub n_steps: usize,
    /// Unique job name
    pub name: String,
    pub reaction_type: ReactionType,
    pub level: MethodLevel,
    pub keywords: KeywordKind,
}

/// Builds the ordered strategy plan for a rearrangement of `complex`.
pub fn generate_ts_guesses<'a>(
    reaction: &Reaction,
    complex: &'a ReactionComplex,
    rearrangement: &BondRearrangement,
    config: &Config,
) -> Vec<PipelineEntry<'a>> {
    let naming = JobNaming::new(&reaction.name);
    let reaction_type = reaction.classify(rearrangement);
    let all = rearrangement.all();
    let settings = &config.ts_guess;

    let entry = |strategy, bonds: Vec<(usize, usize)>, suffix: &str, level, keywords, n_steps| PipelineEntry {
        strategy,
        complex,
        name: naming.strategy_job(&bonds, suffix),
        bonds,
        n_steps,
        reaction_type,
        level,
        keywords,
    };
    let template = || entry(Strategy::Template, all.clone(), "template", MethodLevel::High, KeywordKind::Opt, 0);
    let constrained = |level: MethodLevel| {
        let suffix = format!("{}_const", level.tag());
        entry(Strategy::ConstrainedOpt, all.clone(), &suffix, level, KeywordKind::Opt, 0)
    };
    let scan_2d = |bonds: Vec<(usize, usize)>, level: MethodLevel| {
        let suffix = format!("{}2d", level.tag());
        entry(Strategy::Scan2d, bonds, &suffix, level, KeywordKind::Scan, settings.scan_2d_steps)
    };

    let mut plan = vec![template()];
    match all.as_slice() {
        [] => {}
        [bond] => {
            let scan_1d = |suffix: &str, level, keywords, n_steps| {
                entry(Strategy::Scan1d, vec![*bond], suffix, level, keywords, n_steps)
            };
            plan.push(scan_1d("ll1d", MethodLevel::Low, KeywordKind::Scan, settings.scan_steps));
            plan.push(scan_1d("hl1d", MethodLevel::High, KeywordKind::Scan, settings.scan_steps));
            plan.push(scan_1d(
                "hl1d_opt_level",
                MethodLevel::High,
                KeywordKind::Opt,
                settings.opt_level_scan_steps,
            ));
        }
        [_, _] => {
            plan.push(constrained(MethodLevel::Low));
            if let ([fbond], [bbond]) = (rearrangement.forming_bonds(), rearrangement.breaking_bonds()) {
                if shares_atom(*fbond, *bbond) {
                    let scan_1d = |bond, suffix: &str| {
                        entry(Strategy::Scan1d, vec![bond], suffix, MethodLevel::Low, KeywordKind::Scan, settings.scan_steps)
                    };
                    plan.push(scan_1d(*fbond, "ll1d_fbond"));
                    plan.push(scan_1d(*bbond, "ll1d_bbond"));
                }
            }
            plan.push(scan_2d(all.clone(), MethodLevel::Low));
            plan.push(constrained(MethodLevel::High));
            plan.push(scan_2d(all.clone(), MethodLevel::High));
        }
        _ => {
            plan.push(constrained(MethodLevel::Low));
            for &fbond in rearrangement.forming_bonds() {
                for &bbond in rearrangement.breaking_bonds() {
                    if shares_atom(fbond, bbond) {
                        plan.push(scan_2d(vec![fbond, bbond], MethodLevel::Low));
                    }
                }
            }
            plan.push(constrained(MethodLevel::High));
        }
    }
    plan
}

fn shares_atom(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 == b.0 || a.0 == b.1 || a.1 == b.0 || a.1 == b.1
}

/// Runs one entry and returns its guess, if any.
pub fn run_entry(
    ctx: &SearchContext,
    entry: &PipelineEntry,
    start: &Geometry,
    rearrangement: &BondRearrangement,
) -> Option<TSGuess> {
    let job = JobContext {
        engine: ctx.engine(entry.level),
        config: ctx.config,
        complex: entry.complex,
        keywords: ctx.config.keywords(entry.level, entry.keywords),
        bonds_to_add: rearrangement.forming_bonds().to_vec(),
    };
    let reaction_type = entry.reaction_type;

    match entry.strategy {
        Strategy::Template => {
            let key = TemplateKey::new(reaction_type, entry.complex, rearrangement);
            let Some(template) = ctx.templates.find(&key) else {
                debug!("No TS template for {}", entry.name);
                return None;
            };
            ts_guess::template_guess(&job, start, template, rearrangement, reaction_type, &entry.name)
        }
        Strategy::ConstrainedOpt => {
            ts_guess::constrained_opt_guess(&job, start, rearrangement, reaction_type, &entry.name)
        }
        Strategy::Scan1d => {
            let &bond = entry.bonds.first()?;
            ts_guess::scan_1d_guess(&job, start, bond, entry.n_steps, rearrangement, reaction_type, &entry.name)
        }
        Strategy::Scan2d => {
            let [a, b] = entry.bonds[..] else {
                warn!("2D scan {} needs exactly two bonds", entry.name);
                return None;
            };
            ts_guess::scan_2d_guess(&job, start, (a, b), entry.n_steps, rearrangement, reaction_type, &entry.name)
        }
    }
}

/// Tries the strategy plan of one rearrangement until a TS is found.
///
/// Returns `None` when every strategy failed or was rejected.
pub fn find_ts(
    ctx: &SearchContext,
    reaction: &Reaction,
    complex: &ReactionComplex,
    rearrangement: &BondRearrangement,
) -> Option<TransitionState> {
    let plan = generate_ts_guesses(reaction, complex, rearrangement, ctx.config);
    let start = ts_guess::position_fragments(complex, rearrangement, ctx.config);
    info!(
        "Searching TS for {} {} with {} strategies",
        reaction.classify(rearrangement),
        rearrangement,
        plan.len()
    );

    for entry in &plan {
        debug!("Strategy {}: {}", entry.strategy, entry.name);
        let Some(guess) = run_entry(ctx, entry, &start, rearrangement) else {
            continue;
        };
        match optimise_ts(ctx.high, ctx.config, complex, &guess) {
            Ok(ts) => return Some(ts),
            Err(rejection) => warn!("TS guess {} rejected: {}", guess.name, rejection),
        }
    }
    warn!("No TS found for {}", rearrangement);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::get_reactant_and_product_complexes;
    use crate::molecule::{Molecule, Role};

    fn h2(role: Role) -> Molecule {
        let geometry = Geometry::from_atoms(&[("H", 0.0, 0.0, 0.0), ("H", 0.74, 0.0, 0.0)]);
        Molecule::new("H2", role, geometry, 0, 1, None, 1.25).unwrap()
    }

    fn h2_dimer() -> Reaction {
        let molecules = vec![h2(Role::Reactant), h2(Role::Reactant), h2(Role::Product), h2(Role::Product)];
        Reaction::new(molecules, None, None).unwrap()
    }

    fn names(plan: &[PipelineEntry]) -> Vec<String> {
        plan.iter().map(|e| e.name.clone()).collect()
    }

    #[test]
    fn test_plan_for_two_separate_bonds() {
        let config = Config::default();
        let reaction = h2_dimer();
        let (reactant, _) = get_reactant_and_product_complexes(&reaction, &config);
        let rearrangement = BondRearrangement::new(&[(0, 2)], &[(1, 3)]);

        let plan = generate_ts_guesses(&reaction, &reactant, &rearrangement, &config);
        assert_eq!(
            names(&plan),
            vec![
                "H2+H2--H2+H2_0-2_1-3_template",
                "H2+H2--H2+H2_0-2_1-3_ll_const",
                "H2+H2--H2+H2_0-2_1-3_ll2d",
                "H2+H2--H2+H2_0-2_1-3_hl_const",
                "H2+H2--H2+H2_0-2_1-3_hl2d",
            ]
        );
        assert!(plan.iter().all(|e| e.strategy != Strategy::Scan1d));
        assert_eq!(plan[2].n_steps, config.ts_guess.scan_2d_steps);
        assert_eq!(plan[4].level, MethodLevel::High);
    }

    #[test]
    fn test_plan_for_three_bonds() {
        let config = Config::default();
        let reaction = h2_dimer();
        let (reactant, _) = get_reactant_and_product_complexes(&reaction, &config);
        let rearrangement = BondRearrangement::new(&[(0, 2), (1, 3)], &[(0, 1)]);

        let plan = generate_ts_guesses(&reaction, &reactant, &rearrangement, &config);
        assert_eq!(
            names(&plan),
            vec![
                "H2+H2--H2+H2_0-2_1-3_0-1_template",
                "H2+H2--H2+H2_0-2_1-3_0-1_ll_const",
                "H2+H2--H2+H2_0-2_0-1_ll2d",
                "H2+H2--H2+H2_1-3_0-1_ll2d",
                "H2+H2--H2+H2_0-2_1-3_0-1_hl_const",
            ]
        );
        assert_eq!(plan[2].bonds, vec![(0, 2), (0, 1)]);
        assert_eq!(plan[2].level, MethodLevel::Low);
        assert!(plan.iter().all(|e| e.reaction_type == ReactionType::Rearrangement));
    }

    #[test]
    fn test_plan_scans_only_atom_sharing_pairs() {
        let config = Config::default();
        let reaction = h2_dimer();
        let (reactant, _) = get_reactant_and_product_complexes(&reaction, &config);
        let rearrangement = BondRearrangement::new(&[(0, 3)], &[(1, 2), (2, 3)]);
        // (0, 3) shares atom 3 with (2, 3) only
        let plan = generate_ts_guesses(&reaction, &reactant, &rearrangement, &config);
        let strategies: Vec<Strategy> = plan.iter().map(|e| e.strategy).collect();
        assert_eq!(
            strategies,
            vec![Strategy::Template, Strategy::ConstrainedOpt, Strategy::Scan2d, Strategy::ConstrainedOpt]
        );
        assert_eq!(plan[2].bonds, vec![(0, 3), (2, 3)]);
        assert_eq!(plan[0].reaction_type, ReactionType::Elimination);
    }
}
