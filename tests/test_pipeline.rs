//! End-to-end searches driven by a scripted electronic structure engine.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tsfinder::calculation::Calculation;
use tsfinder::config::{Config, QMProgram};
use tsfinder::geometry::Geometry;
use tsfinder::locate::locate_tss_with;
use tsfinder::molecule::{Molecule, Role};
use tsfinder::qm_interface::{QMInterface, Result};
use tsfinder::reaction::{Reaction, ReactionType};

/// Engine writing a plain text output:
///
/// ```text
/// NORMAL TERMINATION
/// ENERGY <e>
/// CONVERGED
/// GEOM <el> <x> <y> <z>     one line per atom
/// IMAG <freq>               Hessian jobs only
/// MODE <dx> <dy> <dz>       one line per atom, Hessian jobs only
/// ```
///
/// Optimisations satisfy the distance constraints exactly by moving the
/// second atom of each constrained pair. Hessian jobs report a single mode
/// that shortens every forming bond.
struct FakeEngine {
    imag_freq: f64,
    hess_jobs: AtomicUsize,
    jobs: AtomicUsize,
}

impl FakeEngine {
    fn new(imag_freq: f64) -> Self {
        Self {
            imag_freq,
            hess_jobs: AtomicUsize::new(0),
            jobs: AtomicUsize::new(0),
        }
    }

    fn output(&self, calc: &Calculation) -> String {
        let mut geometry = calc.geometry.clone();
        for (&(i, j), &target) in &calc.distance_constraints {
            let (pi, pj) = (geometry.position(i), geometry.position(j));
            let p = pi + (pj - pi).normalize() * target;
            geometry.set_atom_coords(j, [p.x, p.y, p.z]);
        }

        // barrier where the two active distances are equal
        let energy = match calc.bond_ids_to_add.first() {
            Some(&(i, j)) => -1.5 - 0.1 * (geometry.distance(i, j) - 0.74).abs(),
            None => -1.5,
        };

        let mut out = format!("NORMAL TERMINATION\nENERGY {}\nCONVERGED\n", energy);
        for k in 0..geometry.num_atoms {
            let [x, y, z] = geometry.get_atom_coords(k);
            out.push_str(&format!("GEOM {} {} {} {}\n", geometry.elements[k], x, y, z));
        }

        if calc.name.ends_with("_hess") || calc.name.ends_with("_optts") {
            if calc.name.ends_with("_hess") {
                self.hess_jobs.fetch_add(1, Ordering::SeqCst);
            }
            out.push_str(&format!("IMAG {}\n", self.imag_freq));
            let mut mode = vec![[0.0; 3]; geometry.num_atoms];
            for &(i, j) in &calc.bond_ids_to_add {
                let u = (geometry.position(j) - geometry.position(i)).normalize() * 0.5;
                for c in 0..3 {
                    mode[i][c] += u[c];
                    mode[j][c] -= u[c];
                }
            }
            for [dx, dy, dz] in mode {
                out.push_str(&format!("MODE {} {} {}\n", dx, dy, dz));
            }
        }
        out
    }
}

fn values<'a>(output: &'a str, tag: &'a str) -> impl Iterator<Item = Vec<&'a str>> + 'a {
    output.lines().filter_map(move |line| {
        let mut parts = line.split_whitespace();
        (parts.next() == Some(tag)).then(|| parts.collect())
    })
}

impl QMInterface for FakeEngine {
    fn program(&self) -> QMProgram {
        QMProgram::Xtb
    }

    fn is_available(&self) -> bool {
        true
    }

    fn available_solvents(&self) -> &'static [&'static str] {
        &["water"]
    }

    fn input_filename(&self, job_name: &str) -> String {
        format!("{}.inp", job_name)
    }

    fn output_filename(&self, job_name: &str) -> String {
        format!("{}.out", job_name)
    }

    fn write_input(&self, calc: &Calculation, path: &Path) -> Result<()> {
        fs::write(path, &calc.name)?;
        Ok(())
    }

    fn run_calculation(
        &self,
        calc: &Calculation,
        _input_path: &Path,
        output_path: &Path,
        _timeout: Option<Duration>,
    ) -> Result<()> {
        self.jobs.fetch_add(1, Ordering::SeqCst);
        fs::write(output_path, self.output(calc))?;
        Ok(())
    }

    fn terminated_normally(&self, output: &str) -> bool {
        output.contains("NORMAL TERMINATION")
    }

    fn get_energy(&self, output: &str) -> Option<f64> {
        values(output, "ENERGY").next()?.first()?.parse().ok()
    }

    fn optimisation_converged(&self, output: &str) -> bool {
        output.contains("CONVERGED")
    }

    fn optimisation_nearly_converged(&self, output: &str) -> bool {
        self.optimisation_converged(output)
    }

    fn get_imag_freqs(&self, output: &str) -> Vec<f64> {
        values(output, "IMAG")
            .filter_map(|v| v.first().and_then(|f| f.parse().ok()))
            .collect()
    }

    fn get_normal_mode_displacements(
        &self,
        output: &str,
        _mode_number: usize,
        n_atoms: usize,
    ) -> Option<Vec<[f64; 3]>> {
        let mode: Vec<[f64; 3]> = values(output, "MODE")
            .map(|v| {
                let f: Vec<f64> = v.iter().filter_map(|s| s.parse().ok()).collect();
                [f[0], f[1], f[2]]
            })
            .collect();
        (mode.len() == n_atoms).then_some(mode)
    }

    fn get_final_geometry(&self, output: &str, n_atoms: usize) -> Option<Geometry> {
        let mut elements = Vec::new();
        let mut coords = Vec::new();
        for v in values(output, "GEOM") {
            elements.push(v[0].to_string());
            coords.extend(v[1..].iter().filter_map(|s| s.parse::<f64>().ok()));
        }
        (elements.len() == n_atoms).then(|| Geometry::new(elements, coords))
    }
}

fn hydrogen(role: Role) -> Molecule {
    let geom = Geometry::from_atoms(&[("H", 0.0, 0.0, 0.0)]);
    Molecule::new("H", role, geom, 0, 2, None, 1.25).unwrap()
}

fn dihydrogen(role: Role) -> Molecule {
    let geom = Geometry::from_atoms(&[("H", 0.0, 0.0, 0.0), ("H", 0.74, 0.0, 0.0)]);
    Molecule::new("H2", role, geom, 0, 1, None, 1.25).unwrap()
}

/// H2 + H -> H + H2
fn exchange() -> Reaction {
    let molecules = vec![
        dihydrogen(Role::Reactant),
        hydrogen(Role::Reactant),
        hydrogen(Role::Product),
        dihydrogen(Role::Product),
    ];
    Reaction::new(molecules, None, None).unwrap()
}

fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.work_dir = dir.join("jobs");
    config.ts_guess.template_dir = dir.join("templates");
    config.ts_guess.scan_steps = 5;
    config.ts_guess.opt_level_scan_steps = 5;
    config.ts_guess.scan_2d_steps = 3;
    config
}

fn files_with_suffix(dir: &Path, suffix: &str) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| name.ends_with(suffix))
        .collect()
}

#[test]
fn test_exchange_ts_found_by_first_guess() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let engine = FakeEngine::new(-1400.0);
    let reaction = exchange();

    let outcomes = locate_tss_with(&reaction, &config, &engine, &engine).unwrap();
    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert_eq!(outcome.reaction_type, ReactionType::Substitution);
    assert_eq!(outcome.rearrangement.forming_bonds(), &[(1, 2)]);
    assert_eq!(outcome.rearrangement.breaking_bonds(), &[(0, 1)]);

    // no template yet, so the low-level constrained optimisation comes first
    let ts = outcome.ts.as_ref().unwrap();
    assert_eq!(ts.name, "H2+H--H+H2_0-1_1-2_ll_const");
    assert_eq!(ts.imag_freq, -1400.0);
    assert!((ts.geometry.distance(1, 2) - 1.3 * 0.74).abs() < 1e-6);
    assert!((ts.geometry.distance(0, 1) - 1.3 * 0.74).abs() < 1e-6);
    // later strategies never ran
    assert_eq!(engine.hess_jobs.load(Ordering::SeqCst), 1);

    assert_eq!(files_with_suffix(&config.work_dir, "_ts.xyz").len(), 1);
    let summary: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(config.work_dir.join("H2+H--H+H2_tss.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(summary["n_found"], 1);
    assert_eq!(summary["rearrangements"][0]["forming_bonds"][0][0], 1);

    assert_eq!(files_with_suffix(&config.ts_guess.template_dir, ".json").len(), 1);
}

#[test]
fn test_saved_template_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    let first = FakeEngine::new(-1400.0);
    locate_tss_with(&exchange(), &config, &first, &first).unwrap();

    config.work_dir = dir.path().join("second");
    let second = FakeEngine::new(-1400.0);
    let outcomes = locate_tss_with(&exchange(), &config, &second, &second).unwrap();
    let ts = outcomes[0].ts.as_ref().unwrap();
    assert_eq!(ts.name, "H2+H--H+H2_0-1_1-2_template");
    assert!((ts.geometry.distance(1, 2) - 1.3 * 0.74).abs() < 1e-6);

    // the matching template is not saved twice
    assert_eq!(files_with_suffix(&config.ts_guess.template_dir, ".json").len(), 1);
}

#[test]
fn test_no_ts_when_every_guess_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    // below min_imag_freq: every Hessian looks like a minimum
    let engine = FakeEngine::new(-10.0);

    let outcomes = locate_tss_with(&exchange(), &config, &engine, &engine).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].ts.is_none());
    assert!(engine.hess_jobs.load(Ordering::SeqCst) >= 2);
    assert!(engine.jobs.load(Ordering::SeqCst) > 10);

    assert!(files_with_suffix(&config.work_dir, "_ts.xyz").is_empty());
    assert!(files_with_suffix(&config.ts_guess.template_dir, ".json").is_empty());
    let summary = fs::read_to_string(config.work_dir.join("H2+H--H+H2_tss.json")).unwrap();
    assert!(summary.contains("\"n_found\": 0"));
}
