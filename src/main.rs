//! tsfinder command line program.
//!
//! # Usage
//!
//! ```bash
//! # Locate transition states for the reaction described in an input file
//! tsfinder run reaction.inp
//!
//! # Optimise reactants and products first (low level, then high level energies)
//! tsfinder run reaction.inp --optimise
//!
//! # Create an input template from a geometry
//! tsfinder ci molecule.xyz [output.inp]
//!
//! # Create a settings template
//! tsfinder ci tsfinder.cfg
//! ```
//!
//! Settings are read from `tsfinder.cfg` (see [`tsfinder::settings`]) and
//! overridden by the keys of the input file. Logging goes to stdout, or to
//! `tsfinder_<reaction>.log` when `file_logging` is enabled; `RUST_LOG`
//! takes precedence over the configured level.

use clap::{Parser, Subcommand};
use log::{info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process;
use tsfinder::config::{Config, MethodLevel};
use tsfinder::locate::{locate_tss_with, RearrangementOutcome};
use tsfinder::naming::JobNaming;
use tsfinder::parser::parse_input;
use tsfinder::qm_interface::create_interface;
use tsfinder::reaction::Reaction;
use tsfinder::settings::SettingsManager;
use tsfinder::template_generator::{
    generate_template_from_file, get_default_output_path, write_template_to_file,
};
use tsfinder::validation;

const SETTINGS_FILE: &str = "tsfinder.cfg";

#[derive(Parser, Debug)]
#[command(name = "tsfinder", version, about = "Automated transition state search")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Locate transition states for the reaction in an input file
    Run {
        /// Input file with the reactant and product blocks
        input: PathBuf,

        /// Optimise reactants and products before the search
        #[arg(long)]
        optimise: bool,

        /// Settings file used instead of the system, user and local ones
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Create an input template from an xyz file, or a settings template
    /// when FILE is tsfinder.cfg
    Ci {
        file: PathBuf,

        /// Output file for the input template
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Ci { file, output } => {
            init_console_logger();
            if file.file_name().and_then(|s| s.to_str()) == Some(SETTINGS_FILE) {
                match run_create_settings_template(&file) {
                    Ok(()) => {
                        println!("✓ Settings template created successfully!");
                        println!("  Output file: {}", file.display());
                        println!("\nNext steps:");
                        println!("  1. Review and edit {}", file.display());
                        println!("  2. Set the low- and high-level programs and their keywords");
                        println!("  3. The settings will be automatically loaded by tsfinder");
                    }
                    Err(e) => {
                        eprintln!("Error creating settings template: {}", e);
                        process::exit(1);
                    }
                }
            } else {
                match run_create_input(&file, output.as_deref()) {
                    Ok(output_file) => {
                        println!("✓ Template input file created successfully!");
                        println!("  Output file: {}", output_file.display());
                        println!("\nNext steps:");
                        println!("  1. Provide the product geometry referenced by the template");
                        println!("  2. Check charges and multiplicities of every block");
                        println!("  3. Run tsfinder: tsfinder run {}", output_file.display());
                    }
                    Err(e) => {
                        eprintln!("Error creating template: {}", e);
                        process::exit(1);
                    }
                }
            }
        }
        Command::Run {
            input,
            optimise,
            config,
        } => match run_search(&input, optimise, config.as_deref()) {
            Ok(outcomes) => {
                let n_found = outcomes.iter().filter(|o| o.ts.is_some()).count();
                if n_found == 0 {
                    println!("\n****No transition state found****");
                    process::exit(2);
                }
                println!("\n****Found {} transition state(s)****", n_found);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
    }
}

fn init_console_logger() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .target(env_logger::Target::Stdout)
        .format_timestamp_millis()
        .init();
}

/// Initialises logging at the configured level.
///
/// Returns the log file when file logging is enabled.
fn init_logger(config: &Config, reaction: &Reaction) -> Result<Option<PathBuf>, Box<dyn std::error::Error>> {
    let level = config
        .logging
        .level
        .parse::<log::LevelFilter>()
        .unwrap_or(log::LevelFilter::Info);

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_default_env().format_timestamp_millis();

    let log_file = if config.logging.file_logging {
        let path = PathBuf::from(JobNaming::new(&reaction.name).log_file());
        builder.target(env_logger::Target::Pipe(Box::new(File::create(&path)?)));
        Some(path)
    } else {
        builder.target(env_logger::Target::Stdout);
        None
    };
    builder.init();

    if config.logging.level.parse::<log::LevelFilter>().is_err() {
        warn!("Unknown log level '{}', using info", config.logging.level);
    }
    Ok(log_file)
}

fn run_create_settings_template(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        return Err(format!(
            "{} already exists. Please remove it first or choose a different location.",
            path.display()
        )
        .into());
    }
    SettingsManager::create_template(path)?;
    Ok(())
}

fn run_create_input(
    geometry_path: &Path,
    output_path: Option<&Path>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let template = generate_template_from_file(geometry_path)?;
    let output = output_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| get_default_output_path(geometry_path));
    if output.exists() {
        return Err(format!("{} already exists", output.display()).into());
    }
    write_template_to_file(&template, &output)?;
    info!("Input template written to {}", output.display());
    Ok(output)
}

/// Runs a complete transition state search.
///
/// 1. Load settings and apply the input file overrides
/// 2. Build and check the reaction
/// 3. Validate programs, parameters and solvent
/// 4. Optionally optimise reactants and products
/// 5. Locate transition states for every unique bond rearrangement
fn run_search(
    input_path: &Path,
    optimise: bool,
    config_path: Option<&Path>,
) -> Result<Vec<RearrangementOutcome>, Box<dyn std::error::Error>> {
    let settings = match config_path {
        Some(path) => SettingsManager::load_from(path)?,
        None => SettingsManager::load()?,
    };
    let config_source = settings.config_source().to_string();
    let settings_warnings = settings.warnings().to_vec();

    let input = parse_input(input_path, settings.into_config())?;
    let mut reaction = input.build_reaction()?;
    let config = input.config;

    let log_file = init_logger(&config, &reaction)?;
    if let Some(path) = &log_file {
        println!("Logging to {}", path.display());
    }
    info!("tsfinder {}", env!("CARGO_PKG_VERSION"));
    info!("Settings loaded from {}", config_source);
    for warning in &settings_warnings {
        warn!("{}", warning);
    }
    info!(
        "Reaction {}: {} reactant(s), {} product(s)",
        reaction.name,
        reaction.reactants.len(),
        reaction.products.len()
    );

    let low = create_interface(&config.low_level);
    let high = create_interface(&config.high_level);
    validation::validate_setup(&config, low.as_ref(), high.as_ref(), reaction.solvent.as_deref())?;
    validation::log_setup_summary(&config);

    if optimise {
        for molecule in reaction.molecules_mut() {
            molecule.optimise(low.as_ref(), &config, MethodLevel::Low)?;
            molecule.single_point(high.as_ref(), &config, MethodLevel::High)?;
        }
    }

    let outcomes = locate_tss_with(&reaction, &config, low.as_ref(), high.as_ref())?;
    print_summary(&reaction, &config, &outcomes);
    Ok(outcomes)
}

fn print_summary(reaction: &Reaction, config: &Config, outcomes: &[RearrangementOutcome]) {
    let naming = JobNaming::new(&reaction.name);
    println!("{}", "=".repeat(76));
    println!("TRANSITION STATES: {}", reaction.name);
    println!("{}", "=".repeat(76));
    for outcome in outcomes {
        print!("  {:<14} {:<40}", outcome.reaction_type.to_string(), outcome.rearrangement.to_string());
        match &outcome.ts {
            Some(ts) => println!(
                " {:>9.1}i cm^-1  {}",
                ts.imag_freq.abs(),
                config.work_dir.join(naming.ts_xyz(&ts.name)).display()
            ),
            None => println!(" not found"),
        }
    }
    println!(
        "  Summary: {}",
        config.work_dir.join(naming.summary_file()).display()
    );
}
