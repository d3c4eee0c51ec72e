use std::fs;
use tsfinder::config::{Config, QMProgram};
use tsfinder::parser::{parse_input, ParseError};
use tsfinder::reaction::ReactionError;

const METHANE_XYZ: &str = "5
methane
C   0.000   0.000   0.000
H   0.629   0.629   0.629
H  -0.629  -0.629   0.629
H  -0.629   0.629  -0.629
H   0.629  -0.629  -0.629
";

const METHYL_XYZ: &str = "4
methyl
C   0.000   0.000   0.000
H   1.080   0.000   0.000
H  -0.540   0.935   0.000
H  -0.540  -0.935   0.000
";

#[test]
fn test_parse_reaction_with_xyz_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("methane.xyz"), METHANE_XYZ).unwrap();
    fs::write(dir.path().join("methyl.xyz"), METHYL_XYZ).unwrap();
    let input = dir.path().join("abstraction.inp");
    fs::write(
        &input,
        "\
low_program = nwchem   # override the settings file
n_cores = 2

*REACTANT methane
@methane.xyz
*
*REACTANT F charge=0 mult=2
F 3.0 0.0 0.0
*
*PRODUCT methyl mult=2
@methyl.xyz
*
*PRODUCT HF
H 3.0 0.0 0.0
F 3.92 0.0 0.0
*
",
    )
    .unwrap();

    let data = parse_input(&input, Config::default()).unwrap();
    assert_eq!(data.config.low_level.program, QMProgram::NWChem);
    assert_eq!(data.config.high_level.program, QMProgram::Orca);
    assert_eq!(data.config.n_cores, 2);
    assert_eq!(data.molecules[0].geometry.num_atoms, 5);

    let reaction = data.build_reaction().unwrap();
    assert_eq!(reaction.name, "methane+F--methyl+HF");
    assert_eq!(reaction.reactants.len(), 2);
    assert_eq!(reaction.products.len(), 2);
    assert_eq!(reaction.reactants[0].n_bonds(), 4);
    assert_eq!(reaction.products[0].n_bonds(), 3);
    assert_eq!(reaction.products[1].n_bonds(), 1);
}

#[test]
fn test_missing_xyz_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("missing.inp");
    fs::write(&input, "*REACTANT A\n@nowhere.xyz\n*\n*PRODUCT B\nH 0 0 0\n*\n").unwrap();

    assert!(matches!(
        parse_input(&input, Config::default()),
        Err(ParseError::Io(_))
    ));
}

#[test]
fn test_unknown_program() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("program.inp");
    fs::write(&input, "high_program = gaussian\n*REACTANT A\nH 0 0 0\n*\n").unwrap();

    match parse_input(&input, Config::default()) {
        Err(ParseError::Syntax { line, message }) => {
            assert_eq!(line, 1);
            assert!(message.contains("gaussian"));
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn test_charge_must_be_conserved() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("charge.inp");
    fs::write(
        &input,
        "\
*REACTANT H2
H 0.0 0.0 0.0
H 0.74 0.0 0.0
*
*PRODUCT H+ charge=1
H 0.0 0.0 0.0
*
*PRODUCT H mult=2
H 5.0 0.0 0.0
*
",
    )
    .unwrap();

    let data = parse_input(&input, Config::default()).unwrap();
    assert!(matches!(
        data.build_reaction(),
        Err(ParseError::Reaction(ReactionError::ChargeNotConserved {
            reactants: 0,
            products: 1
        }))
    ));
}

#[test]
fn test_out_of_range_bond() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bond.inp");
    fs::write(
        &input,
        "*REACTANT H2\nH 0 0 0\nH 0.74 0 0\nbond 0 2\n*\n*PRODUCT H2\nH 0 0 0\nH 0.74 0 0\n*\n",
    )
    .unwrap();

    match parse_input(&input, Config::default()) {
        Err(ParseError::Syntax { line, message }) => {
            assert_eq!(line, 5);
            assert!(message.contains("out of range"));
        }
        other => panic!("unexpected result {:?}", other),
    }
}
