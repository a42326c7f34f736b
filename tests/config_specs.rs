use std::path::{Path, PathBuf};

use cohort_harvest::{
    config::{self, DynHarvestSpec, StablePopSpec},
    report::AgeGrouping,
    ParameterSetLoader, RateEscalation, SnapshotKey,
};
use tempfile::tempdir;

fn scenario(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(name)
}

#[test]
fn stable_pop_fixture_is_a_batch() {
    let specs: Vec<StablePopSpec> = config::load_documents(scenario("stable_pop.yaml")).unwrap();
    assert_eq!(specs.len(), 2);
    for spec in &specs {
        spec.validate().unwrap();
    }
    assert_eq!(specs[0].key(), SnapshotKey::new("whitetail", 1_000, 4));
    assert_eq!(specs[0].seed, Some(7));
    assert_eq!(specs[1].key(), SnapshotKey::new("whitetail", 2_500, 12));
    assert_eq!(specs[1].seed, None);
}

#[test]
fn parameter_sets_resolve_from_the_fixture_directory() {
    let loader = ParameterSetLoader::new(scenario("params"));
    let specs: Vec<StablePopSpec> = config::load_documents(scenario("stable_pop.yaml")).unwrap();
    let params = loader.load(&specs[0].parameter_set).unwrap();
    assert_eq!(params.name, "whitetail");
    assert_eq!(params.maximum_age, 10);
    params.validate().unwrap();
    assert!(loader.load("moose").is_err());
}

#[test]
fn parameter_sets_survive_a_save() {
    let dir = tempdir().unwrap();
    let params = ParameterSetLoader::new(scenario("params"))
        .load("whitetail")
        .unwrap();
    let loader = ParameterSetLoader::new(dir.path());
    let path = loader.save(&params).unwrap();
    assert_eq!(path, dir.path().join("whitetail.yaml"));
    assert_eq!(loader.load("whitetail").unwrap(), params);
}

#[test]
fn dyn_harvest_fixture_expands_to_one_run_per_minimum_age() {
    let specs: Vec<DynHarvestSpec> = config::load_documents(scenario("dyn_harvest.yaml")).unwrap();
    assert_eq!(specs.len(), 1);
    let spec = &specs[0];
    assert_eq!(spec.key(), SnapshotKey::new("whitetail", 1_000, 4));

    let runs = spec.expand().unwrap();
    assert_eq!(runs.len(), 2);
    let outputs: Vec<&Path> = runs.iter().map(|run| run.output.as_path()).collect();
    assert_eq!(
        outputs,
        vec![
            Path::new("results/whitetail_F0_4_A1.tsv"),
            Path::new("results/whitetail_F0_4_A2_5.tsv"),
        ]
    );
    for run in &runs {
        assert_eq!(run.harvest.escalation, RateEscalation::Linear(0.01));
        assert_eq!(run.harvest.female_fraction, Some(0.4));
        assert_eq!(
            run.harvest.grouping,
            AgeGrouping::Ternary {
                juvenile_max_years: 1.0,
                prime_max_years: 6.0,
            }
        );
        assert!(run.seed.is_some());
    }
    assert_ne!(runs[0].seed, runs[1].seed);
    assert_eq!(runs, spec.expand().unwrap());
}

#[test]
fn conflicting_escalation_modes_are_rejected() {
    let text = "
stable_population: { species: whitetail, size: 1000, sub_steps: 4 }
output: out/w
minimum_harvest_age: 1.0
initial_harvest_rate: 0.1
linear_increase: 0.01
exponential_increase: 0.02
";
    let specs: Vec<DynHarvestSpec> = config::parse_documents(text).unwrap();
    assert!(specs[0].expand().is_err());
}

#[test]
fn unknown_fields_fail_to_parse() {
    let text = "
stable_population: { species: whitetail, size: 1000, sub_steps: 4 }
output: out/w
minimum_harvest_age: 1.0
initial_harvest_rate: 0.1
linear_increase: 0.01
harvest_season: autumn
";
    assert!(config::parse_documents::<DynHarvestSpec>(text).is_err());
}

#[test]
fn templates_are_written_as_yaml_comments() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stable.yaml");
    std::fs::write(&path, config::STABLE_POP_TEMPLATE).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("parameter_set:"));
    assert!(config::DYN_HARVEST_TEMPLATE.contains("minimum_harvest_age:"));
}
