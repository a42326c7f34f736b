use cohort_harvest::{
    rng::seeded, snapshot::MemorySnapshotStore, stabilize::TARGET_TOLERANCE, JsonSnapshotStore,
    ParameterSetLoader, SnapshotKey, SnapshotStore, SpeciesParameters, StabilizationController,
    StabilizationOutcome,
};
use tempfile::tempdir;

fn whitetail() -> SpeciesParameters {
    ParameterSetLoader::new(concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/params"))
        .load("whitetail")
        .expect("fixture parameter set loads")
}

fn outcome_years(outcome: &StabilizationOutcome) -> usize {
    match outcome {
        StabilizationOutcome::Stabilized(snapshot) => snapshot.years_to_stabilize(),
        StabilizationOutcome::Unstabilized { years } | StabilizationOutcome::Crashed { years } => {
            *years
        }
    }
}

#[test]
fn required_hits_scale_with_maximum_age() {
    let controller = StabilizationController::new(whitetail(), 1_000, 4, seeded(1)).unwrap();
    assert_eq!(controller.required_hits(), 50);
    assert_eq!(controller.engine().carrying_capacity(), 5_000.0);
}

#[test]
fn invalid_requests_are_rejected_before_simulating() {
    assert!(StabilizationController::new(whitetail(), 0, 4, seeded(1)).is_err());
    assert!(StabilizationController::new(whitetail(), 1_000, 0, seeded(1)).is_err());
    let mut params = whitetail();
    params.pregnancy_rate = 1.5;
    assert!(StabilizationController::new(params, 1_000, 4, seeded(1)).is_err());
}

#[test]
fn same_seed_reaches_the_same_outcome() {
    let run = || {
        StabilizationController::new(whitetail(), 800, 2, seeded(17))
            .unwrap()
            .with_max_years(2_000)
            .run()
            .unwrap()
    };
    let first = run();
    let second = run();
    assert!(first.is_stabilized());
    assert!(second.is_stabilized());
    assert_eq!(outcome_years(&first), outcome_years(&second));
    match (&first, &second) {
        (StabilizationOutcome::Stabilized(a), StabilizationOutcome::Stabilized(b)) => {
            assert_eq!(a.cohort(), b.cohort());
            assert_eq!(a.carrying_capacity(), b.carrying_capacity());
        }
        other => panic!("expected both runs to stabilize, got {other:?}"),
    }
}

#[test]
fn year_ceiling_bounds_the_search() {
    let outcome = StabilizationController::new(whitetail(), 1_000, 4, seeded(3))
        .unwrap()
        .with_max_years(10)
        .run()
        .unwrap();
    // 50 consecutive hits cannot fit in 10 years.
    assert!(matches!(outcome, StabilizationOutcome::Unstabilized { years: 10 }));
}

#[test]
fn unviable_species_crashes() {
    let mut params = whitetail();
    params.pregnancy_rate = 0.0;
    let outcome = StabilizationController::new(params, 200, 1, seeded(4))
        .unwrap()
        .run()
        .unwrap();
    match outcome {
        StabilizationOutcome::Crashed { years } => assert!(years <= 11, "years {years}"),
        other => panic!("expected a crash, got {other:?}"),
    }
}

#[test]
fn seeded_search_converges_and_persists_the_equilibrium() {
    let dir = tempdir().unwrap();
    let mut store = JsonSnapshotStore::new(dir.path());
    let mut controller = StabilizationController::new(whitetail(), 1_000, 4, seeded(7)).unwrap();
    let required_hits = controller.required_hits();
    let outcome = controller.run_and_persist(&mut store).unwrap();

    let StabilizationOutcome::Stabilized(snapshot) = &outcome else {
        panic!("expected the seeded search to converge, got {outcome:?}");
    };
    assert!(snapshot.years_to_stabilize() >= required_hits);
    assert_eq!(snapshot.years_to_stabilize(), controller.engine().years_completed());

    // The final hit compared the target against a window of
    // `required_hits - 1 + 5` years.
    let average = controller
        .engine()
        .average_recent(required_hits + 4)
        .unwrap();
    assert!(
        (1_000.0 / average - 1.0).abs() < TARGET_TOLERANCE,
        "average {average}"
    );
    assert_eq!(snapshot.cohort(), controller.engine().cohort());
    assert_eq!(
        snapshot.carrying_capacity(),
        controller.engine().carrying_capacity()
    );

    let key = SnapshotKey::new("whitetail", 1_000, 4);
    assert_eq!(snapshot.key(), &key);
    assert!(store.path_for(&key).ends_with("ts_4/whitetail1000_spop.json"));
    assert!(store.path_for(&key).exists());
    assert_eq!(store.load(&key).unwrap().as_ref(), Some(snapshot));
}

#[test]
fn persisted_snapshot_matches_the_reported_outcome() {
    let dir = tempdir().unwrap();
    let mut store = JsonSnapshotStore::new(dir.path());
    let outcome = StabilizationController::new(whitetail(), 600, 2, seeded(23))
        .unwrap()
        .with_max_years(3_000)
        .run_and_persist(&mut store)
        .unwrap();
    assert!(outcome.is_stabilized());

    let key = SnapshotKey::new("whitetail", 600, 2);
    assert!(store.path_for(&key).ends_with("ts_2/whitetail600_spop.json"));
    let loaded = store.load(&key).unwrap().expect("snapshot stored");
    match outcome {
        StabilizationOutcome::Stabilized(snapshot) => assert_eq!(loaded, snapshot),
        other => panic!("expected a stabilized outcome, got {other:?}"),
    }
}

#[test]
fn failed_attempt_leaves_store_empty() {
    let mut store = MemorySnapshotStore::new();
    let outcome = StabilizationController::new(whitetail(), 1_000, 4, seeded(5))
        .unwrap()
        .with_max_years(20)
        .run_and_persist(&mut store)
        .unwrap();
    assert!(!outcome.is_stabilized());
    assert!(store.is_empty());
}
