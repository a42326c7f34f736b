//! Feedback search for a carrying capacity that holds a population at its
//! target size.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::{
    engine::{CohortEngine, EngineError, YearHooks, YearSignal},
    rng::SimRng,
    snapshot::{SnapshotStore, StablePopulation},
    species::SpeciesParameters,
};

/// Hard ceiling on simulated years for parameter sets that never converge.
pub const MAX_STABILIZATION_YEARS: usize = 30_000;
/// Relative distance from the target that counts as a hit.
pub const TARGET_TOLERANCE: f64 = 0.005;
/// Capacity is only corrected on years divisible by this interval.
pub const ADJUSTMENT_INTERVAL_YEARS: usize = 5;
/// Extra years in the moving-average window beyond the current hit streak.
pub const AVERAGE_WINDOW_PADDING: usize = 5;
/// Consecutive hits required, as a multiple of the species' maximum age.
pub const HITS_PER_MAXIMUM_AGE: usize = 5;

/// Capacity multiplier for an observed `target / average` ratio: one third
/// of the way from no change toward the naive full correction.
pub fn damped_correction(target_ratio: f64) -> f64 {
    (2.0 * target_ratio + 1.0) / 3.0
}

#[derive(Debug)]
pub enum StabilizationOutcome {
    Stabilized(StablePopulation),
    Unstabilized { years: usize },
    Crashed { years: usize },
}

impl StabilizationOutcome {
    pub fn is_stabilized(&self) -> bool {
        matches!(self, StabilizationOutcome::Stabilized(_))
    }
}

pub struct StabilizationController {
    engine: CohortEngine,
    target_size: u64,
    required_hits: usize,
    max_years: usize,
}

impl StabilizationController {
    pub fn new(
        params: SpeciesParameters,
        target_size: u64,
        sub_steps: usize,
        rng: SimRng,
    ) -> Result<Self, EngineError> {
        let required_hits = HITS_PER_MAXIMUM_AGE * params.maximum_age;
        let engine = CohortEngine::bootstrap(params, target_size, sub_steps, rng)?;
        Ok(Self {
            engine,
            target_size,
            required_hits,
            max_years: MAX_STABILIZATION_YEARS,
        })
    }

    /// Lower the year ceiling.
    pub fn with_max_years(mut self, max_years: usize) -> Self {
        self.max_years = max_years;
        self
    }

    pub fn required_hits(&self) -> usize {
        self.required_hits
    }

    pub fn engine(&self) -> &CohortEngine {
        &self.engine
    }

    /// Search until the population holds its target or the year ceiling is
    /// reached. The engine stays available through [`Self::engine`].
    pub fn run(&mut self) -> Result<StabilizationOutcome, EngineError> {
        let mut tracker = TargetTracker::new(self.target_size, self.required_hits);
        let mut years = 0;
        while !tracker.on_target && years < self.max_years {
            let signal = self.engine.simulate_year(&mut tracker);
            years += 1;
            if let Some(err) = tracker.failure.take() {
                return Err(err);
            }
            if signal == YearSignal::PopulationCrashed {
                warn!(years, "population crashed during stabilization");
                return Ok(StabilizationOutcome::Crashed { years });
            }
        }

        if tracker.on_target {
            info!(
                years,
                species = %self.engine.params().name,
                target = self.target_size,
                capacity = self.engine.carrying_capacity(),
                "population stabilized"
            );
            let snapshot = StablePopulation::freeze(&self.engine, self.target_size, years);
            Ok(StabilizationOutcome::Stabilized(snapshot))
        } else {
            warn!(years, "population did not stabilize before the year ceiling");
            Ok(StabilizationOutcome::Unstabilized { years })
        }
    }

    /// Run and store the snapshot on success. Failed attempts store nothing.
    pub fn run_and_persist(
        &mut self,
        store: &mut dyn SnapshotStore,
    ) -> Result<StabilizationOutcome> {
        let outcome = self.run()?;
        if let StabilizationOutcome::Stabilized(snapshot) = &outcome {
            store
                .save(snapshot)
                .with_context(|| format!("Failed to save stable population {}", snapshot.key()))?;
        }
        Ok(outcome)
    }
}

/// After-all hook comparing the moving average against the target.
struct TargetTracker {
    target_size: u64,
    required_hits: usize,
    consecutive_hits: usize,
    on_target: bool,
    failure: Option<EngineError>,
}

impl TargetTracker {
    fn new(target_size: u64, required_hits: usize) -> Self {
        Self {
            target_size,
            required_hits,
            consecutive_hits: 0,
            on_target: false,
            failure: None,
        }
    }

    fn check(&mut self, engine: &mut CohortEngine) -> Result<(), EngineError> {
        let year = engine.years_completed().saturating_sub(1);
        let average = engine.average_recent(self.consecutive_hits + AVERAGE_WINDOW_PADDING)?;
        let target_ratio = self.target_size as f64 / average;

        if (target_ratio - 1.0).abs() < TARGET_TOLERANCE {
            self.consecutive_hits += 1;
        } else {
            self.consecutive_hits = 0;
            if year % ADJUSTMENT_INTERVAL_YEARS == 0 {
                let factor = damped_correction(target_ratio);
                engine.adjust_carrying_capacity(factor)?;
                debug!(
                    year,
                    average,
                    factor,
                    capacity = engine.carrying_capacity(),
                    "adjusted carrying capacity"
                );
            }
        }

        if self.consecutive_hits >= self.required_hits {
            self.on_target = true;
        }
        Ok(())
    }
}

impl YearHooks for TargetTracker {
    fn after_all(&mut self, engine: &mut CohortEngine) -> YearSignal {
        match self.check(engine) {
            Ok(()) => YearSignal::Continue,
            Err(err) => {
                self.failure = Some(err);
                YearSignal::ScheduledStop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{rng::seeded, snapshot::MemorySnapshotStore, species::test_species};

    #[test]
    fn test_damped_correction() {
        assert_eq!(damped_correction(1.0), 1.0);
        assert!((damped_correction(0.7) - 0.8).abs() < 1e-12);
        assert!((damped_correction(1.3) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_required_hits_scale_with_maximum_age() {
        let controller =
            StabilizationController::new(test_species(), 1_000, 4, seeded(3)).unwrap();
        assert_eq!(controller.required_hits(), 50);
        assert_eq!(controller.engine().carrying_capacity(), 5_000.0);
    }

    #[test]
    fn test_year_ceiling_reports_unstabilized_and_stores_nothing() {
        let mut controller = StabilizationController::new(test_species(), 1_000, 4, seeded(3))
            .unwrap()
            .with_max_years(10);
        let mut store = MemorySnapshotStore::new();
        let outcome = controller.run_and_persist(&mut store).unwrap();
        assert!(matches!(outcome, StabilizationOutcome::Unstabilized { years: 10 }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_pulled_toward_target() {
        let mut engine = CohortEngine::bootstrap(test_species(), 1_000, 4, seeded(3)).unwrap();
        let mut tracker = TargetTracker::new(1_000, 50);
        for _ in 0..20 {
            engine.simulate_year(&mut tracker);
        }
        assert!(tracker.failure.is_none());
        // The bootstrap capacity of 5x target lets the population overshoot;
        // correction must bring capacity down.
        assert!(engine.carrying_capacity() < 5_000.0);
    }
}
