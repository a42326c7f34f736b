use crate::{
    cohort::Sex,
    engine::{CohortEngine, HarvestError, HarvestRecord, YearSignal},
    rng::RngExt,
};

/// Schedules a year's kills across sub-steps and carries them out.
pub trait HarvestStrategy {
    fn name(&self) -> &str;

    /// Spread `quota` kills over the sub-steps of the coming year.
    fn schedule(&mut self, engine: &mut CohortEngine, quota: u64);

    /// Kills scheduled for `step`, across all sexes.
    fn scheduled_at(&self, step: usize) -> u64;

    /// Carry out the kills scheduled for `step`.
    fn execute(
        &mut self,
        engine: &mut CohortEngine,
        step: usize,
        min_age_steps: usize,
    ) -> Result<Vec<HarvestRecord>, HarvestError>;

    /// Signal that ends a run when a scheduled draw is infeasible.
    fn infeasible_signal(&self) -> YearSignal;
}

fn spread(engine: &mut CohortEngine, kills: u64) -> Vec<u64> {
    let sub_steps = engine.sub_steps();
    let mut by_step = vec![0; sub_steps];
    for _ in 0..kills {
        let step = engine.rng_mut().index_below(sub_steps as u64) as usize;
        by_step[step] += 1;
    }
    by_step
}

/// Kills drawn from both sexes in proportion to their abundance.
#[derive(Debug, Default)]
pub struct UniformHarvest {
    by_step: Vec<u64>,
}

impl UniformHarvest {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HarvestStrategy for UniformHarvest {
    fn name(&self) -> &str {
        "uniform"
    }

    fn schedule(&mut self, engine: &mut CohortEngine, quota: u64) {
        self.by_step = spread(engine, quota);
    }

    fn scheduled_at(&self, step: usize) -> u64 {
        self.by_step.get(step).copied().unwrap_or(0)
    }

    fn execute(
        &mut self,
        engine: &mut CohortEngine,
        step: usize,
        min_age_steps: usize,
    ) -> Result<Vec<HarvestRecord>, HarvestError> {
        engine.harvest_pooled(self.scheduled_at(step), min_age_steps, step)
    }

    fn infeasible_signal(&self) -> YearSignal {
        YearSignal::PopulationCrashed
    }
}

/// Kills split by a fixed female fraction, each sex drawn separately.
#[derive(Debug)]
pub struct SexBiasedHarvest {
    female_fraction: f64,
    by_step: [Vec<u64>; 2],
}

impl SexBiasedHarvest {
    pub fn new(female_fraction: f64) -> Self {
        Self {
            female_fraction,
            by_step: [Vec::new(), Vec::new()],
        }
    }

    pub fn female_fraction(&self) -> f64 {
        self.female_fraction
    }

    pub fn scheduled_for(&self, sex: Sex, step: usize) -> u64 {
        self.by_step[sex.index()].get(step).copied().unwrap_or(0)
    }
}

impl HarvestStrategy for SexBiasedHarvest {
    fn name(&self) -> &str {
        "sex-biased"
    }

    fn schedule(&mut self, engine: &mut CohortEngine, quota: u64) {
        let female = engine
            .rng_mut()
            .stochastic_round(self.female_fraction * quota as f64)
            .min(quota);
        let male = quota - female;
        let female_steps = spread(engine, female);
        let male_steps = spread(engine, male);
        self.by_step = [female_steps, male_steps];
    }

    fn scheduled_at(&self, step: usize) -> u64 {
        Sex::ALL
            .iter()
            .map(|&sex| self.scheduled_for(sex, step))
            .sum()
    }

    fn execute(
        &mut self,
        engine: &mut CohortEngine,
        step: usize,
        min_age_steps: usize,
    ) -> Result<Vec<HarvestRecord>, HarvestError> {
        // Both sexes are checked first so a shortfall in either leaves the
        // cohort untouched.
        for sex in Sex::ALL {
            let requested = self.scheduled_for(sex, step);
            let available = engine.harvestable(sex, min_age_steps, step);
            if requested > available {
                return Err(HarvestError::Infeasible {
                    requested,
                    available,
                });
            }
        }
        let mut records = Vec::new();
        for sex in Sex::ALL {
            let count = self.scheduled_for(sex, step);
            records.extend(engine.harvest_sex(count, sex, min_age_steps, step)?);
        }
        Ok(records)
    }

    fn infeasible_signal(&self) -> YearSignal {
        YearSignal::SexBiasUnsustainable
    }
}
