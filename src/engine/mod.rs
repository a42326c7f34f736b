//! Age/sex structured cohort engine and its annual cycle.

mod harvest;
mod hooks;

use thiserror::Error;

pub use harvest::{HarvestError, HarvestRecord};
pub use hooks::{NoHooks, YearHooks, YearSignal};

use crate::{
    cohort::{CohortMatrix, Sex},
    rng::{RngExt, SimRng},
    snapshot::StablePopulation,
    species::{ParameterError, SpeciesParameters},
};

/// Initial carrying capacity as a multiple of the target size. A loose
/// ceiling for the stabilization search to pull down from.
pub const INITIAL_CAPACITY_MULTIPLIER: f64 = 5.0;

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Parameters(#[from] ParameterError),
    #[error("sub-steps per year must be at least 1")]
    InvalidSubSteps,
    #[error("target size must be positive")]
    InvalidTargetSize,
    #[error("carrying capacity adjustment factor must be positive, got {0}")]
    InvalidCapacityFactor(f64),
    #[error("history range {start}..={end} is outside the {len} recorded years")]
    HistoryRange { start: usize, end: usize, len: usize },
    #[error("no completed years in population history")]
    EmptyHistory,
    #[error("cohort matrix does not match maximum age {0}")]
    CohortShape(usize),
}

pub struct CohortEngine {
    params: SpeciesParameters,
    sub_steps: usize,
    cohort: CohortMatrix,
    carrying_capacity: f64,
    adult_survival: [f64; 2],
    juvenile_survival: [f64; 2],
    step_populations: Vec<u64>,
    history: Vec<f64>,
    rng: SimRng,
}

impl CohortEngine {
    /// Start a population from a linearly decreasing age distribution that
    /// sums to roughly `target_size`. Age 0 stays empty until the first
    /// reproduction.
    pub fn bootstrap(
        params: SpeciesParameters,
        target_size: u64,
        sub_steps: usize,
        rng: SimRng,
    ) -> Result<Self, EngineError> {
        if target_size == 0 {
            return Err(EngineError::InvalidTargetSize);
        }
        let maximum_age = params.maximum_age;
        let mut cohort = CohortMatrix::new(maximum_age);
        let weight_total = (maximum_age * (maximum_age + 1) / 2) as f64;
        let per_sex = target_size as f64 / 2.0;
        for sex in Sex::ALL {
            for age in 1..=maximum_age {
                let weight = (maximum_age + 1 - age) as f64;
                cohort.set(sex, age, (per_sex * weight / weight_total).round() as u64);
            }
        }
        let capacity = target_size as f64 * INITIAL_CAPACITY_MULTIPLIER;
        Self::from_parts(params, sub_steps, cohort, capacity, rng)
    }

    /// Resume from a frozen snapshot with a caller-supplied random source.
    pub fn from_snapshot(snapshot: &StablePopulation, rng: SimRng) -> Result<Self, EngineError> {
        Self::from_parts(
            snapshot.params().clone(),
            snapshot.sub_steps(),
            snapshot.cohort().clone(),
            snapshot.carrying_capacity(),
            rng,
        )
    }

    pub(crate) fn from_parts(
        params: SpeciesParameters,
        sub_steps: usize,
        cohort: CohortMatrix,
        carrying_capacity: f64,
        rng: SimRng,
    ) -> Result<Self, EngineError> {
        params.validate()?;
        if sub_steps == 0 {
            return Err(EngineError::InvalidSubSteps);
        }
        if !cohort.is_well_formed() || cohort.maximum_age() != params.maximum_age {
            return Err(EngineError::CohortShape(params.maximum_age));
        }
        if !(carrying_capacity.is_finite() && carrying_capacity > 0.0) {
            return Err(EngineError::InvalidCapacityFactor(carrying_capacity));
        }
        let adult_survival =
            Sex::ALL.map(|sex| per_step_survival(params.adult_mortality(sex), sub_steps));
        Ok(Self {
            params,
            sub_steps,
            cohort,
            carrying_capacity,
            adult_survival,
            juvenile_survival: [0.0; 2],
            step_populations: vec![0; sub_steps],
            history: Vec::with_capacity(1_000),
            rng,
        })
    }

    /// Run one annual cycle, calling `hooks` at each extension point.
    pub fn simulate_year<H>(&mut self, hooks: &mut H) -> YearSignal
    where
        H: YearHooks + ?Sized,
    {
        let signal = hooks.before_all(self);
        if signal.is_terminal() {
            return signal;
        }

        self.reproduce();

        let signal = hooks.post_reproduction(self);
        if signal.is_terminal() {
            return signal;
        }

        for step in 0..self.sub_steps {
            let signal = hooks.pre_mortality(self, step);
            if signal.is_terminal() {
                return signal;
            }

            let signal = self.natural_mortality(step);
            if signal.is_terminal() {
                return signal;
            }

            let signal = hooks.post_mortality(self, step);
            if signal.is_terminal() {
                return signal;
            }
        }

        let signal = hooks.post_all_sub_steps(self);
        if signal.is_terminal() {
            return signal;
        }

        self.advance_age();

        hooks.after_all(self)
    }

    /// Fill the age-0 cohorts from reproductive-age females.
    pub fn reproduce(&mut self) -> u64 {
        let breeding_females = self
            .cohort
            .total_from(Sex::Female, self.params.age_of_first_reproduction);
        let expected =
            breeding_females as f64 * self.params.pregnancy_rate * self.params.mean_offspring;
        let births = self.rng.stochastic_round(expected);

        let half = births / 2;
        let mut female = half;
        let mut male = half;
        if births % 2 == 1 {
            if self.rng.coin_flip() {
                female += 1;
            } else {
                male += 1;
            }
        }
        self.cohort.set(Sex::Female, 0, female);
        self.cohort.set(Sex::Male, 0, male);
        births
    }

    /// Apply one sub-step of natural mortality. Juvenile survival is
    /// re-derived from population density at the first sub-step of a year.
    pub fn natural_mortality(&mut self, step: usize) -> YearSignal {
        let step = step % self.sub_steps;
        if step == 0 {
            self.update_juvenile_survival();
        }

        let first_adult = self.first_adult_cohort(step);
        for sex in Sex::ALL {
            let juvenile = self.juvenile_survival[sex.index()];
            let adult = self.adult_survival[sex.index()];
            let row = self.cohort.row_mut(sex);
            for (age, count) in row.iter_mut().enumerate() {
                let survival = if age < first_adult { juvenile } else { adult };
                *count = self.rng.stochastic_round(survival * *count as f64);
            }
        }

        let current = self.cohort.total();
        self.step_populations[step] = current;
        if current == 0 {
            YearSignal::PopulationCrashed
        } else {
            YearSignal::Continue
        }
    }

    /// Move every cohort up one year and record this year's mean population.
    pub fn advance_age(&mut self) {
        self.cohort.advance_age();
        let year_total: u64 = self.step_populations.iter().sum();
        self.history.push(year_total as f64 / self.sub_steps as f64);
    }

    fn update_juvenile_survival(&mut self) {
        let density = (self.cohort.total() as f64 / self.carrying_capacity).min(1.0);
        for sex in Sex::ALL {
            let base = self.params.base_juvenile_mortality(sex);
            let mortality = base + density * (1.0 - base);
            self.juvenile_survival[sex.index()] = per_step_survival(mortality, self.sub_steps);
        }
    }

    /// Youngest cohort under the adult mortality regime at `step`.
    pub fn first_adult_cohort(&self, step: usize) -> usize {
        let onset_steps =
            (self.params.adult_mortality_onset_age * self.sub_steps as f64).ceil() as usize;
        let whole = onset_steps / self.sub_steps;
        let part = onset_steps % self.sub_steps;
        (whole + usize::from(step < part)).min(self.cohort.age_classes())
    }

    pub fn adjust_carrying_capacity(&mut self, factor: f64) -> Result<(), EngineError> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(EngineError::InvalidCapacityFactor(factor));
        }
        self.carrying_capacity *= factor;
        Ok(())
    }

    pub fn total_population(&self) -> u64 {
        self.cohort.total()
    }

    /// Mean of the yearly averages for years `start..=end`.
    pub fn average_population(&self, start: usize, end: usize) -> Result<f64, EngineError> {
        let len = self.history.len();
        if start > end || end >= len {
            return Err(EngineError::HistoryRange { start, end, len });
        }
        let window = &self.history[start..=end];
        Ok(window.iter().sum::<f64>() / window.len() as f64)
    }

    /// Mean over the `years` most recent years, clamped to the recorded history.
    pub fn average_recent(&self, years: usize) -> Result<f64, EngineError> {
        let len = self.history.len();
        if len == 0 {
            return Err(EngineError::EmptyHistory);
        }
        let years = years.min(len);
        self.average_population(len - years, len - 1)
    }

    pub fn last_year_average(&self) -> Option<f64> {
        self.history.last().copied()
    }

    pub fn years_completed(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn cohort(&self) -> &CohortMatrix {
        &self.cohort
    }

    pub fn params(&self) -> &SpeciesParameters {
        &self.params
    }

    pub fn sub_steps(&self) -> usize {
        self.sub_steps
    }

    pub fn carrying_capacity(&self) -> f64 {
        self.carrying_capacity
    }

    pub fn adult_survival(&self, sex: Sex) -> f64 {
        self.adult_survival[sex.index()]
    }

    pub fn juvenile_survival(&self, sex: Sex) -> f64 {
        self.juvenile_survival[sex.index()]
    }

    pub fn rng_mut(&mut self) -> &mut SimRng {
        &mut self.rng
    }
}

/// Survival per sub-step for an annual mortality rate.
pub fn per_step_survival(annual_mortality: f64, sub_steps: usize) -> f64 {
    (1.0 - annual_mortality).max(0.0).powf(1.0 / sub_steps as f64)
}
