//! Harvest runs started from a stable population.

mod strategy;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub use strategy::{HarvestStrategy, SexBiasedHarvest, UniformHarvest};

use crate::{
    cohort::CohortMatrix,
    config::ConfigError,
    engine::{CohortEngine, EngineError, HarvestError, YearHooks, YearSignal},
    report::{AgeGrouping, HarvestReport, ReportSink, YearRecord},
    rng::{RngExt, SimRng},
    snapshot::StablePopulation,
};

/// Yearly growth of the harvest rate. Exactly one mode applies to a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RateEscalation {
    /// Added to the rate each year.
    Linear(f64),
    /// Rate multiplied by `1 + step` each year.
    Exponential(f64),
}

impl RateEscalation {
    pub fn apply(self, rate: f64) -> f64 {
        match self {
            RateEscalation::Linear(step) => rate + step,
            RateEscalation::Exponential(step) => rate * (1.0 + step),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    pub initial_rate: f64,
    pub escalation: RateEscalation,
    /// Youngest harvestable age in (fractional) years.
    pub minimum_age_years: f64,
    /// Share of kills that must be female; `None` harvests without regard to sex.
    pub female_fraction: Option<f64>,
    pub grouping: AgeGrouping,
    /// End the run after this many completed years.
    pub max_years: Option<usize>,
}

impl HarvestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_rate.is_finite() && self.initial_rate >= 0.0) {
            return Err(ConfigError::NegativeRate(self.initial_rate));
        }
        let step = match self.escalation {
            RateEscalation::Linear(step) | RateEscalation::Exponential(step) => step,
        };
        if !(step.is_finite() && step > 0.0) {
            return Err(ConfigError::NonPositiveIncrease(step));
        }
        if matches!(self.escalation, RateEscalation::Exponential(_))
            && self.initial_rate == 0.0
            && self.max_years.is_none()
        {
            return Err(ConfigError::StalledEscalation);
        }
        if !(self.minimum_age_years.is_finite() && self.minimum_age_years >= 0.0) {
            return Err(ConfigError::NegativeAge(self.minimum_age_years));
        }
        if let Some(fraction) = self.female_fraction {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(ConfigError::FemaleFraction(fraction));
            }
        }
        if let AgeGrouping::Ternary {
            juvenile_max_years,
            prime_max_years,
        } = self.grouping
        {
            if !(juvenile_max_years >= 0.0 && juvenile_max_years <= prime_max_years) {
                return Err(ConfigError::AgeGroups {
                    juvenile: juvenile_max_years,
                    prime: prime_max_years,
                });
            }
        }
        if self.max_years == Some(0) {
            return Err(ConfigError::ZeroMaxYears);
        }
        Ok(())
    }

    pub fn strategy(&self) -> Box<dyn HarvestStrategy> {
        match self.female_fraction {
            Some(fraction) => Box::new(SexBiasedHarvest::new(fraction)),
            None => Box::new(UniformHarvest::new()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub signal: YearSignal,
    pub years_completed: usize,
    pub total_harvested: usize,
    pub final_rate: f64,
}

pub struct HarvestRunner {
    engine: CohortEngine,
    hooks: HarvestHooks,
    initial: CohortMatrix,
    grouping: AgeGrouping,
}

impl HarvestRunner {
    /// The runner works on its own copy of the snapshot's cohort.
    pub fn new(
        snapshot: &StablePopulation,
        config: &HarvestConfig,
        rng: SimRng,
    ) -> Result<Self, RunnerError> {
        config.validate()?;
        let engine = CohortEngine::from_snapshot(snapshot, rng)?;
        let min_age_steps = (config.minimum_age_years * engine.sub_steps() as f64).ceil() as usize;
        let hooks = HarvestHooks {
            strategy: config.strategy(),
            unhunted_size: snapshot.target_size(),
            current_rate: config.initial_rate,
            escalation: config.escalation,
            min_age_steps,
            max_years: config.max_years,
            years: Vec::new(),
        };
        Ok(Self {
            engine,
            hooks,
            initial: snapshot.cohort().clone(),
            grouping: config.grouping,
        })
    }

    pub fn simulate_year(&mut self) -> YearSignal {
        self.engine.simulate_year(&mut self.hooks)
    }

    /// Simulate years until a terminal signal.
    pub fn run(&mut self) -> YearSignal {
        loop {
            let signal = self.simulate_year();
            if signal.is_terminal() {
                info!(
                    strategy = self.hooks.strategy.name(),
                    ?signal,
                    years = self.engine.years_completed(),
                    rate = self.hooks.current_rate,
                    "harvest run ended"
                );
                return signal;
            }
        }
    }

    /// Run to termination, then hand the report to `sink`.
    pub fn run_to_sink(&mut self, sink: &mut dyn ReportSink) -> Result<RunSummary> {
        let signal = self.run();
        sink.emit(&self.report())?;
        Ok(self.summary(signal))
    }

    pub fn summary(&self, signal: YearSignal) -> RunSummary {
        RunSummary {
            signal,
            years_completed: self.engine.years_completed(),
            total_harvested: self.hooks.years.iter().map(|y| y.harvest.len()).sum(),
            final_rate: self.hooks.current_rate,
        }
    }

    pub fn report(&self) -> HarvestReport {
        HarvestReport::build(
            &self.initial,
            &self.hooks.years,
            self.grouping,
            self.engine.sub_steps(),
        )
    }

    pub fn records(&self) -> &[YearRecord] {
        &self.hooks.years
    }

    pub fn current_rate(&self) -> f64 {
        self.hooks.current_rate
    }

    pub fn min_age_steps(&self) -> usize {
        self.hooks.min_age_steps
    }

    pub fn engine(&self) -> &CohortEngine {
        &self.engine
    }
}

struct HarvestHooks {
    strategy: Box<dyn HarvestStrategy>,
    unhunted_size: u64,
    current_rate: f64,
    escalation: RateEscalation,
    min_age_steps: usize,
    max_years: Option<usize>,
    years: Vec<YearRecord>,
}

impl YearHooks for HarvestHooks {
    fn before_all(&mut self, _engine: &mut CohortEngine) -> YearSignal {
        self.years.push(YearRecord::default());
        YearSignal::Continue
    }

    fn post_reproduction(&mut self, engine: &mut CohortEngine) -> YearSignal {
        let basis = engine
            .last_year_average()
            .unwrap_or(self.unhunted_size as f64);
        let quota = engine.rng_mut().stochastic_round(self.current_rate * basis);
        debug!(quota, rate = self.current_rate, basis, "scheduled harvest");
        self.strategy.schedule(engine, quota);
        YearSignal::Continue
    }

    fn post_mortality(&mut self, engine: &mut CohortEngine, step: usize) -> YearSignal {
        match self.strategy.execute(engine, step, self.min_age_steps) {
            Ok(records) => {
                if let Some(year) = self.years.last_mut() {
                    year.harvest.extend(records);
                }
                YearSignal::Continue
            }
            Err(HarvestError::Infeasible {
                requested,
                available,
            }) => {
                debug!(requested, available, step, "harvest infeasible");
                self.strategy.infeasible_signal()
            }
        }
    }

    fn post_all_sub_steps(&mut self, engine: &mut CohortEngine) -> YearSignal {
        if let Some(year) = self.years.last_mut() {
            year.population = Some(engine.cohort().clone());
        }
        YearSignal::Continue
    }

    fn after_all(&mut self, engine: &mut CohortEngine) -> YearSignal {
        self.current_rate = self.escalation.apply(self.current_rate);
        match self.max_years {
            Some(max) if engine.years_completed() >= max => YearSignal::ScheduledStop,
            _ => YearSignal::Continue,
        }
    }
}
