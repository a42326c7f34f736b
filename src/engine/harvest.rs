//! Harvest draws weighted by cohort size, without replacement.

use serde::Serialize;
use thiserror::Error;

use super::CohortEngine;
use crate::{cohort::Sex, rng::RngExt};

/// One harvested individual. Age is in sub-step units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HarvestRecord {
    pub sex: Sex,
    pub age_steps: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HarvestError {
    #[error("requested {requested} kills but only {available} individuals are harvestable")]
    Infeasible { requested: u64, available: u64 },
}

impl CohortEngine {
    /// Youngest whole-year cohort whose members are at least
    /// `min_age_steps` old at sub-step `step` of the current year.
    pub fn first_harvestable_cohort(&self, min_age_steps: usize, step: usize) -> usize {
        let whole = min_age_steps / self.sub_steps;
        let part = min_age_steps % self.sub_steps;
        let first = whole + usize::from(step < part);
        first.min(self.cohort.age_classes())
    }

    pub fn harvestable(&self, sex: Sex, min_age_steps: usize, step: usize) -> u64 {
        let first = self.first_harvestable_cohort(min_age_steps, step);
        self.cohort.total_from(sex, first)
    }

    /// Draw `count` individuals from both sexes pooled together.
    ///
    /// Leaves the cohort untouched and returns [`HarvestError::Infeasible`]
    /// when fewer than `count` individuals are harvestable.
    pub fn harvest_pooled(
        &mut self,
        count: u64,
        min_age_steps: usize,
        step: usize,
    ) -> Result<Vec<HarvestRecord>, HarvestError> {
        self.draw(count, &Sex::ALL, min_age_steps, step)
    }

    /// Draw `count` individuals of one sex.
    pub fn harvest_sex(
        &mut self,
        count: u64,
        sex: Sex,
        min_age_steps: usize,
        step: usize,
    ) -> Result<Vec<HarvestRecord>, HarvestError> {
        self.draw(count, &[sex], min_age_steps, step)
    }

    fn draw(
        &mut self,
        count: u64,
        sexes: &[Sex],
        min_age_steps: usize,
        step: usize,
    ) -> Result<Vec<HarvestRecord>, HarvestError> {
        debug_assert!(step < self.sub_steps, "sub-step {step} outside the year");
        let first = self.first_harvestable_cohort(min_age_steps, step);
        let available: u64 = sexes
            .iter()
            .map(|&sex| self.cohort.total_from(sex, first))
            .sum();
        if count > available {
            return Err(HarvestError::Infeasible {
                requested: count,
                available,
            });
        }

        let mut pool = available;
        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let index = self.rng.index_below(pool);
            let Some((sex, age)) = self.locate(index, sexes, first) else {
                // pool always equals the sum of the scanned cohorts
                break;
            };
            let row = self.cohort.row_mut(sex);
            row[age] -= 1;
            pool -= 1;
            records.push(HarvestRecord {
                sex,
                age_steps: age * self.sub_steps + step,
            });
        }
        Ok(records)
    }

    /// Cohort containing the `index`-th eligible individual, scanning ages
    /// upward and then moving to the next sex.
    fn locate(&self, mut index: u64, sexes: &[Sex], first: usize) -> Option<(Sex, usize)> {
        for &sex in sexes {
            for (age, &count) in self.cohort.row(sex).iter().enumerate().skip(first) {
                if index < count {
                    return Some((sex, age));
                }
                index -= count;
            }
        }
        None
    }
}
