use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    pub const ALL: [Sex; 2] = [Sex::Female, Sex::Male];

    pub fn index(self) -> usize {
        match self {
            Sex::Female => 0,
            Sex::Male => 1,
        }
    }

    /// Single-letter code used in report column names.
    pub fn code(self) -> char {
        match self {
            Sex::Female => 'F',
            Sex::Male => 'M',
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Female => write!(f, "female"),
            Sex::Male => write!(f, "male"),
        }
    }
}

/// Head counts by sex and whole-year age class `0..=maximum_age`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortMatrix {
    maximum_age: usize,
    female: Vec<u64>,
    male: Vec<u64>,
}

impl CohortMatrix {
    pub fn new(maximum_age: usize) -> Self {
        Self {
            maximum_age,
            female: vec![0; maximum_age + 1],
            male: vec![0; maximum_age + 1],
        }
    }

    pub fn maximum_age(&self) -> usize {
        self.maximum_age
    }

    /// Number of age classes per sex.
    pub fn age_classes(&self) -> usize {
        self.maximum_age + 1
    }

    pub fn get(&self, sex: Sex, age: usize) -> u64 {
        self.row(sex)[age]
    }

    pub fn set(&mut self, sex: Sex, age: usize, count: u64) {
        self.row_mut(sex)[age] = count;
    }

    pub fn row(&self, sex: Sex) -> &[u64] {
        match sex {
            Sex::Female => &self.female,
            Sex::Male => &self.male,
        }
    }

    pub fn row_mut(&mut self, sex: Sex) -> &mut [u64] {
        match sex {
            Sex::Female => &mut self.female,
            Sex::Male => &mut self.male,
        }
    }

    pub fn total(&self) -> u64 {
        self.female.iter().chain(self.male.iter()).sum()
    }

    pub fn total_for(&self, sex: Sex) -> u64 {
        self.row(sex).iter().sum()
    }

    /// Sum of one sex's cohorts from `first_age` to the oldest class.
    pub fn total_from(&self, sex: Sex, first_age: usize) -> u64 {
        self.row(sex).iter().skip(first_age).sum()
    }

    /// Shift every cohort up one class; the oldest class is discarded and
    /// age 0 is left empty.
    pub fn advance_age(&mut self) {
        for row in [&mut self.female, &mut self.male] {
            row.rotate_right(1);
            row[0] = 0;
        }
    }

    /// Female ages followed by male ages.
    pub fn flatten(&self) -> impl Iterator<Item = u64> + '_ {
        self.female.iter().chain(self.male.iter()).copied()
    }

    /// Structural check used after deserialising foreign data.
    pub fn is_well_formed(&self) -> bool {
        self.female.len() == self.maximum_age + 1 && self.male.len() == self.maximum_age + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_age_discards_oldest() {
        let mut cohort = CohortMatrix::new(3);
        for age in 0..=3 {
            cohort.set(Sex::Female, age, (age as u64 + 1) * 10);
            cohort.set(Sex::Male, age, age as u64 + 1);
        }
        cohort.advance_age();
        assert_eq!(cohort.row(Sex::Female), &[0, 10, 20, 30]);
        assert_eq!(cohort.row(Sex::Male), &[0, 1, 2, 3]);
        assert_eq!(cohort.total(), 66);
    }

    #[test]
    fn test_totals() {
        let mut cohort = CohortMatrix::new(2);
        cohort.set(Sex::Female, 1, 4);
        cohort.set(Sex::Female, 2, 5);
        cohort.set(Sex::Male, 0, 7);
        assert_eq!(cohort.total(), 16);
        assert_eq!(cohort.total_for(Sex::Male), 7);
        assert_eq!(cohort.total_from(Sex::Female, 2), 5);
        assert_eq!(cohort.flatten().collect::<Vec<_>>(), vec![0, 4, 5, 7, 0, 0]);
    }
}
