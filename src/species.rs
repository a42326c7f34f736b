use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cohort::Sex;

/// Biological rate constants for one species model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesParameters {
    pub name: String,
    pub pregnancy_rate: f64,
    pub mean_offspring: f64,
    /// Age in whole years at which females start reproducing.
    pub age_of_first_reproduction: usize,
    /// Age in (fractional) years after which adult mortality applies.
    pub adult_mortality_onset_age: f64,
    pub maximum_age: usize,
    pub female_base_juvenile_mortality: f64,
    pub male_base_juvenile_mortality: f64,
    pub female_adult_mortality: f64,
    pub male_adult_mortality: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParameterError {
    #[error("{field} must be a probability in [0, 1), got {value}")]
    RateOutOfRange { field: &'static str, value: f64 },
    #[error("{field} must be non-negative and finite, got {value}")]
    NegativeValue { field: &'static str, value: f64 },
    #[error("maximum_age must be at least 1")]
    ZeroMaximumAge,
    #[error("age_of_first_reproduction {age} exceeds maximum_age {maximum}")]
    ReproductionAfterMaximum { age: usize, maximum: usize },
    #[error("parameter set name must not be empty")]
    EmptyName,
}

impl SpeciesParameters {
    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.name.trim().is_empty() {
            return Err(ParameterError::EmptyName);
        }
        if self.maximum_age == 0 {
            return Err(ParameterError::ZeroMaximumAge);
        }
        if self.age_of_first_reproduction > self.maximum_age {
            return Err(ParameterError::ReproductionAfterMaximum {
                age: self.age_of_first_reproduction,
                maximum: self.maximum_age,
            });
        }
        for (field, value) in [
            ("pregnancy_rate", self.pregnancy_rate),
            (
                "female_base_juvenile_mortality",
                self.female_base_juvenile_mortality,
            ),
            (
                "male_base_juvenile_mortality",
                self.male_base_juvenile_mortality,
            ),
            ("female_adult_mortality", self.female_adult_mortality),
            ("male_adult_mortality", self.male_adult_mortality),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(ParameterError::RateOutOfRange { field, value });
            }
        }
        for (field, value) in [
            ("mean_offspring", self.mean_offspring),
            ("adult_mortality_onset_age", self.adult_mortality_onset_age),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ParameterError::NegativeValue { field, value });
            }
        }
        Ok(())
    }

    pub fn base_juvenile_mortality(&self, sex: Sex) -> f64 {
        match sex {
            Sex::Female => self.female_base_juvenile_mortality,
            Sex::Male => self.male_base_juvenile_mortality,
        }
    }

    pub fn adult_mortality(&self, sex: Sex) -> f64 {
        match sex {
            Sex::Female => self.female_adult_mortality,
            Sex::Male => self.male_adult_mortality,
        }
    }
}

/// Reads and writes `<name>.yaml` parameter sets under a base directory.
pub struct ParameterSetLoader {
    base_dir: PathBuf,
}

impl ParameterSetLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{name}.yaml"))
    }

    pub fn load(&self, name: &str) -> Result<SpeciesParameters> {
        let path = self.path_for(name);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read parameter set {}", path.display()))?;
        let params: SpeciesParameters = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        params
            .validate()
            .with_context(|| format!("Invalid parameter set {}", path.display()))?;
        Ok(params)
    }

    pub fn save(&self, params: &SpeciesParameters) -> Result<PathBuf> {
        params.validate()?;
        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("Failed to create {}", self.base_dir.display()))?;
        let path = self.path_for(&params.name);
        let yaml = serde_yaml::to_string(params)?;
        fs::write(&path, yaml)
            .with_context(|| format!("Failed to write parameter set {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
pub(crate) fn test_species() -> SpeciesParameters {
    SpeciesParameters {
        name: "testdeer".into(),
        pregnancy_rate: 0.85,
        mean_offspring: 1.6,
        age_of_first_reproduction: 2,
        adult_mortality_onset_age: 1.0,
        maximum_age: 10,
        female_base_juvenile_mortality: 0.3,
        male_base_juvenile_mortality: 0.35,
        female_adult_mortality: 0.1,
        male_adult_mortality: 0.15,
    }
}
