//! YAML run specifications for stabilization and harvest sweeps.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::{
    harvest::{HarvestConfig, RateEscalation},
    report::AgeGrouping,
    rng::{self, RngManager, SimRng},
    snapshot::SnapshotKey,
};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("harvest rate must be non-negative, got {0}")]
    NegativeRate(f64),
    #[error("harvest rate increase must be positive, got {0}")]
    NonPositiveIncrease(f64),
    #[error("exactly one of linear_increase or exponential_increase must be set")]
    IncreaseMode,
    #[error("exponential increase from a zero initial rate never harvests; set max_years or a positive rate")]
    StalledEscalation,
    #[error("minimum harvest age must be non-negative, got {0}")]
    NegativeAge(f64),
    #[error("female fraction must lie in [0, 1], got {0}")]
    FemaleFraction(f64),
    #[error("juvenile age cutoff {juvenile} must be non-negative and no greater than prime cutoff {prime}")]
    AgeGroups { juvenile: f64, prime: f64 },
    #[error("max_years must be positive")]
    ZeroMaxYears,
    #[error("iterations must be positive")]
    ZeroIterations,
    #[error("{0} must list at least one value")]
    EmptySweep(&'static str),
    #[error("population size must be positive")]
    ZeroSize,
    #[error("sub_steps must be positive")]
    ZeroSubSteps,
}

/// A single value or a list of values to sweep over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sweep<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> Sweep<T> {
    pub fn values(&self) -> Vec<T> {
        match self {
            Sweep::One(value) => vec![value.clone()],
            Sweep::Many(values) => values.clone(),
        }
    }

    fn non_empty(&self, field: &'static str) -> Result<Vec<T>, ConfigError> {
        let values = self.values();
        if values.is_empty() {
            Err(ConfigError::EmptySweep(field))
        } else {
            Ok(values)
        }
    }
}

fn default_iterations() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StablePopSpec {
    pub parameter_set: String,
    pub size: u64,
    pub sub_steps: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl StablePopSpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size == 0 {
            return Err(ConfigError::ZeroSize);
        }
        if self.sub_steps == 0 {
            return Err(ConfigError::ZeroSubSteps);
        }
        Ok(())
    }

    pub fn key(&self) -> SnapshotKey {
        SnapshotKey::new(self.parameter_set.clone(), self.size, self.sub_steps)
    }

    pub fn rng(&self) -> SimRng {
        self.seed.map(rng::seeded).unwrap_or_else(rng::from_entropy)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StablePopRef {
    pub species: String,
    pub size: u64,
    pub sub_steps: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeGroupSpec {
    pub juvenile_max: f64,
    pub prime_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DynHarvestSpec {
    pub stable_population: StablePopRef,
    /// Path prefix for report files; each run appends its own suffix.
    pub output: PathBuf,
    pub minimum_harvest_age: Sweep<f64>,
    pub initial_harvest_rate: Sweep<f64>,
    #[serde(default)]
    pub linear_increase: Option<f64>,
    #[serde(default)]
    pub exponential_increase: Option<f64>,
    #[serde(default)]
    pub female_fraction: Option<Sweep<f64>>,
    #[serde(default)]
    pub age_groups: Option<AgeGroupSpec>,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub max_years: Option<usize>,
}

/// One independent run produced by expanding a [`DynHarvestSpec`].
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestRunConfig {
    pub index: u64,
    pub harvest: HarvestConfig,
    pub output: PathBuf,
    pub seed: Option<u64>,
}

impl HarvestRunConfig {
    pub fn rng(&self) -> SimRng {
        self.seed.map(rng::seeded).unwrap_or_else(rng::from_entropy)
    }
}

impl DynHarvestSpec {
    pub fn key(&self) -> SnapshotKey {
        let pop = &self.stable_population;
        SnapshotKey::new(pop.species.clone(), pop.size, pop.sub_steps)
    }

    pub fn escalation(&self) -> Result<RateEscalation, ConfigError> {
        match (self.linear_increase, self.exponential_increase) {
            (Some(step), None) => Ok(RateEscalation::Linear(step)),
            (None, Some(step)) => Ok(RateEscalation::Exponential(step)),
            _ => Err(ConfigError::IncreaseMode),
        }
    }

    pub fn grouping(&self) -> AgeGrouping {
        match self.age_groups {
            Some(groups) => AgeGrouping::Ternary {
                juvenile_max_years: groups.juvenile_max,
                prime_max_years: groups.prime_max,
            },
            None => AgeGrouping::ByCohort,
        }
    }

    /// Cartesian product of the swept fields, each run validated.
    pub fn expand(&self) -> Result<Vec<HarvestRunConfig>, ConfigError> {
        let escalation = self.escalation()?;
        if self.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        let rates = self.initial_harvest_rate.non_empty("initial_harvest_rate")?;
        let ages = self.minimum_harvest_age.non_empty("minimum_harvest_age")?;
        let fractions: Vec<Option<f64>> = match &self.female_fraction {
            Some(sweep) => sweep
                .non_empty("female_fraction")?
                .into_iter()
                .map(Some)
                .collect(),
            None => vec![None],
        };
        let seeds = self.seed.map(RngManager::new);

        let mut runs = Vec::new();
        for &fraction in &fractions {
            for &age in &ages {
                for &rate in &rates {
                    for iteration in 0..self.iterations {
                        let index = runs.len() as u64;
                        let harvest = HarvestConfig {
                            initial_rate: rate,
                            escalation,
                            minimum_age_years: age,
                            female_fraction: fraction,
                            grouping: self.grouping(),
                            max_years: self.max_years,
                        };
                        harvest.validate()?;
                        let output = self.output_path(fraction, age, rate, iteration, rates.len());
                        runs.push(HarvestRunConfig {
                            index,
                            harvest,
                            output,
                            seed: seeds.map(|manager| manager.run_seed(index)),
                        });
                    }
                }
            }
        }
        Ok(runs)
    }

    fn output_path(
        &self,
        fraction: Option<f64>,
        age: f64,
        rate: f64,
        iteration: u32,
        rate_count: usize,
    ) -> PathBuf {
        let mut suffix = match fraction {
            Some(fraction) => format!("_F{}", file_number(fraction)),
            None => "_U".to_string(),
        };
        suffix.push_str(&format!("_A{}", file_number(age)));
        if rate_count > 1 {
            suffix.push_str(&format!("_R{}", file_number(rate)));
        }
        if self.iterations > 1 {
            suffix.push_str(&format!("_I{}", iteration + 1));
        }
        suffix.push_str(".tsv");
        let mut path = self.output.clone().into_os_string();
        path.push(suffix);
        PathBuf::from(path)
    }
}

fn file_number(value: f64) -> String {
    value.to_string().replace('.', "_")
}

/// Reads every YAML document in `path`; several documents form a batch.
pub fn load_documents<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read run file {}", path.display()))?;
    parse_documents(&data).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn parse_documents<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        documents.push(T::deserialize(document)?);
    }
    Ok(documents)
}

pub const STABLE_POP_TEMPLATE: &str = "\
parameter_set:      # name of a parameter set file (without .yaml) in the parameter directory
size:               # average population size to stabilize at before any harvest
sub_steps:          # sub-steps per simulated year
# seed:             # optional; makes the stabilization repeatable
";

pub const DYN_HARVEST_TEMPLATE: &str = "\
stable_population:
  species:          # parameter set the stable population was built from
  size:             # its target size
  sub_steps:        # its sub-steps per year
output:             # path prefix for tab-delimited reports; existing files are overwritten
minimum_harvest_age:    # years, may be fractional; a list runs one simulation per value
initial_harvest_rate:   # share of last year's mean population killed per year; may be a list
linear_increase:        # use this or exponential_increase, delete the other
exponential_increase:   # annual relative increase of the harvest rate
# female_fraction:      # optional; share of kills that must be female, may be a list
# age_groups:           # optional; report harvest as juvenile/prime/other
#   juvenile_max:
#   prime_max:
# iterations: 1         # optional; repeated runs per configuration
# seed:                 # optional; per-run seeds are derived from it
# max_years:            # optional; stop a run after this many years
";
