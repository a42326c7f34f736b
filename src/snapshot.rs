//! Frozen equilibrium populations and their keyed storage.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cohort::{CohortMatrix, Sex};
use crate::engine::CohortEngine;
use crate::species::SpeciesParameters;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Identifies a stable population: species, target size and sub-steps per year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub species: String,
    pub size: u64,
    pub sub_steps: usize,
}

impl SnapshotKey {
    pub fn new(species: impl Into<String>, size: u64, sub_steps: usize) -> Self {
        Self {
            species: species.into(),
            size,
            sub_steps,
        }
    }

    pub fn population_name(&self) -> String {
        format!("{}{}", self.species, self.size)
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.species, self.size, self.sub_steps)
    }
}

/// Equilibrium state produced by stabilization. Read-only once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StablePopulation {
    format_version: u32,
    key: SnapshotKey,
    params: SpeciesParameters,
    cohort: CohortMatrix,
    carrying_capacity: f64,
    years_to_stabilize: usize,
    created_at: DateTime<Utc>,
}

impl StablePopulation {
    pub fn freeze(engine: &CohortEngine, target_size: u64, years_to_stabilize: usize) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            key: SnapshotKey::new(engine.params().name.clone(), target_size, engine.sub_steps()),
            params: engine.params().clone(),
            cohort: engine.cohort().clone(),
            carrying_capacity: engine.carrying_capacity(),
            years_to_stabilize,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> &SnapshotKey {
        &self.key
    }

    pub fn params(&self) -> &SpeciesParameters {
        &self.params
    }

    pub fn cohort(&self) -> &CohortMatrix {
        &self.cohort
    }

    pub fn target_size(&self) -> u64 {
        self.key.size
    }

    pub fn sub_steps(&self) -> usize {
        self.key.sub_steps
    }

    pub fn carrying_capacity(&self) -> f64 {
        self.carrying_capacity
    }

    pub fn years_to_stabilize(&self) -> usize {
        self.years_to_stabilize
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        let snapshot: StablePopulation = serde_json::from_str(text)?;
        snapshot.check()?;
        Ok(snapshot)
    }

    fn check(&self) -> Result<(), SnapshotError> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }
        if !self.cohort.is_well_formed() || self.cohort.maximum_age() != self.params.maximum_age {
            return Err(SnapshotError::Malformed(format!(
                "cohort does not cover ages 0..={}",
                self.params.maximum_age
            )));
        }
        if self.key.sub_steps == 0 {
            return Err(SnapshotError::Malformed("sub_steps must be positive".into()));
        }
        Ok(())
    }
}

impl fmt::Display for StablePopulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} sub-steps per year)", self.key.population_name(), self.key.sub_steps)?;
        writeln!(f, "Pre-reproduction population size: {}", self.cohort.total())?;
        writeln!(f, "Carrying capacity: {:.2}", self.carrying_capacity)?;
        writeln!(f, "Years to stabilize: {}", self.years_to_stabilize)?;
        writeln!(f, "Age\tFemale\tMale")?;
        for age in 0..self.cohort.age_classes() {
            writeln!(
                f,
                "{age}:\t{}\t{}",
                self.cohort.get(Sex::Female, age),
                self.cohort.get(Sex::Male, age)
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("malformed snapshot: {0}")]
    Malformed(String),
}

/// Keyed durable storage for stable populations.
pub trait SnapshotStore {
    /// `Ok(None)` when nothing is stored under `key`.
    fn load(&self, key: &SnapshotKey) -> Result<Option<StablePopulation>, SnapshotError>;
    fn save(&mut self, snapshot: &StablePopulation) -> Result<(), SnapshotError>;
}

/// Stores snapshots as `<root>/ts_<sub_steps>/<species><size>_spop.json`.
pub struct JsonSnapshotStore {
    root: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, key: &SnapshotKey) -> PathBuf {
        self.root
            .join(format!("ts_{}", key.sub_steps))
            .join(format!("{}_spop.json", key.population_name()))
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn load(&self, key: &SnapshotKey) -> Result<Option<StablePopulation>, SnapshotError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        StablePopulation::from_json(&text).map(Some)
    }

    fn save(&mut self, snapshot: &StablePopulation) -> Result<(), SnapshotError> {
        let path = self.path_for(snapshot.key());
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, snapshot.to_json()?)?;
        Ok(())
    }
}

/// In-process store; nothing outlives the value.
#[derive(Default)]
pub struct MemorySnapshotStore {
    entries: HashMap<SnapshotKey, StablePopulation>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, key: &SnapshotKey) -> Result<Option<StablePopulation>, SnapshotError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, snapshot: &StablePopulation) -> Result<(), SnapshotError> {
        self.entries.insert(snapshot.key().clone(), snapshot.clone());
        Ok(())
    }
}
