pub mod cohort;
pub mod config;
pub mod engine;
pub mod harvest;
pub mod logging;
pub mod report;
pub mod rng;
pub mod snapshot;
pub mod species;
pub mod stabilize;

pub use cohort::{CohortMatrix, Sex};
pub use engine::{CohortEngine, EngineError, YearHooks, YearSignal};
pub use harvest::{HarvestConfig, HarvestRunner, RateEscalation};
pub use snapshot::{JsonSnapshotStore, SnapshotKey, SnapshotStore, StablePopulation};
pub use species::{ParameterSetLoader, SpeciesParameters};
pub use stabilize::{StabilizationController, StabilizationOutcome};
