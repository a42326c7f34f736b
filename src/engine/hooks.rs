use serde::Serialize;

use super::CohortEngine;

/// Outcome of a hook or of a whole simulated year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum YearSignal {
    Continue,
    PopulationCrashed,
    SexBiasUnsustainable,
    ScheduledStop,
}

impl YearSignal {
    pub fn is_terminal(self) -> bool {
        self != YearSignal::Continue
    }
}

/// Extension points of the annual cycle, invoked in this order:
///
/// `before_all` → reproduction → `post_reproduction` → for each sub-step
/// (`pre_mortality` → natural mortality → `post_mortality`) →
/// `post_all_sub_steps` → aging → `after_all`.
///
/// Any terminal signal ends the year at that point and is returned to the
/// caller of [`CohortEngine::simulate_year`].
pub trait YearHooks {
    fn before_all(&mut self, _engine: &mut CohortEngine) -> YearSignal {
        YearSignal::Continue
    }

    fn post_reproduction(&mut self, _engine: &mut CohortEngine) -> YearSignal {
        YearSignal::Continue
    }

    fn pre_mortality(&mut self, _engine: &mut CohortEngine, _step: usize) -> YearSignal {
        YearSignal::Continue
    }

    fn post_mortality(&mut self, _engine: &mut CohortEngine, _step: usize) -> YearSignal {
        YearSignal::Continue
    }

    fn post_all_sub_steps(&mut self, _engine: &mut CohortEngine) -> YearSignal {
        YearSignal::Continue
    }

    fn after_all(&mut self, _engine: &mut CohortEngine) -> YearSignal {
        YearSignal::Continue
    }
}

/// Runs the bare demographic cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl YearHooks for NoHooks {}
