//! Layering of runner overrides over global defaults.

use crate::DomainError;
use crate::stopping::StoppingRule;
use std::time::Duration;

/// Global settings, already parsed from the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDefaults {
    pub warmup: u32,
    pub min_runs: u32,
    pub max_runs: u32,
    pub timeout: Option<Duration>,
    pub allow_nonzero: bool,
    pub stopping: StoppingRule,
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self {
            warmup: 0,
            min_runs: benchify_types::DEFAULT_MIN_RUNS,
            max_runs: benchify_types::DEFAULT_MAX_RUNS,
            timeout: None,
            allow_nonzero: false,
            stopping: StoppingRule::default(),
        }
    }
}

/// Fields a runner may override. `None` inherits the global value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerOverrides {
    pub warmup: Option<u32>,
    pub min_runs: Option<u32>,
    pub max_runs: Option<u32>,
    pub timeout: Option<Duration>,
}

/// Settings one (tool, test) pair is sampled with.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSettings {
    pub warmup: u32,
    pub min_runs: u32,
    pub max_runs: u32,
    pub timeout: Option<Duration>,
    pub allow_nonzero: bool,
    pub stopping: StoppingRule,
}

/// Resolve a runner's settings: the runner's own value wins, otherwise the
/// global one. Bounds are checked after layering, so a runner can raise
/// `max_runs` above a global `min_runs` and still be valid.
pub fn effective_settings(
    global: &GlobalDefaults,
    runner: &RunnerOverrides,
) -> Result<EffectiveSettings, DomainError> {
    let min_runs = runner.min_runs.unwrap_or(global.min_runs);
    let max_runs = runner.max_runs.unwrap_or(global.max_runs);
    if max_runs == 0 {
        return Err(DomainError::ZeroMaxRuns);
    }
    if min_runs > max_runs {
        return Err(DomainError::RunBounds {
            min: min_runs,
            max: max_runs,
        });
    }
    Ok(EffectiveSettings {
        warmup: runner.warmup.unwrap_or(global.warmup),
        min_runs,
        max_runs,
        timeout: runner.timeout.or(global.timeout),
        allow_nonzero: global.allow_nonzero,
        stopping: global.stopping,
    })
}
