//! Domain logic for benchify.
//!
//! This crate is intentionally I/O-free: it does substitution, math and policy.

mod compare;
mod interpolate;
mod settings;
mod stats;
mod stopping;

pub use compare::{relative_to, resolve_main_tool, Candidate};
pub use interpolate::{
    resolve_args, resolve_shell, shell_quote, Interpolant, InterpolationContext,
};
pub use settings::{effective_settings, EffectiveSettings, GlobalDefaults, RunnerOverrides};
pub use stats::{relative_half_width, summarize};
pub use stopping::{evaluate, Decision, SampleProgress, StoppingRule};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("no samples to summarize")]
    NoSamples,

    #[error("baseline mean must be > 0, got {0}")]
    InvalidBaseline(f64),

    #[error("min_runs ({min}) must not exceed max_runs ({max})")]
    RunBounds { min: u32, max: u32 },

    #[error("max_runs must be at least 1")]
    ZeroMaxRuns,
}
