//! Application layer for benchify.
//!
//! The app layer coordinates adapters and domain logic.
//! It does not parse CLI flags and it does not write result files.

mod aggregate;
mod availability;
mod phase;
mod plan;
mod progress;
mod render;
mod sampler;
mod session;

pub use aggregate::{build_test_reports, PairEntry, PairResult};
pub use availability::{check_tools, Availability, CONFIRMATION_TIMEOUT};
pub use phase::{run_phase, run_phase_batch, PhaseResult};
pub use plan::{build_pair_plan, global_defaults, Invocation, PairPlan, Phase};
pub use progress::{NoProgress, ProgressObserver, Stage};
pub use render::{render_markdown, render_test_markdown};
pub use sampler::{Sampler, SamplerOutcome, SampleSet};
pub use session::{BenchSessionUseCase, ScheduleOrder, SessionOutcome, SessionRequest};

/// Bytes of stdout/stderr kept per invocation.
pub const OUTPUT_CAP_BYTES: usize = 64 * 1024;

pub trait Clock: Send + Sync {
    fn now_rfc3339(&self) -> String;
}

#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_rfc3339(&self) -> String {
        use time::format_description::well_known::Rfc3339;
        time::OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }
}
