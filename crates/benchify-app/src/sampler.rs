//! Adaptive sampling of one (tool, test) pair.
//!
//! A pair moves through warmup, then sampling, then stops. Every iteration,
//! warmup or not, is a prepare, run, cleanup cycle. Cleanup is attempted after
//! every cycle no matter how prepare or run went. The first cycle reuses the
//! batch prepare that the session already ran for this pair.

use benchify_adapters::{CancelToken, ProcessRunner, RunResult};
use benchify_domain::{Decision, SampleProgress, evaluate};
use benchify_error::PhaseFailure;
use benchify_types::{SampleRecord, StopReason};
use tracing::{debug, info, warn};

use crate::phase::{PhaseResult, run_phase};
use crate::plan::{PairPlan, Phase};
use crate::progress::{NoProgress, ProgressObserver, Stage};

/// Everything one pair produced. Handed to the aggregator exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    /// Successful durations, seconds, in sampling order.
    pub successes: Vec<f64>,
    pub failures: u32,
    pub attempts: u32,
    pub stop_reason: StopReason,
    /// Most recent failure, used as the report reason for abandoned pairs.
    pub last_failure: Option<String>,
    pub records: Vec<SampleRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerOutcome {
    pub set: SampleSet,
    /// Prepare or run executed after the last successful cleanup.
    pub dirty: bool,
}

pub struct Sampler<'a, R: ProcessRunner + ?Sized> {
    runner: &'a R,
    cancel: Option<&'a CancelToken>,
    progress: &'a dyn ProgressObserver,
}

/// Per-pair mutable state while sampling.
struct PairState<'p> {
    plan: &'p PairPlan,
    /// Result of the session's batch prepare, consumed by the first cycle.
    pending_prepare: Option<PhaseResult>,
    dirty: bool,
    successes: Vec<f64>,
    failures: u32,
    last_failure: Option<String>,
    records: Vec<SampleRecord>,
}

impl PairState<'_> {
    fn attempts(&self) -> u32 {
        self.successes.len() as u32 + self.failures
    }

    fn record(&mut self, outcome: &Result<f64, PhaseFailure>) {
        let iteration = self.attempts() + 1;
        let (seconds, failure) = match outcome {
            Ok(s) => {
                self.successes.push(*s);
                (Some(*s), None)
            }
            Err(f) => {
                self.failures += 1;
                self.last_failure = Some(f.to_string());
                (None, Some(f.to_string()))
            }
        };
        self.records.push(SampleRecord {
            test: self.plan.test.clone(),
            tool: self.plan.tool.clone(),
            iteration,
            seconds,
            failure,
        });
    }

    fn finish(self, stop_reason: StopReason) -> SamplerOutcome {
        SamplerOutcome {
            dirty: self.dirty,
            set: SampleSet {
                attempts: self.attempts(),
                successes: self.successes,
                failures: self.failures,
                stop_reason,
                last_failure: self.last_failure,
                records: self.records,
            },
        }
    }
}

/// Turn a finished run into a duration in seconds.
fn measure(plan: &PairPlan, res: &RunResult) -> Result<f64, PhaseFailure> {
    let wall = res.wall.as_secs_f64();
    if !plan.stdout_is_timing {
        return Ok(wall);
    }
    let text = String::from_utf8_lossy(&res.stdout);
    let text = text.trim();
    let bad = || PhaseFailure::BadTimingOutput {
        output: text.chars().take(64).collect(),
    };
    let reported: f64 = text.parse().map_err(|_| bad())?;
    if !reported.is_finite() || reported < 0.0 {
        return Err(bad());
    }
    if reported > wall {
        warn!(
            tool = %plan.tool,
            test = %plan.test,
            reported,
            wall,
            "reported timing exceeds wall-clock time"
        );
    }
    Ok(reported)
}

impl<'a, R: ProcessRunner + ?Sized> Sampler<'a, R> {
    pub fn new(runner: &'a R, cancel: Option<&'a CancelToken>) -> Self {
        Self {
            runner,
            cancel,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressObserver) -> Self {
        self.progress = progress;
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    /// One prepare, run, cleanup cycle.
    fn cycle(&self, state: &mut PairState<'_>) -> Result<f64, PhaseFailure> {
        let plan = state.plan;

        let prepared = match state.pending_prepare.take() {
            Some(batch) => batch.map(|_| ()),
            None => match &plan.prepare {
                Some(inv) => {
                    state.dirty = true;
                    run_phase(self.runner, plan, inv, Phase::Prepare, self.cancel).map(|_| ())
                }
                None => Ok(()),
            },
        };

        let outcome = prepared.and_then(|()| {
            state.dirty = true;
            let res = run_phase(self.runner, plan, &plan.run, Phase::Run, self.cancel)?;
            measure(plan, &res)
        });

        if let Some(inv) = &plan.cleanup {
            // Without the cancel token: cleanup must run even while cancelling.
            match run_phase(self.runner, plan, inv, Phase::Cleanup, None) {
                Ok(_) => state.dirty = false,
                Err(failure) => {
                    warn!(tool = %plan.tool, test = %plan.test, "{failure}");
                }
            }
        } else {
            state.dirty = false;
        }

        outcome
    }

    /// Sample `plan` until the stopping rule, a fatal error or cancellation
    /// ends it. `batch_prepare` is the session's prepare result for this pair.
    pub fn sample(&self, plan: &PairPlan, batch_prepare: Option<PhaseResult>) -> SamplerOutcome {
        let outcome = self.sample_pair(plan, batch_prepare);
        let set = &outcome.set;
        info!(
            tool = %plan.tool,
            test = %plan.test,
            successes = set.successes.len(),
            failures = set.failures,
            reason = ?set.stop_reason,
            "pair finished"
        );
        self.progress.pair_finished(plan, set);
        outcome
    }

    fn sample_pair(&self, plan: &PairPlan, batch_prepare: Option<PhaseResult>) -> SamplerOutcome {
        let settings = &plan.settings;
        let mut state = PairState {
            plan,
            dirty: batch_prepare.is_some(),
            pending_prepare: batch_prepare,
            successes: Vec::new(),
            failures: 0,
            last_failure: None,
            records: Vec::new(),
        };

        // A failed batch prepare is this pair's first failed attempt.
        if matches!(state.pending_prepare, Some(Err(_))) {
            let outcome = self.cycle(&mut state);
            if outcome.as_ref().is_err_and(PhaseFailure::is_cancelled) {
                return state.finish(StopReason::Cancelled);
            }
            state.record(&outcome);
        }

        if settings.warmup > 0 {
            self.progress.stage_started(plan, Stage::Warmup, settings.warmup);
        }
        for i in 0..settings.warmup {
            let mut tries = 0;
            loop {
                if self.cancelled() {
                    return state.finish(StopReason::Cancelled);
                }
                tries += 1;
                match self.cycle(&mut state) {
                    Ok(_) => {
                        self.progress.attempt_finished(plan, Stage::Warmup, i + 1, true);
                        break;
                    }
                    Err(f) if f.is_cancelled() => return state.finish(StopReason::Cancelled),
                    Err(f) if tries < 2 => {
                        self.progress.attempt_finished(plan, Stage::Warmup, i, false);
                        debug!(tool = %plan.tool, test = %plan.test, warmup = i + 1, "retrying warmup: {f}");
                    }
                    Err(f) => {
                        warn!(tool = %plan.tool, test = %plan.test, "warmup failed twice: {f}");
                        state.last_failure = Some(format!("warmup failed twice: {f}"));
                        return state.finish(StopReason::FatalError);
                    }
                }
            }
        }

        self.progress.stage_started(plan, Stage::Sampling, settings.max_runs);
        let reason = loop {
            let progress = SampleProgress {
                successes: &state.successes,
                failures: state.failures,
                min_runs: settings.min_runs,
                max_runs: settings.max_runs,
            };
            if let Decision::Stop(reason) = evaluate(&settings.stopping, &progress) {
                break reason;
            }
            if self.cancelled() {
                break StopReason::Cancelled;
            }
            let outcome = self.cycle(&mut state);
            if outcome.as_ref().is_err_and(PhaseFailure::is_cancelled) {
                break StopReason::Cancelled;
            }
            state.record(&outcome);
            self.progress.attempt_finished(
                plan,
                Stage::Sampling,
                state.attempts(),
                outcome.is_ok(),
            );
        };

        state.finish(reason)
    }
}
