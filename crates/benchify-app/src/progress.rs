//! Live progress hooks for a running session.
//!
//! The session and sampler call into a [`ProgressObserver`] as work happens.
//! Events of one pair arrive in order from one thread; different pairs may
//! report concurrently when `jobs` or `parallel_prep` allow it.

use crate::plan::{PairPlan, Phase};
use crate::sampler::SampleSet;
use std::sync::Arc;

/// Which part of a pair's life a bar tracks.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    Warmup,
    Sampling,
}

pub trait ProgressObserver: Sync {
    /// A session-level prepare or cleanup invocation for `plan` started.
    fn batch_started(&self, _plan: &PairPlan, _phase: Phase) {}

    fn batch_finished(&self, _plan: &PairPlan, _phase: Phase, _ok: bool) {}

    /// `len` is the warmup count, or `max_runs` for sampling.
    fn stage_started(&self, _plan: &PairPlan, _stage: Stage, _len: u32) {}

    /// `done` counts the stage's completed iterations, failed sampling
    /// attempts included. A warmup retry reports `ok = false` without
    /// advancing `done`.
    fn attempt_finished(&self, _plan: &PairPlan, _stage: Stage, _done: u32, _ok: bool) {}

    fn pair_finished(&self, _plan: &PairPlan, _set: &SampleSet) {}
}

impl<T: ProgressObserver + Send + ?Sized> ProgressObserver for Arc<T> {
    fn batch_started(&self, plan: &PairPlan, phase: Phase) {
        (**self).batch_started(plan, phase);
    }

    fn batch_finished(&self, plan: &PairPlan, phase: Phase, ok: bool) {
        (**self).batch_finished(plan, phase, ok);
    }

    fn stage_started(&self, plan: &PairPlan, stage: Stage, len: u32) {
        (**self).stage_started(plan, stage, len);
    }

    fn attempt_finished(&self, plan: &PairPlan, stage: Stage, done: u32, ok: bool) {
        (**self).attempt_finished(plan, stage, done, ok);
    }

    fn pair_finished(&self, plan: &PairPlan, set: &SampleSet) {
        (**self).pair_finished(plan, set);
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}
