//! Running single phases, and whole batches of them.

use benchify_adapters::{CancelToken, ProcessRunner, RunResult};
use benchify_error::PhaseFailure;
use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::plan::{Invocation, PairPlan, Phase};
use crate::progress::ProgressObserver;

pub type PhaseResult = Result<RunResult, PhaseFailure>;

/// Launch one invocation and classify the outcome.
///
/// `allow_nonzero` only relaxes the run phase; a failing prepare or cleanup
/// is always a failure.
pub fn run_phase<R: ProcessRunner + ?Sized>(
    runner: &R,
    plan: &PairPlan,
    invocation: &Invocation,
    phase: Phase,
    cancel: Option<&CancelToken>,
) -> PhaseResult {
    let name = phase.as_str();
    let spec = invocation.launch_spec(plan.settings.timeout, cancel);
    trace!(tool = %plan.tool, test = %plan.test, phase = name, command = %spec.command.display(), "launching");

    let res = runner.run(&spec).map_err(|err| PhaseFailure::Launch {
        phase: name,
        detail: err.to_string(),
    })?;

    if res.cancelled {
        return Err(PhaseFailure::Cancelled { phase: name });
    }
    if res.timed_out {
        return Err(PhaseFailure::TimedOut { phase: name });
    }
    let nonzero_ok = phase == Phase::Run && plan.settings.allow_nonzero;
    if res.exit_code != 0 && !nonzero_ok {
        debug!(
            tool = %plan.tool,
            test = %plan.test,
            phase = name,
            exit_code = res.exit_code,
            stderr = %String::from_utf8_lossy(&res.stderr).trim(),
            "phase failed"
        );
        return Err(PhaseFailure::NonZeroExit {
            phase: name,
            code: res.exit_code,
        });
    }
    Ok(res)
}

/// Run `phase` for every plan, concurrently or one after another.
///
/// The result vector lines up with `plans`; `None` marks a plan without that
/// phase. A failure only affects its own entry.
pub fn run_phase_batch<R: ProcessRunner + Sync>(
    runner: &R,
    plans: &[&PairPlan],
    phase: Phase,
    parallel: bool,
    cancel: Option<&CancelToken>,
    progress: &dyn ProgressObserver,
) -> Vec<Option<PhaseResult>> {
    let one = |plan: &&PairPlan| -> Option<PhaseResult> {
        let invocation = plan.invocation(phase)?;
        progress.batch_started(plan, phase);
        let result = run_phase(runner, plan, invocation, phase, cancel);
        if let Err(failure) = &result {
            warn!(tool = %plan.tool, test = %plan.test, "{failure}");
        }
        progress.batch_finished(plan, phase, result.is_ok());
        Some(result)
    };

    debug!(phase = phase.as_str(), pairs = plans.len(), parallel, "phase batch");
    if parallel {
        plans.par_iter().map(one).collect()
    } else {
        plans.iter().map(one).collect()
    }
}
