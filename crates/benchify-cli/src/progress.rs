//! Terminal progress bars for `benchify run`.

use benchify_app::{PairPlan, Phase, ProgressObserver, SampleSet, Stage};
use benchify_types::StopReason;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const BAR_TEMPLATE: &str =
    "{spinner:.green} {msg} [{wide_bar:.cyan/blue}] {pos}/{len} ({elapsed} -- ETA {eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg} ({elapsed_precise})";
const DONE_TEMPLATE: &str = "{spinner:.green} {msg}";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// One live bar per (test, tool) pair, stacked in a [`MultiProgress`].
pub struct TerminalProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<(String, String), ProgressBar>>,
}

impl TerminalProgress {
    /// Bars draw on stderr when it is a terminal. `hidden` turns them off.
    pub fn new(hidden: bool) -> Self {
        let multi = if hidden {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
        }
    }

    /// Writer for log lines that keeps them from tearing through the bars.
    pub fn log_writer(&self) -> SuspendedStderr {
        SuspendedStderr(self.multi.clone())
    }

    fn bars(&self) -> MutexGuard<'_, HashMap<(String, String), ProgressBar>> {
        self.bars.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self, test: &str, tool: &str, bar: ProgressBar) {
        let bar = self.multi.add(bar);
        if let Some(old) = self.bars().insert((test.to_string(), tool.to_string()), bar) {
            old.finish_and_clear();
            self.multi.remove(&old);
        }
    }

    fn take(&self, test: &str, tool: &str) -> Option<ProgressBar> {
        self.bars().remove(&(test.to_string(), tool.to_string()))
    }

    #[cfg(test)]
    fn live(&self) -> usize {
        self.bars().len()
    }
}

impl ProgressObserver for TerminalProgress {
    fn batch_started(&self, plan: &PairPlan, phase: Phase) {
        let bar = ProgressBar::new_spinner().with_style(style(SPINNER_TEMPLATE));
        bar.set_message(format!("[{}] [{}] {}", plan.test, plan.tool, phase.as_str()));
        bar.enable_steady_tick(Duration::from_millis(100));
        self.start(&plan.test, &plan.tool, bar);
    }

    fn batch_finished(&self, plan: &PairPlan, _phase: Phase, _ok: bool) {
        // Failures are logged by the batch itself.
        if let Some(bar) = self.take(&plan.test, &plan.tool) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
    }

    fn stage_started(&self, plan: &PairPlan, stage: Stage, len: u32) {
        let label = match stage {
            Stage::Warmup => "Warmup runs",
            Stage::Sampling => "Benchmarking",
        };
        let bar = ProgressBar::new(u64::from(len)).with_style(style(BAR_TEMPLATE));
        bar.set_message(format!("[{}] [{}] {label}", plan.test, plan.tool));
        self.start(&plan.test, &plan.tool, bar);
    }

    fn attempt_finished(&self, plan: &PairPlan, _stage: Stage, done: u32, _ok: bool) {
        if let Some(bar) = self.bars().get(&(plan.test.clone(), plan.tool.clone())) {
            bar.set_position(u64::from(done));
        }
    }

    fn pair_finished(&self, plan: &PairPlan, set: &SampleSet) {
        let message = finish_message(&plan.test, &plan.tool, set);
        match self.take(&plan.test, &plan.tool) {
            Some(bar) => {
                bar.set_style(style(DONE_TEMPLATE));
                bar.finish_with_message(message);
            }
            None => {
                let _ = self.multi.println(message);
            }
        }
    }
}

fn finish_message(test: &str, tool: &str, set: &SampleSet) -> String {
    let outcome = match set.stop_reason {
        StopReason::StabilityReached => "stable",
        StopReason::MaxRunsReached => "max runs",
        StopReason::Cancelled => "cancelled",
        StopReason::FatalError | StopReason::ToolUnavailable => "FAILED",
    };
    let mut msg = format!("[{test}] [{tool}] {outcome} after {} runs", set.attempts);
    if set.failures > 0 {
        msg.push_str(&format!(" ({} failed)", set.failures));
    }
    if !set.successes.is_empty() {
        let mean = set.successes.iter().sum::<f64>() / set.successes.len() as f64;
        msg.push_str(&format!(", mean {:.3} ms", mean * 1e3));
    }
    msg
}

/// Stderr with the progress bars hidden for the duration of each write.
#[derive(Clone)]
pub struct SuspendedStderr(MultiProgress);

impl Write for SuspendedStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}
