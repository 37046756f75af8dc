//! When to stop sampling a pair.

use crate::stats::relative_half_width;
use benchify_types::StopReason;

/// Tunable constants of the adaptive stopping rule.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StoppingRule {
    /// Two-sided confidence level of the Student-t interval.
    pub confidence_level: f64,

    /// Relative half-width (half-width / mean) below which a pair is stable.
    pub stability_threshold: f64,

    /// Failed / attempted ratio above which a pair is abandoned.
    pub max_failure_ratio: f64,
}

impl Default for StoppingRule {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            stability_threshold: 0.02,
            max_failure_ratio: 0.5,
        }
    }
}

/// Where a pair stands after its latest attempt.
#[derive(Debug, Clone, Copy)]
pub struct SampleProgress<'a> {
    pub successes: &'a [f64],
    pub failures: u32,
    pub min_runs: u32,
    pub max_runs: u32,
}

impl SampleProgress<'_> {
    pub fn attempts(&self) -> u32 {
        self.successes.len() as u32 + self.failures
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop(StopReason),
}

impl StoppingRule {
    fn failure_ratio_exceeded(&self, p: &SampleProgress<'_>) -> bool {
        if p.failures == 0 {
            return false;
        }
        let window = p.min_runs.max(1);
        let attempts = p.attempts();
        if attempts >= window {
            f64::from(p.failures) / f64::from(attempts) > self.max_failure_ratio
        } else {
            // Past this many failures the ratio cannot recover by the end of the window.
            f64::from(p.failures) > self.max_failure_ratio * f64::from(window)
        }
    }
}

/// Decide whether sampling continues. Checked in order: max runs, failure
/// ratio, stability.
///
/// Stability needs at least `max(min_runs, 1)` successes. With `min_runs` of
/// 0 or 1 a single success is enough.
pub fn evaluate(rule: &StoppingRule, progress: &SampleProgress<'_>) -> Decision {
    let successes = progress.successes.len() as u32;
    if successes >= progress.max_runs {
        return Decision::Stop(StopReason::MaxRunsReached);
    }
    if rule.failure_ratio_exceeded(progress) {
        return Decision::Stop(StopReason::FatalError);
    }
    if successes >= progress.min_runs.max(1) {
        // A lone sample has no spread to measure; it only gets here with min_runs <= 1.
        let stable = match relative_half_width(progress.successes, rule.confidence_level) {
            Some(hw) => hw < rule.stability_threshold,
            None => true,
        };
        if stable {
            return Decision::Stop(StopReason::StabilityReached);
        }
    }
    Decision::Continue
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(successes: &[f64], failures: u32, min: u32, max: u32) -> SampleProgress<'_> {
        SampleProgress {
            successes,
            failures,
            min_runs: min,
            max_runs: max,
        }
    }

    #[test]
    fn identical_samples_stop_at_min_runs() {
        let rule = StoppingRule::default();
        let v = [0.5; 10];
        assert_eq!(
            evaluate(&rule, &progress(&v[..9], 0, 10, 1000)),
            Decision::Continue
        );
        assert_eq!(
            evaluate(&rule, &progress(&v, 0, 10, 1000)),
            Decision::Stop(StopReason::StabilityReached)
        );
    }

    #[test]
    fn min_runs_of_one_or_zero_stops_after_one_success() {
        let rule = StoppingRule::default();
        for min in [0, 1] {
            assert_eq!(
                evaluate(&rule, &progress(&[], 0, min, 100)),
                Decision::Continue
            );
            assert_eq!(
                evaluate(&rule, &progress(&[0.05], 0, min, 100)),
                Decision::Stop(StopReason::StabilityReached)
            );
        }
    }

    #[test]
    fn max_runs_wins_over_stability() {
        let rule = StoppingRule::default();
        let v = [0.5; 5];
        assert_eq!(
            evaluate(&rule, &progress(&v, 0, 5, 5)),
            Decision::Stop(StopReason::MaxRunsReached)
        );
    }

    #[test]
    fn noisy_samples_continue() {
        let rule = StoppingRule::default();
        let v = [0.1, 1.0, 0.2, 0.9, 0.3, 0.8, 0.15, 0.95, 0.25, 0.85];
        assert_eq!(
            evaluate(&rule, &progress(&v, 0, 10, 1000)),
            Decision::Continue
        );
    }

    #[test]
    fn six_failures_in_first_ten_is_fatal_early() {
        let rule = StoppingRule::default();
        let ok = [0.1; 3];
        assert_eq!(
            evaluate(&rule, &progress(&ok, 5, 10, 1000)),
            Decision::Continue
        );
        assert_eq!(
            evaluate(&rule, &progress(&ok, 6, 10, 1000)),
            Decision::Stop(StopReason::FatalError)
        );
    }

    #[test]
    fn ratio_applies_after_window() {
        let rule = StoppingRule::default();
        // 11 attempts, 5 failures: 0.45 <= 0.5
        let ok = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        assert_eq!(
            evaluate(&rule, &progress(&ok, 5, 10, 1000)),
            Decision::Continue
        );
        // 13 attempts, 7 failures: 0.54 > 0.5
        assert_eq!(
            evaluate(&rule, &progress(&ok, 7, 10, 1000)),
            Decision::Stop(StopReason::FatalError)
        );
    }

    #[test]
    fn single_failure_with_min_runs_one_is_fatal() {
        let rule = StoppingRule::default();
        assert_eq!(
            evaluate(&rule, &progress(&[], 1, 1, 10)),
            Decision::Stop(StopReason::FatalError)
        );
    }

    #[test]
    fn one_sample_is_not_stable_when_more_are_required() {
        let rule = StoppingRule::default();
        assert_eq!(
            evaluate(&rule, &progress(&[0.3], 0, 2, 10)),
            Decision::Continue
        );
        assert_eq!(
            evaluate(&rule, &progress(&[0.3, 0.3], 0, 2, 10)),
            Decision::Stop(StopReason::StabilityReached)
        );
    }

    #[test]
    fn looser_threshold_stops_sooner() {
        let v = [1.0, 1.1, 0.9, 1.05, 0.95];
        let strict = StoppingRule::default();
        let loose = StoppingRule {
            stability_threshold: 0.5,
            ..StoppingRule::default()
        };
        assert_eq!(evaluate(&strict, &progress(&v, 0, 5, 100)), Decision::Continue);
        assert_eq!(
            evaluate(&loose, &progress(&v, 0, 5, 100)),
            Decision::Stop(StopReason::StabilityReached)
        );
    }
}
