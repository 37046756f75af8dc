//! Folding sample sets into per-test report entries.

use benchify_domain::{Candidate, relative_to, resolve_main_tool, summarize};
use benchify_types::{PairReport, PairStatus, StopReason, TestReport, TestSpec};
use tracing::warn;

use crate::sampler::SampleSet;

/// How a scheduled pair ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum PairResult {
    /// Never sampled: tool unavailable, no runner, or planning failed.
    Skipped {
        reason: String,
        stop_reason: Option<StopReason>,
    },
    Sampled(SampleSet),
}

/// One scheduled pair, identified by declaration position.
#[derive(Debug, Clone, PartialEq)]
pub struct PairEntry {
    pub test_index: usize,
    pub tool_index: usize,
    pub tool: String,
    pub result: PairResult,
}

fn pair_report(tool: &str, result: &PairResult) -> PairReport {
    match result {
        PairResult::Skipped {
            reason,
            stop_reason,
        } => PairReport {
            tool: tool.to_string(),
            status: PairStatus::Skipped,
            stop_reason: *stop_reason,
            attempts: 0,
            failures: 0,
            stats: None,
            relative: None,
            reason: Some(reason.clone()),
        },
        PairResult::Sampled(set) => {
            let status = match set.stop_reason {
                StopReason::MaxRunsReached | StopReason::StabilityReached => PairStatus::Measured,
                StopReason::Cancelled => PairStatus::Cancelled,
                StopReason::FatalError | StopReason::ToolUnavailable => PairStatus::Fatal,
            };
            let reason = match status {
                PairStatus::Measured => None,
                PairStatus::Cancelled => Some("session cancelled".to_string()),
                _ => set.last_failure.clone(),
            };
            PairReport {
                tool: tool.to_string(),
                status,
                stop_reason: Some(set.stop_reason),
                attempts: set.attempts,
                failures: set.failures,
                stats: summarize(&set.successes).ok(),
                relative: None,
                reason,
            }
        }
    }
}

/// Build one [`TestReport`] per declared test.
///
/// Entries may arrive in any order; output follows declaration order of tests,
/// then tools, so the report does not depend on scheduling.
pub fn build_test_reports(
    tests: &[TestSpec],
    configured_main: Option<&str>,
    mut entries: Vec<PairEntry>,
) -> Vec<TestReport> {
    entries.sort_by_key(|e| (e.test_index, e.tool_index));

    tests
        .iter()
        .enumerate()
        .map(|(ti, test)| {
            let mut pairs: Vec<PairReport> = entries
                .iter()
                .filter(|e| e.test_index == ti)
                .map(|e| pair_report(&e.tool, &e.result))
                .collect();

            let candidates: Vec<Candidate<'_>> = pairs
                .iter()
                .filter(|p| p.status == PairStatus::Measured)
                .filter_map(|p| {
                    p.stats.as_ref().map(|s| Candidate {
                        tool: &p.tool,
                        mean: s.mean,
                    })
                })
                .collect();
            let main = resolve_main_tool(configured_main, &candidates).map(str::to_string);

            if let Some(main_name) = main.as_deref()
                && let Some(main_mean) = pairs
                    .iter()
                    .find(|p| p.tool == main_name)
                    .and_then(|p| p.stats.as_ref())
                    .map(|s| s.mean)
            {
                match relative_to(main_mean, main_mean) {
                    Ok(_) => {
                        for pair in pairs.iter_mut().filter(|p| p.status == PairStatus::Measured) {
                            if let Some(stats) = &pair.stats {
                                pair.relative = relative_to(main_mean, stats.mean).ok();
                            }
                        }
                    }
                    Err(err) => {
                        warn!(
                            test = %test.name,
                            main_tool = main_name,
                            "no relative deltas: {err}"
                        );
                        if let Some(p) = pairs.iter_mut().find(|p| p.tool == main_name) {
                            p.reason = Some(format!("no relative deltas: {err}"));
                        }
                    }
                }
            }

            TestReport {
                name: test.name.clone(),
                tag: test.tag.clone(),
                main_tool: main,
                pairs,
            }
        })
        .collect()
}
