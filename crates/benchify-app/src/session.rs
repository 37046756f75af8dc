//! A whole benchmark session: every (test, tool) pair of one config.

use anyhow::{Context, anyhow, bail};
use benchify_adapters::{CancelToken, ProcessRunner};
use benchify_config::validate;
use benchify_types::{
    ConfigFile, HostInfo, REPORT_SCHEMA_V1, Report, RunMeta, SampleRecord, StopReason, ToolInfo,
    UnavailableTool,
};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::Clock;
use crate::aggregate::{PairEntry, PairResult, build_test_reports};
use crate::availability::check_tools;
use crate::phase::{PhaseResult, run_phase_batch};
use crate::plan::{PairPlan, Phase, build_pair_plan, global_defaults};
use crate::progress::{NoProgress, ProgressObserver};
use crate::sampler::{Sampler, SamplerOutcome};

/// Order in which scheduled pairs are handed to the sampler.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ScheduleOrder {
    #[default]
    Declared,
    Reversed,
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub config: ConfigFile,

    /// Overrides the config's `jobs`.
    pub jobs: Option<usize>,
    pub order: ScheduleOrder,
    pub cancel: CancelToken,
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub report: Report,

    /// Raw sampling records, pairs in declaration order.
    pub records: Vec<SampleRecord>,
}

/// Collects sampler outcomes from concurrent workers. A pair may be
/// recorded once.
#[derive(Default)]
struct SampleSink {
    outcomes: Mutex<BTreeMap<usize, SamplerOutcome>>,
}

impl SampleSink {
    fn record(&self, pair: usize, outcome: SamplerOutcome) -> anyhow::Result<()> {
        let mut outcomes = self
            .outcomes
            .lock()
            .map_err(|_| anyhow!("sample sink lock poisoned"))?;
        if outcomes.contains_key(&pair) {
            bail!("pair #{pair} was sampled twice");
        }
        outcomes.insert(pair, outcome);
        Ok(())
    }

    fn into_inner(self) -> anyhow::Result<BTreeMap<usize, SamplerOutcome>> {
        self.outcomes
            .into_inner()
            .map_err(|_| anyhow!("sample sink lock poisoned"))
    }
}

/// A pair that made it through planning.
struct Unit {
    /// Position in declaration order (tests, then tools).
    pair: usize,
    test_index: usize,
    tool_index: usize,
    plan: PairPlan,
}

pub struct BenchSessionUseCase<R: ProcessRunner + Sync, C: Clock> {
    runner: R,
    clock: C,
    tool: ToolInfo,
    progress: Box<dyn ProgressObserver + Send>,
}

impl<R: ProcessRunner + Sync, C: Clock> BenchSessionUseCase<R, C> {
    pub fn new(runner: R, clock: C, tool: ToolInfo) -> Self {
        Self {
            runner,
            clock,
            tool,
            progress: Box::new(NoProgress),
        }
    }

    /// Report batch phases and sampling progress to `progress`.
    pub fn with_progress(mut self, progress: impl ProgressObserver + Send + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn execute(&self, req: SessionRequest) -> anyhow::Result<SessionOutcome> {
        let cfg = &req.config;
        validate(cfg)?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = self.clock.now_rfc3339();
        let host = HostInfo {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        };

        let jobs = req.jobs.unwrap_or_else(|| cfg.jobs());
        if jobs == 0 {
            bail!("jobs must be at least 1");
        }
        let defaults = global_defaults(cfg)?;
        let working_dir = cfg.working_dir.as_deref().map(PathBuf::from);

        let availability = check_tools(&self.runner, &cfg.tools, working_dir.as_deref());

        let mut skipped = Vec::new();
        let mut units = Vec::new();
        for (test_index, test) in cfg.tests.iter().enumerate() {
            for (tool_index, tool) in cfg.tools.iter().enumerate() {
                let pair = test_index * cfg.tools.len() + tool_index;
                let skip = |reason: String, stop_reason: Option<StopReason>| PairEntry {
                    test_index,
                    tool_index,
                    tool: tool.name.clone(),
                    result: PairResult::Skipped {
                        reason,
                        stop_reason,
                    },
                };

                if let Some(unavailable) = availability.reason(&tool.name) {
                    skipped.push(skip(
                        unavailable.to_string(),
                        Some(StopReason::ToolUnavailable),
                    ));
                    continue;
                }
                match build_pair_plan(tool, test, &defaults, working_dir.as_deref()) {
                    Ok(plan) => units.push(Unit {
                        pair,
                        test_index,
                        tool_index,
                        plan,
                    }),
                    Err(err) => {
                        warn!(tool = %tool.name, test = %test.name, "skipping pair: {err}");
                        skipped.push(skip(err.to_string(), None));
                    }
                }
            }
        }
        info!(
            pairs = units.len(),
            skipped = skipped.len(),
            jobs,
            "session scheduled"
        );

        let parallel_prep = cfg.parallel_prep();
        let plans: Vec<&PairPlan> = units.iter().map(|u| &u.plan).collect();
        let prepared = run_phase_batch(
            &self.runner,
            &plans,
            Phase::Prepare,
            parallel_prep,
            Some(&req.cancel),
            self.progress.as_ref(),
        );

        let mut work: Vec<(&Unit, Option<PhaseResult>)> = units.iter().zip(prepared).collect();
        if req.order == ScheduleOrder::Reversed {
            work.reverse();
        }

        let sink = SampleSink::default();
        let sampler =
            Sampler::new(&self.runner, Some(&req.cancel)).with_progress(self.progress.as_ref());
        let sample_one = |(unit, prepared): (&Unit, Option<PhaseResult>)| -> anyhow::Result<()> {
            debug!(tool = %unit.plan.tool, test = %unit.plan.test, "sampling pair");
            sink.record(unit.pair, sampler.sample(&unit.plan, prepared))
        };

        if jobs == 1 {
            work.into_iter().try_for_each(sample_one)?;
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .context("failed to build sampling thread pool")?;
            pool.install(|| work.into_par_iter().try_for_each(sample_one))?;
        }

        let mut outcomes = sink.into_inner()?;

        let dirty: Vec<&PairPlan> = units
            .iter()
            .filter(|u| outcomes.get(&u.pair).is_some_and(|o| o.dirty))
            .map(|u| &u.plan)
            .collect();
        if !dirty.is_empty() {
            info!(pairs = dirty.len(), "cleaning up dirty pairs");
            // Without the cancel token: cleanup must run even while cancelling.
            run_phase_batch(
                &self.runner,
                &dirty,
                Phase::Cleanup,
                parallel_prep,
                None,
                self.progress.as_ref(),
            );
        }

        let mut entries = skipped;
        let mut records = Vec::new();
        for unit in &units {
            let outcome = outcomes
                .remove(&unit.pair)
                .ok_or_else(|| anyhow!("pair #{} was never sampled", unit.pair))?;
            records.extend(outcome.set.records.iter().cloned());
            entries.push(PairEntry {
                test_index: unit.test_index,
                tool_index: unit.tool_index,
                tool: unit.plan.tool.clone(),
                result: PairResult::Sampled(outcome.set),
            });
        }

        let tests = build_test_reports(&cfg.tests, cfg.main_tool.as_deref(), entries);
        let unavailable_tools = availability
            .unavailable()
            .map(|u| UnavailableTool {
                name: u.tool.clone(),
                detail: u.detail.clone(),
                install_instructions: u.install_instructions.clone(),
            })
            .collect();

        let ended_at = self.clock.now_rfc3339();

        let report = Report {
            schema: REPORT_SCHEMA_V1.to_string(),
            tool: self.tool.clone(),
            run: RunMeta {
                id: run_id,
                started_at,
                ended_at,
                host,
            },
            configured_main_tool: cfg.main_tool.clone(),
            unavailable_tools,
            tests,
        };

        Ok(SessionOutcome { report, records })
    }
}
