//! Turns a (tool, test) pair into concrete invocations and settings.

use anyhow::Context;
use benchify_adapters::{CancelToken, CommandLine, LaunchSpec, StdinSource};
use benchify_config::parse_timeout;
use benchify_domain::{
    EffectiveSettings, GlobalDefaults, InterpolationContext, RunnerOverrides, StoppingRule,
    effective_settings, resolve_args, resolve_shell,
};
use benchify_error::PlanError;
use benchify_types::{ConfigFile, RunTemplate, TestSpec, ToolSpec};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::OUTPUT_CAP_BYTES;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Run,
    Cleanup,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::Run => "run",
            Phase::Cleanup => "cleanup",
        }
    }
}

/// A fully resolved command, ready to launch any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub command: CommandLine,
    pub cwd: Option<PathBuf>,
    pub stdin: StdinSource,
}

impl Invocation {
    /// A fresh launch description for one call.
    pub fn launch_spec(&self, timeout: Option<Duration>, cancel: Option<&CancelToken>) -> LaunchSpec {
        LaunchSpec {
            command: self.command.clone(),
            cwd: self.cwd.clone(),
            stdin: self.stdin.clone(),
            timeout,
            output_cap_bytes: OUTPUT_CAP_BYTES,
            cancel: cancel.cloned(),
        }
    }
}

/// Everything needed to sample one (tool, test) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairPlan {
    pub tool: String,
    pub test: String,
    pub tag: String,
    pub prepare: Option<Invocation>,
    pub run: Invocation,
    pub cleanup: Option<Invocation>,
    pub settings: EffectiveSettings,
    pub stdout_is_timing: bool,
}

impl PairPlan {
    pub fn invocation(&self, phase: Phase) -> Option<&Invocation> {
        match phase {
            Phase::Prepare => self.prepare.as_ref(),
            Phase::Run => Some(&self.run),
            Phase::Cleanup => self.cleanup.as_ref(),
        }
    }
}

/// Global settings from a validated config.
pub fn global_defaults(cfg: &ConfigFile) -> anyhow::Result<GlobalDefaults> {
    let timeout = cfg
        .timeout
        .as_deref()
        .map(parse_timeout)
        .transpose()
        .map_err(anyhow::Error::msg)
        .context("global timeout")?;

    let base = StoppingRule::default();
    Ok(GlobalDefaults {
        warmup: cfg.warmup.unwrap_or(0),
        min_runs: cfg.min_runs(),
        max_runs: cfg.max_runs(),
        timeout,
        allow_nonzero: cfg.allow_nonzero(),
        stopping: StoppingRule {
            confidence_level: cfg.confidence_level.unwrap_or(base.confidence_level),
            stability_threshold: cfg.stability_threshold.unwrap_or(base.stability_threshold),
            max_failure_ratio: cfg.max_failure_ratio.unwrap_or(base.max_failure_ratio),
        },
    })
}

/// Select the runner for the test's tag and resolve its templates.
pub fn build_pair_plan(
    tool: &ToolSpec,
    test: &TestSpec,
    defaults: &GlobalDefaults,
    working_dir: Option<&Path>,
) -> Result<PairPlan, PlanError> {
    let runner = tool
        .runners
        .get(&test.tag)
        .ok_or_else(|| PlanError::NoRunnerForTag {
            tool: tool.name.clone(),
            tag: test.tag.clone(),
        })?;

    let invalid = |detail: String| PlanError::InvalidSettings {
        tool: tool.name.clone(),
        detail,
    };
    let interpolation = |source| PlanError::Interpolation {
        tool: tool.name.clone(),
        source,
    };

    let overrides = RunnerOverrides {
        warmup: runner.warmup,
        min_runs: runner.min_runs,
        max_runs: runner.max_runs,
        timeout: runner
            .timeout
            .as_deref()
            .map(parse_timeout)
            .transpose()
            .map_err(invalid)?,
    };
    let settings = effective_settings(defaults, &overrides).map_err(|e| invalid(e.to_string()))?;

    let ctx = InterpolationContext {
        name: &test.name,
        tag: &test.tag,
        file: test.file.as_deref(),
        extra_args: &test.extra_args,
    };
    let cwd = working_dir.map(Path::to_path_buf);
    let shell = |template: &str| -> Result<Invocation, PlanError> {
        Ok(Invocation {
            command: CommandLine::Shell(resolve_shell(template, &ctx).map_err(interpolation)?),
            cwd: cwd.clone(),
            stdin: StdinSource::Null,
        })
    };

    let prepare = runner.prepare.as_deref().map(shell).transpose()?;
    let cleanup = runner.cleanup.as_deref().map(shell).transpose()?;

    let command = match &runner.run {
        RunTemplate::Args(template) => {
            let mut argv = vec![tool.program.clone()];
            argv.extend(resolve_args(template, &ctx).map_err(interpolation)?);
            CommandLine::Argv(argv)
        }
        RunTemplate::Shell(template) => {
            CommandLine::Shell(resolve_shell(template, &ctx).map_err(interpolation)?)
        }
    };
    let stdin = match &test.stdin_from_cmd {
        Some(source) => {
            StdinSource::FromCommand(resolve_shell(source, &ctx).map_err(interpolation)?)
        }
        None => StdinSource::Null,
    };

    Ok(PairPlan {
        tool: tool.name.clone(),
        test: test.name.clone(),
        tag: test.tag.clone(),
        prepare,
        run: Invocation {
            command,
            cwd,
            stdin,
        },
        cleanup,
        settings,
        stdout_is_timing: test.stdout_is_timing,
    })
}
