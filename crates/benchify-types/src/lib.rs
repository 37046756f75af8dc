//! Shared types for benchify.
//!
//! Design goal: versioned, explicit, boring.
//! The config structs mirror `benchify.toml`; the report structs are what a
//! session produces for presentation and what lands in the results directory.

use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

pub const CONFIG_VERSION_V1: u32 = 1;
pub const REPORT_SCHEMA_V1: &str = "benchify.report.v1";
pub const SAMPLES_SCHEMA_V1: &str = "benchify.samples.v1";

pub const DEFAULT_MIN_RUNS: u32 = 10;
pub const DEFAULT_MAX_RUNS: u32 = 1000;
pub const DEFAULT_RESULTS_DIR: &str = "./benchify-results/";

pub type Tag = String;

// ----------------------------
// Config file schema
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ConfigFile {
    pub benchify_version: u32,

    /// Every tag a test may use. Runner tags must come from this set too.
    pub tags: BTreeSet<Tag>,

    /// Run prepare/cleanup batches concurrently (default true).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_prep: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub warmup: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_runs: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_runs: Option<u32>,

    /// Baseline tool for comparisons. Defaults to the fastest tool per test.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_tool: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_dir: Option<String>,

    /// Per-invocation timeout, parseable by humantime, e.g. "30s".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Accept nonzero exit codes from the run phase as valid samples.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_nonzero: Option<bool>,

    /// Working directory for every invocation (default: inherited).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Number of (tool, test) pairs sampled concurrently (default 1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_level: Option<f64>,

    /// Relative half-width of the confidence interval below which sampling stops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability_threshold: Option<f64>,

    /// Failed/attempted ratio above which a pair is abandoned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_failure_ratio: Option<f64>,

    #[serde(default)]
    pub tools: Vec<ToolSpec>,

    #[serde(default)]
    pub tests: Vec<TestSpec>,
}

impl ConfigFile {
    pub fn min_runs(&self) -> u32 {
        self.min_runs.unwrap_or(DEFAULT_MIN_RUNS)
    }

    pub fn max_runs(&self) -> u32 {
        self.max_runs.unwrap_or(DEFAULT_MAX_RUNS)
    }

    pub fn parallel_prep(&self) -> bool {
        self.parallel_prep.unwrap_or(true)
    }

    pub fn allow_nonzero(&self) -> bool {
        self.allow_nonzero.unwrap_or(false)
    }

    pub fn jobs(&self) -> usize {
        self.jobs.unwrap_or(1).max(1)
    }

    pub fn results_dir(&self) -> PathBuf {
        PathBuf::from(
            self.results_dir
                .as_deref()
                .unwrap_or(DEFAULT_RESULTS_DIR),
        )
    }

    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ToolSpec {
    pub name: String,

    /// Executable launched for argv run templates and the existence check.
    pub program: String,

    /// Arguments for the existence check, e.g. `["--version"]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existence_confirmation: Option<Vec<String>>,

    #[serde(default)]
    pub install_instructions: String,

    #[serde(default)]
    pub runners: BTreeMap<Tag, RunnerSpec>,
}

/// The run phase of a runner: an argv handed to the tool's program, or a
/// shell command line. Exactly one, by construction.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunTemplate {
    Args(Vec<String>),
    Shell(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RunnerFile", into = "RunnerFile")]
pub struct RunnerSpec {
    pub prepare: Option<String>,
    pub run: RunTemplate,
    pub cleanup: Option<String>,
    pub warmup: Option<u32>,
    pub min_runs: Option<u32>,
    pub max_runs: Option<u32>,
    pub timeout: Option<String>,
}

/// On-disk shape of a runner. `run_args` and `run_cmd` are mutually exclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RunnerFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepare: Option<String>,

    /// argv appended to the tool's program (no shell parsing).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_args: Option<Vec<String>>,

    /// Shell command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_cmd: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub warmup: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_runs: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_runs: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunTemplateError {
    #[error("runner sets both run_args and run_cmd; exactly one is allowed")]
    Both,

    #[error("runner sets neither run_args nor run_cmd; exactly one is required")]
    Neither,
}

impl TryFrom<RunnerFile> for RunnerSpec {
    type Error = RunTemplateError;

    fn try_from(file: RunnerFile) -> Result<Self, Self::Error> {
        let run = match (file.run_args, file.run_cmd) {
            (Some(args), None) => RunTemplate::Args(args),
            (None, Some(cmd)) => RunTemplate::Shell(cmd),
            (Some(_), Some(_)) => return Err(RunTemplateError::Both),
            (None, None) => return Err(RunTemplateError::Neither),
        };
        Ok(RunnerSpec {
            prepare: file.prepare,
            run,
            cleanup: file.cleanup,
            warmup: file.warmup,
            min_runs: file.min_runs,
            max_runs: file.max_runs,
            timeout: file.timeout,
        })
    }
}

impl From<RunnerSpec> for RunnerFile {
    fn from(spec: RunnerSpec) -> Self {
        let (run_args, run_cmd) = match spec.run {
            RunTemplate::Args(args) => (Some(args), None),
            RunTemplate::Shell(cmd) => (None, Some(cmd)),
        };
        RunnerFile {
            prepare: spec.prepare,
            run_args,
            run_cmd,
            cleanup: spec.cleanup,
            warmup: spec.warmup,
            min_runs: spec.min_runs,
            max_runs: spec.max_runs,
            timeout: spec.timeout,
        }
    }
}

impl JsonSchema for RunnerSpec {
    fn schema_name() -> Cow<'static, str> {
        RunnerFile::schema_name()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        RunnerFile::json_schema(generator)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TestSpec {
    pub name: String,
    pub tag: Tag,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,

    /// Shell command whose stdout is piped into the run phase's stdin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin_from_cmd: Option<String>,

    /// The run phase prints its own timing (seconds) on stdout.
    #[serde(default)]
    pub stdout_is_timing: bool,
}

// ----------------------------
// Report schema
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct HostInfo {
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RunMeta {
    pub id: String,
    pub started_at: String,
    pub ended_at: String,
    pub host: HostInfo,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxRunsReached,
    StabilityReached,
    ToolUnavailable,
    FatalError,
    Cancelled,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    Measured,
    Skipped,
    Fatal,
    Cancelled,
}

/// Summary of successful samples, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Stats {
    pub count: u32,
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Relative {
    /// mean / main mean
    pub ratio: f64,

    /// (mean - main mean) / main mean
    pub pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PairReport {
    pub tool: String,
    pub status: PairStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,

    pub attempts: u32,
    pub failures: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative: Option<Relative>,

    /// Why the pair was skipped or abandoned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TestReport {
    pub name: String,
    pub tag: Tag,

    /// Tool every other tool in this test is compared against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_tool: Option<String>,

    pub pairs: Vec<PairReport>,
}

impl TestReport {
    pub fn pair(&self, tool: &str) -> Option<&PairReport> {
        self.pairs.iter().find(|p| p.tool == tool)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct UnavailableTool {
    pub name: String,
    pub detail: String,
    pub install_instructions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Report {
    pub schema: String,
    pub tool: ToolInfo,
    pub run: RunMeta,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub configured_main_tool: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable_tools: Vec<UnavailableTool>,

    pub tests: Vec<TestReport>,
}

impl Report {
    pub fn test(&self, name: &str) -> Option<&TestReport> {
        self.tests.iter().find(|t| t.name == name)
    }

    pub fn pair(&self, test: &str, tool: &str) -> Option<&PairReport> {
        self.test(test).and_then(|t| t.pair(tool))
    }

    /// True if any scheduled pair did not produce a measurement.
    pub fn has_problems(&self) -> bool {
        self.tests
            .iter()
            .flat_map(|t| &t.pairs)
            .any(|p| p.status != PairStatus::Measured)
    }
}

/// One raw sampling iteration (warmups are not recorded).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SampleRecord {
    pub test: String,
    pub tool: String,

    /// 1-based index among this pair's sampling attempts.
    pub iteration: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SamplesFile {
    pub schema: String,
    pub records: Vec<SampleRecord>,
}
