//! Unified error taxonomy for benchify.
//!
//! Only [`ConfigError`] is fatal to a session. Everything else is scoped to a
//! single tool or (tool, test) pair and ends up in the report as a reason.

use std::path::PathBuf;

/// Problems with the configuration file. Aborts before any execution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config schema version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("invalid config:\n  - {}", problems.join("\n  - "))]
    Invalid { problems: Vec<String> },

    #[error("{} already exists; refusing to overwrite", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("could not write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A required marker had no value in the interpolation context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpolationError {
    #[error("marker {marker} has no value for test {test:?}")]
    MissingValue { marker: &'static str, test: String },
}

/// Reasons a (tool, test) pair cannot be planned. The pair is skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("tool {tool:?} has no runner for tag {tag:?}")]
    NoRunnerForTag { tool: String, tag: String },

    #[error("cannot build invocations for tool {tool:?}: {source}")]
    Interpolation {
        tool: String,
        #[source]
        source: InterpolationError,
    },

    #[error("invalid settings for tool {tool:?}: {detail}")]
    InvalidSettings { tool: String, detail: String },
}

/// A tool whose existence confirmation could not be launched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("tool {tool:?} is unavailable ({detail}); install instructions: {install_instructions}")]
pub struct ToolUnavailable {
    pub tool: String,
    pub detail: String,
    pub install_instructions: String,
}

/// Why a single phase invocation did not yield a usable result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhaseFailure {
    #[error("{phase} could not be launched: {detail}")]
    Launch { phase: &'static str, detail: String },

    #[error("{phase} exited with status {code}")]
    NonZeroExit { phase: &'static str, code: i32 },

    #[error("{phase} timed out")]
    TimedOut { phase: &'static str },

    #[error("{phase} was cancelled")]
    Cancelled { phase: &'static str },

    #[error("run output {output:?} is not a timing in seconds")]
    BadTimingOutput { output: String },
}

impl PhaseFailure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PhaseFailure::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_lists_every_problem() {
        let err = ConfigError::Invalid {
            problems: vec!["min_runs > max_runs".into(), "unknown tag x".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("min_runs > max_runs"));
        assert!(msg.contains("unknown tag x"));
    }

    #[test]
    fn plan_error_names_tool_and_tag() {
        let err = PlanError::NoRunnerForTag {
            tool: "gzip".into(),
            tag: "text".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("gzip") && msg.contains("text"), "{msg}");
    }

    #[test]
    fn interpolation_error_is_source_of_plan_error() {
        use std::error::Error;
        let err = PlanError::Interpolation {
            tool: "t".into(),
            source: InterpolationError::MissingValue {
                marker: "{FILE}",
                test: "small".into(),
            },
        };
        let source = err.source().expect("source");
        assert!(source.to_string().contains("{FILE}"));
    }

    #[test]
    fn unavailable_tool_keeps_install_instructions() {
        let err = ToolUnavailable {
            tool: "zstd".into(),
            detail: "not found".into(),
            install_instructions: "apt install zstd".into(),
        };
        assert!(err.to_string().contains("apt install zstd"));
    }

    #[test]
    fn only_cancelled_failure_reports_cancelled() {
        assert!(PhaseFailure::Cancelled { phase: "run" }.is_cancelled());
        assert!(!PhaseFailure::TimedOut { phase: "run" }.is_cancelled());
    }
}
