//! Existence checks for the configured tools.

use benchify_adapters::{CommandLine, LaunchSpec, ProcessRunner, StdinSource};
use benchify_error::ToolUnavailable;
use benchify_types::ToolSpec;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound for one existence confirmation.
pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Which tools could not be launched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Availability {
    unavailable: BTreeMap<String, ToolUnavailable>,
}

impl Availability {
    pub fn is_available(&self, tool: &str) -> bool {
        !self.unavailable.contains_key(tool)
    }

    pub fn reason(&self, tool: &str) -> Option<&ToolUnavailable> {
        self.unavailable.get(tool)
    }

    pub fn unavailable(&self) -> impl Iterator<Item = &ToolUnavailable> {
        self.unavailable.values()
    }
}

fn confirmation_spec(tool: &ToolSpec, cwd: Option<&Path>) -> LaunchSpec {
    let mut argv = vec![tool.program.clone()];
    argv.extend(tool.existence_confirmation.iter().flatten().cloned());
    LaunchSpec {
        command: CommandLine::Argv(argv),
        cwd: cwd.map(Path::to_path_buf),
        stdin: StdinSource::Null,
        timeout: Some(CONFIRMATION_TIMEOUT),
        output_cap_bytes: 1024,
        cancel: None,
    }
}

/// Launch every tool's confirmation command once, concurrently.
///
/// Only a failure to launch makes a tool unavailable; a non-zero exit or a
/// timeout still proves the program exists.
pub fn check_tools<R: ProcessRunner + Sync>(
    runner: &R,
    tools: &[ToolSpec],
    cwd: Option<&Path>,
) -> Availability {
    let unavailable = tools
        .par_iter()
        .filter_map(|tool| {
            let spec = confirmation_spec(tool, cwd);
            match runner.run(&spec) {
                Ok(res) => {
                    debug!(
                        tool = %tool.name,
                        exit_code = res.exit_code,
                        timed_out = res.timed_out,
                        "tool available"
                    );
                    None
                }
                Err(err) => {
                    warn!(
                        tool = %tool.name,
                        install = %tool.install_instructions,
                        "tool unavailable: {err}"
                    );
                    Some((
                        tool.name.clone(),
                        ToolUnavailable {
                            tool: tool.name.clone(),
                            detail: err.to_string(),
                            install_instructions: tool.install_instructions.clone(),
                        },
                    ))
                }
            }
        })
        .collect();
    Availability { unavailable }
}
