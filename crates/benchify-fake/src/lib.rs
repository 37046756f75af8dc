//! Fake process runner for exercising the benchify engine without spawning.
//!
//! Responses are scripted per command substring; every launch is logged so
//! tests can assert on ordering and counts.

use benchify_adapters::{
    AdapterError, CommandLine, LaunchSpec, ProcessRunner, RunResult, StdinSource,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a scripted launch returns.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeResponse {
    Exit {
        code: i32,
        wall: Duration,
        stdout: Vec<u8>,
    },
    /// Behaves as if the launch hit its timeout.
    TimedOut,
    /// The program cannot be started.
    LaunchFailure,
}

impl FakeResponse {
    /// Successful exit after `secs` of wall time.
    pub fn ok(secs: f64) -> Self {
        FakeResponse::Exit {
            code: 0,
            wall: Duration::from_secs_f64(secs),
            stdout: Vec::new(),
        }
    }

    pub fn exit(code: i32) -> Self {
        FakeResponse::Exit {
            code,
            wall: Duration::from_millis(1),
            stdout: Vec::new(),
        }
    }

    /// Successful exit printing `text` on stdout.
    pub fn stdout(text: &str) -> Self {
        FakeResponse::Exit {
            code: 0,
            wall: Duration::from_millis(1),
            stdout: text.as_bytes().to_vec(),
        }
    }
}

/// One call as the runner saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedLaunch {
    pub command: CommandLine,
    pub cwd: Option<PathBuf>,
    pub stdin: StdinSource,
    pub timeout: Option<Duration>,
    pub cancellable: bool,
}

impl RecordedLaunch {
    pub fn display(&self) -> String {
        self.command.display()
    }
}

type Script = Arc<dyn Fn(u32) -> FakeResponse + Send + Sync>;

struct Rule {
    pattern: String,
    script: Script,
    calls: u32,
}

#[derive(Default)]
struct State {
    rules: Vec<Rule>,
    log: Vec<RecordedLaunch>,
}

/// Scripted [`ProcessRunner`]. Clones share script and log.
///
/// The first rule whose pattern is a substring of the command line answers.
/// Unmatched commands succeed instantly.
#[derive(Clone, Default)]
pub struct FakeProcessRunner {
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for FakeProcessRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeProcessRunner").finish_non_exhaustive()
    }
}

impl FakeProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `response` for commands containing `pattern`.
    pub fn on(self, pattern: &str, response: FakeResponse) -> Self {
        self.on_fn(pattern, move |_| response.clone())
    }

    /// Answer from `responses` in order, repeating the last one.
    pub fn on_sequence(self, pattern: &str, responses: Vec<FakeResponse>) -> Self {
        self.on_fn(pattern, move |call| {
            let idx = (call as usize).min(responses.len().saturating_sub(1));
            responses
                .get(idx)
                .cloned()
                .unwrap_or_else(|| FakeResponse::ok(0.001))
        })
    }

    /// Answer with `script(n)` where `n` is the 0-based call count for this rule.
    pub fn on_fn<F>(self, pattern: &str, script: F) -> Self
    where
        F: Fn(u32) -> FakeResponse + Send + Sync + 'static,
    {
        self.lock().rules.push(Rule {
            pattern: pattern.to_string(),
            script: Arc::new(script),
            calls: 0,
        });
        self
    }

    pub fn launches(&self) -> Vec<RecordedLaunch> {
        self.lock().log.clone()
    }

    /// Command lines in launch order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().log.iter().map(RecordedLaunch::display).collect()
    }

    pub fn count_matching(&self, pattern: &str) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|l| l.display().contains(pattern))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not hide the log from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn run(&self, spec: &LaunchSpec) -> Result<RunResult, AdapterError> {
        if let CommandLine::Argv(argv) = &spec.command
            && argv.is_empty()
        {
            return Err(AdapterError::EmptyArgv);
        }

        let line = spec.command.display();
        let script = {
            let mut state = self.lock();
            state.log.push(RecordedLaunch {
                command: spec.command.clone(),
                cwd: spec.cwd.clone(),
                stdin: spec.stdin.clone(),
                timeout: spec.timeout,
                cancellable: spec.cancel.is_some(),
            });
            state
                .rules
                .iter_mut()
                .find(|r| line.contains(&r.pattern))
                .map(|r| {
                    let call = r.calls;
                    r.calls += 1;
                    (Arc::clone(&r.script), call)
                })
        };
        // Scripts run outside the lock so they may inspect the runner.
        let response = match script {
            Some((script, call)) => script(call),
            None => FakeResponse::ok(0.001),
        };

        if spec.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Ok(RunResult {
                wall: Duration::ZERO,
                exit_code: -1,
                timed_out: false,
                cancelled: true,
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
        }

        match response {
            FakeResponse::Exit { code, wall, stdout } => Ok(RunResult {
                wall,
                exit_code: code,
                timed_out: false,
                cancelled: false,
                stdout,
                stderr: Vec::new(),
            }),
            FakeResponse::TimedOut => Ok(RunResult {
                wall: spec.timeout.unwrap_or(Duration::from_secs(1)),
                exit_code: -1,
                timed_out: true,
                cancelled: false,
                stdout: Vec::new(),
                stderr: Vec::new(),
            }),
            FakeResponse::LaunchFailure => Err(AdapterError::Launch {
                program: match &spec.command {
                    CommandLine::Argv(argv) => argv[0].clone(),
                    CommandLine::Shell(_) => "sh".to_string(),
                },
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted launch failure"),
            }),
        }
    }
}
