//! Std adapters for benchify.
//!
//! In clean-arch terms: this is where we touch the world.

use anyhow::Context;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// How often a waiting launcher checks its deadline and cancel token.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// What to execute: an argument vector (no shell) or a shell command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    Argv(Vec<String>),
    Shell(String),
}

impl CommandLine {
    /// Short human-readable form for logs and error messages.
    pub fn display(&self) -> String {
        match self {
            CommandLine::Argv(argv) => argv.join(" "),
            CommandLine::Shell(cmd) => cmd.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StdinSource {
    #[default]
    Null,
    /// Shell command whose stdout becomes the child's stdin.
    FromCommand(String),
}

/// Session-wide cancellation flag, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything needed for one launch. Built fresh for every call.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub command: CommandLine,
    pub cwd: Option<PathBuf>,
    pub stdin: StdinSource,
    pub timeout: Option<Duration>,
    pub output_cap_bytes: usize,
    pub cancel: Option<CancelToken>,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub wall: Duration,
    pub exit_code: i32,
    pub timed_out: bool,
    pub cancelled: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && !self.cancelled
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("command argv must not be empty")]
    EmptyArgv,

    /// The program could not be started at all (not found, not executable).
    #[error("failed to launch {program:?}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub trait ProcessRunner {
    fn run(&self, spec: &LaunchSpec) -> Result<RunResult, AdapterError>;
}

#[derive(Debug, Default, Clone)]
pub struct StdProcessRunner;

impl ProcessRunner for StdProcessRunner {
    fn run(&self, spec: &LaunchSpec) -> Result<RunResult, AdapterError> {
        let (mut cmd, program) = build_command(&spec.command)?;

        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        isolate(&mut cmd);

        let mut feeder = match &spec.stdin {
            StdinSource::Null => {
                cmd.stdin(Stdio::null());
                None
            }
            StdinSource::FromCommand(source) => {
                let mut feeder = spawn_feeder(source, spec.cwd.as_ref())?;
                let out = feeder
                    .stdout
                    .take()
                    .context("stdin source stdout was not captured")?;
                cmd.stdin(Stdio::from(out));
                Some(feeder)
            }
        };
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        trace!(command = %spec.command.display(), "spawning");
        let result = run_child(cmd, program, spec);

        if let Some(feeder) = feeder.as_mut() {
            kill_tree(feeder.id());
            let _ = feeder.wait();
        }
        result
    }
}

fn build_command(line: &CommandLine) -> Result<(Command, String), AdapterError> {
    match line {
        CommandLine::Argv(argv) => {
            let (program, args) = argv.split_first().ok_or(AdapterError::EmptyArgv)?;
            let mut cmd = Command::new(program);
            cmd.args(args);
            Ok((cmd, program.clone()))
        }
        CommandLine::Shell(script) => Ok((shell(script), SHELL.to_string())),
    }
}

#[cfg(unix)]
const SHELL: &str = "sh";
#[cfg(not(unix))]
const SHELL: &str = "cmd";

fn shell(script: &str) -> Command {
    let mut cmd = Command::new(SHELL);
    if cfg!(unix) {
        cmd.arg("-c");
    } else {
        cmd.arg("/C");
    }
    cmd.arg(script);
    cmd
}

/// Put the child in its own process group so a kill reaches its descendants.
#[cfg(unix)]
fn isolate(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_tree(pid: u32) {
    // Negative pid addresses the whole process group.
    unsafe {
        libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
    }
}

/// Kill whatever is left in the group of an already reaped child.
#[cfg(unix)]
fn reap_group(pid: u32) {
    kill_tree(pid);
}

#[cfg(not(unix))]
fn reap_group(_pid: u32) {}

#[cfg(not(unix))]
fn kill_tree(pid: u32) {
    let _ = Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

fn spawn_feeder(source: &str, cwd: Option<&PathBuf>) -> Result<Child, AdapterError> {
    let mut cmd = shell(source);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    isolate(&mut cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    cmd.spawn().map_err(|source| AdapterError::Launch {
        program: SHELL.to_string(),
        source,
    })
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Termination {
    Exited,
    TimedOut,
    Cancelled,
}

fn run_child(mut cmd: Command, program: String, spec: &LaunchSpec) -> Result<RunResult, AdapterError> {
    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|source| AdapterError::Launch { program, source })?;
    // Release our copy of a piped stdin so the feeder sees the reader go away.
    drop(cmd);

    let pid = child.id();
    debug!(pid, command = %spec.command.display(), "spawned");

    let mut stdout = child.stdout.take().context("stdout was not captured")?;
    let mut stderr = child.stderr.take().context("stderr was not captured")?;
    let cap = spec.output_cap_bytes;
    let out_handle = thread::spawn(move || read_with_cap(&mut stdout, cap));
    let err_handle = thread::spawn(move || read_with_cap(&mut stderr, cap));

    // The waiter stamps the wall time as soon as the child is reaped, so the
    // poll interval below never inflates the measurement.
    let (tx, rx) = mpsc::channel();
    let waiter = thread::spawn(move || {
        let status = child.wait();
        let _ = tx.send((status, start.elapsed()));
    });

    let mut termination = Termination::Exited;
    let (status, wall) = loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(done) => break done,
            Err(RecvTimeoutError::Timeout) => {
                if termination != Termination::Exited {
                    continue;
                }
                if spec.timeout.is_some_and(|t| start.elapsed() >= t) {
                    termination = Termination::TimedOut;
                } else if spec.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                    termination = Termination::Cancelled;
                } else {
                    continue;
                }
                debug!(pid, ?termination, "killing process group");
                kill_tree(pid);
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(AdapterError::Other(anyhow::anyhow!(
                    "waiter for pid {pid} exited without a status"
                )));
            }
        }
    };
    let _ = waiter.join();
    // Background descendants would otherwise hold the output pipes open.
    reap_group(pid);

    let status = status
        .with_context(|| format!("failed to wait for pid {pid}"))
        .map_err(AdapterError::Other)?;

    let stdout = out_handle.join().unwrap_or_default();
    let stderr = err_handle.join().unwrap_or_default();

    Ok(RunResult {
        wall,
        exit_code: status.code().unwrap_or(-1),
        timed_out: termination == Termination::TimedOut,
        cancelled: termination == Termination::Cancelled,
        stdout,
        stderr,
    })
}

/// Drain `reader` to EOF, keeping at most `cap` bytes.
fn read_with_cap<R: Read>(reader: &mut R, cap: usize) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::new();
    let mut tmp = [0u8; 8192];

    loop {
        match reader.read(&mut tmp) {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() < cap {
                    let remaining = cap - buf.len();
                    let take = remaining.min(n);
                    buf.extend_from_slice(&tmp[..take]);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spec(command: CommandLine) -> LaunchSpec {
        LaunchSpec {
            command,
            cwd: None,
            stdin: StdinSource::Null,
            timeout: None,
            output_cap_bytes: 4096,
            cancel: None,
        }
    }

    fn argv(v: &[&str]) -> CommandLine {
        CommandLine::Argv(v.iter().map(|s| s.to_string()).collect())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn capped_read_keeps_a_prefix(
            bytes in proptest::collection::vec(any::<u8>(), 0..20_000),
            cap in 0usize..20_000
        ) {
            let mut cursor = std::io::Cursor::new(bytes.clone());
            let got = read_with_cap(&mut cursor, cap);
            prop_assert_eq!(got.len(), bytes.len().min(cap));
            prop_assert!(bytes.starts_with(&got));
            // Reader is always drained so the child never blocks on a full pipe.
            prop_assert_eq!(cursor.position() as usize, bytes.len());
        }
    }

    #[test]
    fn empty_argv_returns_error() {
        let result = StdProcessRunner.run(&spec(CommandLine::Argv(vec![])));
        assert!(matches!(result, Err(AdapterError::EmptyArgv)));
    }

    #[test]
    fn missing_program_is_a_launch_error() {
        let result = StdProcessRunner.run(&spec(argv(&["benchify-definitely-not-a-program"])));
        match result {
            Err(AdapterError::Launch { program, .. }) => {
                assert_eq!(program, "benchify-definitely-not-a-program")
            }
            other => panic!("expected launch error, got {other:?}"),
        }
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        #[test]
        fn argv_command_captures_stdout() {
            let res = StdProcessRunner.run(&spec(argv(&["echo", "hello"]))).unwrap();
            assert!(res.success());
            assert_eq!(res.stdout, b"hello\n");
        }

        #[test]
        fn shell_command_reports_exit_code() {
            let res = StdProcessRunner
                .run(&spec(CommandLine::Shell("echo oops >&2; exit 3".into())))
                .unwrap();
            assert_eq!(res.exit_code, 3);
            assert!(!res.success());
            assert_eq!(res.stderr, b"oops\n");
        }

        #[test]
        fn shell_not_found_is_an_exit_code_not_a_launch_error() {
            let res = StdProcessRunner
                .run(&spec(CommandLine::Shell("benchify-definitely-not-a-program".into())))
                .unwrap();
            assert_eq!(res.exit_code, 127);
        }

        #[test]
        fn stdin_is_piped_from_source_command() {
            let mut s = spec(argv(&["cat"]));
            s.stdin = StdinSource::FromCommand("printf 'a\\nb\\n'".into());
            let res = StdProcessRunner.run(&s).unwrap();
            assert!(res.success());
            assert_eq!(res.stdout, b"a\nb\n");
        }

        #[test]
        fn working_directory_is_respected() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
            let mut s = spec(argv(&["cat", "marker.txt"]));
            s.cwd = Some(dir.path().to_path_buf());
            let res = StdProcessRunner.run(&s).unwrap();
            assert_eq!(res.stdout, b"here");
        }

        #[test]
        fn timeout_kills_long_running_command() {
            let mut s = spec(argv(&["sleep", "10"]));
            s.timeout = Some(Duration::from_millis(100));

            let start = Instant::now();
            let res = StdProcessRunner.run(&s).unwrap();
            assert!(res.timed_out);
            assert!(!res.success());
            assert!(start.elapsed() < Duration::from_secs(5));
        }

        #[test]
        fn timeout_reaches_grandchildren() {
            // The shell's child inherits the pipes; only a group kill lets the
            // readers reach EOF.
            let mut s = spec(CommandLine::Shell("sleep 10; echo done".into()));
            s.timeout = Some(Duration::from_millis(100));

            let start = Instant::now();
            let res = StdProcessRunner.run(&s).unwrap();
            assert!(res.timed_out);
            assert!(res.stdout.is_empty());
            assert!(start.elapsed() < Duration::from_secs(5));
        }

        #[test]
        fn background_descendant_does_not_outlive_the_shell() {
            let mut s = spec(CommandLine::Shell("sleep 3 & echo hi".into()));
            s.timeout = Some(Duration::from_millis(200));

            let start = Instant::now();
            let res = StdProcessRunner.run(&s).unwrap();
            assert!(start.elapsed() < Duration::from_secs(1), "{:?}", start.elapsed());
            assert!(!res.timed_out);
            assert_eq!(res.exit_code, 0);
            assert_eq!(String::from_utf8_lossy(&res.stdout).trim(), "hi");
        }

        #[test]
        fn cancelled_token_kills_command() {
            let token = CancelToken::new();
            let mut s = spec(argv(&["sleep", "10"]));
            s.cancel = Some(token.clone());
            let canceller = {
                let token = token.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(100));
                    token.cancel();
                })
            };

            let start = Instant::now();
            let res = StdProcessRunner.run(&s).unwrap();
            canceller.join().unwrap();
            assert!(res.cancelled);
            assert!(!res.timed_out);
            assert!(start.elapsed() < Duration::from_secs(5));
        }

        #[test]
        fn output_is_capped() {
            let mut s = spec(CommandLine::Shell("yes | head -c 100000".into()));
            s.output_cap_bytes = 10;
            let res = StdProcessRunner.run(&s).unwrap();
            assert_eq!(res.stdout.len(), 10);
        }

        #[test]
        fn wall_time_tracks_duration() {
            let res = StdProcessRunner.run(&spec(argv(&["sleep", "0.2"]))).unwrap();
            assert!(res.wall >= Duration::from_millis(200), "{:?}", res.wall);
            assert!(res.wall < Duration::from_secs(5));
        }
    }
}
