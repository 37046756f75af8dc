mod progress;

use anyhow::Context;
use benchify_adapters::{CancelToken, StdProcessRunner};
use benchify_app::{
    BenchSessionUseCase, ScheduleOrder, SessionRequest, SystemClock, render_markdown,
    render_test_markdown,
};
use benchify_config::{load_validated, write_template};
use benchify_types::{SAMPLES_SCHEMA_V1, SamplesFile, ToolInfo};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::progress::{SuspendedStderr, TerminalProgress};

const DEFAULT_CONFIG: &str = "benchify.toml";

#[derive(Debug, Parser)]
#[command(
    name = "benchify",
    version,
    about = "Declarative benchmarks comparing command-line tools"
)]
struct Cli {
    /// More log output (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors; no progress bars
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every (test, tool) pair of a config and write the results.
    Run {
        /// Config file
        #[arg(default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Pairs sampled concurrently (overrides `jobs` in the config)
        #[arg(long)]
        jobs: Option<usize>,

        /// Output directory (overrides `results_dir` in the config)
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Sample pairs in reverse declaration order
        #[arg(long, default_value_t = false)]
        reverse_order: bool,

        /// Exit 2 if any pair was skipped, failed or cancelled
        #[arg(long, default_value_t = false)]
        fail_on_error: bool,

        /// Print the summary without writing result files
        #[arg(long, default_value_t = false)]
        no_write: bool,
    },

    /// Load and validate a config without running anything.
    Validate {
        #[arg(default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },

    /// Write a commented starter config.
    Template {
        #[arg(default_value = DEFAULT_CONFIG)]
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    match real_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool, writer: SuspendedStderr) {
    let default = match (quiet, verbose) {
        (true, _) => "benchify=warn",
        (false, 0) => "benchify=info",
        (false, 1) => "benchify=debug",
        (false, _) => "benchify=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(move || writer.clone())
        .with_target(false)
        .init();
}

fn real_main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let progress = TerminalProgress::new(cli.quiet);
    init_tracing(cli.verbose, cli.quiet, progress.log_writer());

    match cli.cmd {
        Command::Run {
            config,
            jobs,
            results_dir,
            reverse_order,
            fail_on_error,
            no_write,
        } => {
            let cfg = load_validated(&config)
                .with_context(|| format!("load config {}", config.display()))?;
            let results_dir = results_dir.unwrap_or_else(|| cfg.results_dir());

            let cancel = CancelToken::new();
            let handler_token = cancel.clone();
            ctrlc::set_handler(move || {
                warn!("interrupted; stopping after in-flight invocations");
                handler_token.cancel();
            })
            .context("install Ctrl-C handler")?;

            let usecase = BenchSessionUseCase::new(StdProcessRunner, SystemClock, tool_info())
                .with_progress(progress);
            let outcome = usecase.execute(SessionRequest {
                config: cfg,
                jobs,
                order: if reverse_order {
                    ScheduleOrder::Reversed
                } else {
                    ScheduleOrder::Declared
                },
                cancel,
            })?;

            let summary = render_markdown(&outcome.report);
            if !no_write {
                write_json(&results_dir.join("report.json"), &outcome.report)?;
                write_json(
                    &results_dir.join("samples.json"),
                    &SamplesFile {
                        schema: SAMPLES_SCHEMA_V1.to_string(),
                        records: outcome.records,
                    },
                )?;
                atomic_write(&results_dir.join("summary.md"), summary.as_bytes())?;
                for test in &outcome.report.tests {
                    let name = format!("summary_{}.md", file_stem(&test.name));
                    atomic_write(
                        &results_dir.join(name),
                        render_test_markdown(test).as_bytes(),
                    )?;
                }
                info!(dir = %results_dir.display(), "results written");
            }
            print!("{summary}");

            if fail_on_error && outcome.report.has_problems() {
                return Ok(ExitCode::from(2));
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Validate { config } => {
            let cfg = load_validated(&config)
                .with_context(|| format!("load config {}", config.display()))?;
            println!(
                "{}: ok ({} tools, {} tests)",
                config.display(),
                cfg.tools.len(),
                cfg.tests.len()
            );
            Ok(ExitCode::SUCCESS)
        }

        Command::Template { path } => {
            write_template(&path)?;
            println!("wrote {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "benchify".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// Test names become file names; keep them on one path component.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &bytes)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    use std::io::Write;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let mut tmp = parent.to_path_buf();
    tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4()));

    {
        let mut f =
            fs::File::create(&tmp).with_context(|| format!("create temp {}", tmp.display()))?;
        f.write_all(bytes)
            .with_context(|| format!("write temp {}", tmp.display()))?;
        f.sync_all().ok();
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults_to_benchify_toml() {
        let cli = Cli::try_parse_from(["benchify", "run"]).unwrap();
        match cli.cmd {
            Command::Run {
                config,
                jobs,
                reverse_order,
                ..
            } => {
                assert_eq!(config, PathBuf::from(DEFAULT_CONFIG));
                assert_eq!(jobs, None);
                assert!(!reverse_order);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn file_stem_flattens_separators() {
        assert_eq!(file_stem("big/file:1"), "big_file_1");
        assert_eq!(file_stem("plain"), "plain");
    }

    #[test]
    fn atomic_write_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        write_json(&path, &serde_json::json!({"ok": true})).unwrap();
        assert!(path.exists());
        let leftovers = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .count();
        assert_eq!(leftovers, 0);
    }
}
