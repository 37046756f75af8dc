use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use schemars::schema_for;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "xtask", about = "Repo automation for benchify")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// (Re)generate JSON Schemas for the config, report and samples files.
    Schema {
        /// Output directory
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,

        /// Fail if the files on disk differ instead of rewriting them
        #[arg(long, default_value_t = false)]
        check: bool,
    },

    /// Lint, test, and check that committed artifacts match the code.
    Ci {
        /// Also build the cargo-fuzz targets (needs the fuzz crate's deps)
        #[arg(long, default_value_t = false)]
        fuzz: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Schema { out_dir, check } => cmd_schema(&out_dir, check),
        Command::Ci { fuzz } => cmd_ci(fuzz),
    }
}

/// `cargo` invocations of a CI run, in order.
const CARGO_STEPS: &[(&str, &[&str])] = &[
    ("format", &["fmt", "--all", "--", "--check"]),
    (
        "lint",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    ),
    // Includes the cucumber scenarios hosted by the root package.
    ("tests", &["test", "--workspace"]),
];

fn cmd_ci(fuzz: bool) -> anyhow::Result<()> {
    for (step, args) in CARGO_STEPS {
        eprintln!("xtask ci: {step}");
        cargo(args)?;
    }

    eprintln!("xtask ci: starter template");
    check_template()?;

    eprintln!("xtask ci: schemas");
    cmd_schema(Path::new("schemas"), true)?;

    if fuzz {
        // fuzz/ is outside the workspace and has its own lockfile.
        eprintln!("xtask ci: fuzz targets");
        cargo(&["build", "--manifest-path", "fuzz/Cargo.toml", "--bins"])?;
    }
    Ok(())
}

/// `benchify template` writes this text verbatim; it has to stay a valid config.
fn check_template() -> anyhow::Result<()> {
    let cfg = benchify_config::parse_config(benchify_config::TEMPLATE)
        .context("starter template does not parse")?;
    benchify_config::validate(&cfg).context("starter template does not validate")?;
    Ok(())
}

fn cargo(args: &[&str]) -> anyhow::Result<()> {
    let status = std::process::Command::new("cargo")
        .args(args)
        .status()
        .with_context(|| format!("running cargo {}", args.join(" ")))?;
    if !status.success() {
        bail!("cargo {} failed: {status}", args.join(" "));
    }
    Ok(())
}

fn cmd_schema(out_dir: &Path, check: bool) -> anyhow::Result<()> {
    let schemas = [
        (
            "benchify.config.v1.schema.json".to_string(),
            serde_json::to_vec_pretty(&schema_for!(benchify_types::ConfigFile))?,
        ),
        (
            format!("{}.schema.json", benchify_types::REPORT_SCHEMA_V1),
            serde_json::to_vec_pretty(&schema_for!(benchify_types::Report))?,
        ),
        (
            format!("{}.schema.json", benchify_types::SAMPLES_SCHEMA_V1),
            serde_json::to_vec_pretty(&schema_for!(benchify_types::SamplesFile))?,
        ),
    ];

    if check {
        let stale: Vec<&str> = schemas
            .iter()
            .filter(|(name, json)| {
                fs::read(out_dir.join(name)).ok().as_deref() != Some(json.as_slice())
            })
            .map(|(name, _)| name.as_str())
            .collect();
        if !stale.is_empty() {
            bail!(
                "schemas out of date in {}: {} (run `cargo run -p xtask -- schema`)",
                out_dir.display(),
                stale.join(", ")
            );
        }
        return Ok(());
    }

    fs::create_dir_all(out_dir).with_context(|| format!("create dir {}", out_dir.display()))?;
    for (name, json) in &schemas {
        let path = out_dir.join(name);
        fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    }
    Ok(())
}
