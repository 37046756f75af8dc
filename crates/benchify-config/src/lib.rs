//! Loading and validation of `benchify.toml`.
//!
//! Parsing already rejects structurally broken runners (both or neither run
//! variant). [`validate`] checks everything that needs the whole file, and
//! reports every problem it finds at once.

use benchify_error::ConfigError;
use benchify_types::{CONFIG_VERSION_V1, ConfigFile};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Commented starter config written by `benchify template`.
pub const TEMPLATE: &str = include_str!("template.toml");

pub fn parse_config(text: &str) -> Result<ConfigFile, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Read and parse a config file without validating it.
pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

/// Read, parse and validate.
pub fn load_validated(path: &Path) -> Result<ConfigFile, ConfigError> {
    let cfg = load_config(path)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Parse a humantime duration such as `"30s"` or `"1m 30s"`.
pub fn parse_timeout(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s).map_err(|e| format!("invalid timeout {s:?}: {e}"))
}

fn check_bounds(problems: &mut Vec<String>, ctx: &str, min: u32, max: u32) {
    if max == 0 {
        problems.push(format!("{ctx}: max_runs must be at least 1"));
    }
    if min > max {
        problems.push(format!(
            "{ctx}: min_runs ({min}) is greater than max_runs ({max})"
        ));
    }
}

fn check_timeout(problems: &mut Vec<String>, ctx: &str, timeout: Option<&str>) {
    if let Some(t) = timeout
        && let Err(e) = parse_timeout(t)
    {
        problems.push(format!("{ctx}: {e}"));
    }
}

/// Cross-field checks. Fails on the first version mismatch, otherwise
/// collects every problem into one [`ConfigError::Invalid`].
pub fn validate(cfg: &ConfigFile) -> Result<(), ConfigError> {
    if cfg.benchify_version != CONFIG_VERSION_V1 {
        return Err(ConfigError::UnsupportedVersion {
            found: cfg.benchify_version,
            expected: CONFIG_VERSION_V1,
        });
    }

    let mut problems = Vec::new();

    check_bounds(&mut problems, "config", cfg.min_runs(), cfg.max_runs());
    check_timeout(&mut problems, "config", cfg.timeout.as_deref());

    if cfg.jobs == Some(0) {
        problems.push("config: jobs must be at least 1".to_string());
    }
    if let Some(c) = cfg.confidence_level
        && !(c > 0.0 && c < 1.0)
    {
        problems.push(format!(
            "config: confidence_level must be in (0, 1), got {c}"
        ));
    }
    if let Some(t) = cfg.stability_threshold
        && !(t > 0.0 && t.is_finite())
    {
        problems.push(format!(
            "config: stability_threshold must be positive, got {t}"
        ));
    }
    if let Some(r) = cfg.max_failure_ratio
        && !(0.0..1.0).contains(&r)
    {
        problems.push(format!(
            "config: max_failure_ratio must be in [0, 1), got {r}"
        ));
    }

    let results_dir = cfg.results_dir();
    if results_dir.is_file() {
        problems.push(format!(
            "config: results_dir {} already exists as a file",
            results_dir.display()
        ));
    }

    if let Some(main) = &cfg.main_tool
        && cfg.tool(main).is_none()
    {
        problems.push(format!(
            "config: main_tool {main:?} is not one of the declared tools {:?}",
            cfg.tools.iter().map(|t| &t.name).collect::<Vec<_>>()
        ));
    }

    let mut tool_names = BTreeSet::new();
    for tool in &cfg.tools {
        if !tool_names.insert(tool.name.as_str()) {
            problems.push(format!("tool {:?} is declared more than once", tool.name));
        }
        if tool.program.trim().is_empty() {
            problems.push(format!("tool {:?}: program must not be empty", tool.name));
        }
        for (tag, runner) in &tool.runners {
            let ctx = format!("tool {:?} runner {tag:?}", tool.name);
            if !cfg.tags.contains(tag) {
                problems.push(format!(
                    "{ctx}: tag is not declared; expected one of {:?}",
                    cfg.tags
                ));
            }
            check_bounds(
                &mut problems,
                &ctx,
                runner.min_runs.unwrap_or(cfg.min_runs()),
                runner.max_runs.unwrap_or(cfg.max_runs()),
            );
            check_timeout(&mut problems, &ctx, runner.timeout.as_deref());
        }
    }

    let mut test_names = BTreeSet::new();
    for test in &cfg.tests {
        if !test_names.insert(test.name.as_str()) {
            problems.push(format!("test {:?} is declared more than once", test.name));
        }
        if !cfg.tags.contains(&test.tag) {
            problems.push(format!(
                "test {:?}: tag {:?} is not declared; expected one of {:?}",
                test.name, test.tag, cfg.tags
            ));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid { problems })
    }
}

/// Write [`TEMPLATE`] to `path`, refusing to overwrite anything.
pub fn write_template(path: &Path) -> Result<(), ConfigError> {
    use std::io::Write;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::AlreadyExists {
                ConfigError::AlreadyExists {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Write {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
    file.write_all(TEMPLATE.as_bytes())
        .map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
benchify_version = 1
tags = ["text"]

[[tools]]
name = "a"
program = "true"

[tools.runners.text]
run_cmd = "true"

[[tools]]
name = "b"
program = "true"

[tools.runners.text]
run_args = ["{FILE}"]

[[tests]]
name = "t1"
tag = "text"
file = "x"
"#;

    fn base() -> ConfigFile {
        parse_config(BASE).unwrap()
    }

    fn problems(cfg: &ConfigFile) -> Vec<String> {
        match validate(cfg) {
            Err(ConfigError::Invalid { problems }) => problems,
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn template_parses_and_validates() {
        let cfg = parse_config(TEMPLATE).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.main_tool.as_deref(), Some("gzip"));
        assert_eq!(cfg.tools.len(), 2);
    }

    #[test]
    fn base_config_is_valid() {
        validate(&base()).unwrap();
    }

    #[test]
    fn wrong_version_is_rejected_first() {
        let mut cfg = base();
        cfg.benchify_version = 2;
        cfg.min_runs = Some(50);
        cfg.max_runs = Some(5);
        assert!(matches!(
            validate(&cfg),
            Err(ConfigError::UnsupportedVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn all_problems_are_reported_together() {
        let mut cfg = base();
        cfg.jobs = Some(0);
        cfg.main_tool = Some("nope".into());
        cfg.tests[0].tag = "binary".into();
        cfg.timeout = Some("soon".into());

        let p = problems(&cfg);
        assert_eq!(p.len(), 4, "{p:#?}");
        assert!(p.iter().any(|m| m.contains("jobs")));
        assert!(p.iter().any(|m| m.contains("main_tool \"nope\"")));
        assert!(p.iter().any(|m| m.contains("tag \"binary\"")));
        assert!(p.iter().any(|m| m.contains("invalid timeout")));
    }

    #[test]
    fn global_bounds_are_reported_per_runner_too() {
        let mut cfg = base();
        cfg.min_runs = Some(20);
        cfg.max_runs = Some(5);
        let p = problems(&cfg);
        assert_eq!(p.len(), 3, "{p:#?}");
        assert!(p[0].starts_with("config: min_runs (20)"));
    }

    #[test]
    fn runner_bounds_use_effective_values() {
        let mut cfg = base();
        cfg.min_runs = Some(10);
        let runner = cfg.tools[0].runners.get_mut("text").unwrap();
        runner.max_runs = Some(3);
        let p = problems(&cfg);
        assert_eq!(p.len(), 1);
        assert!(p[0].contains("runner \"text\""), "{}", p[0]);

        // Lowering min_runs on the same runner fixes it.
        let runner = cfg.tools[0].runners.get_mut("text").unwrap();
        runner.min_runs = Some(2);
        validate(&cfg).unwrap();
    }

    #[test]
    fn undeclared_runner_tag_is_a_problem() {
        let src = BASE.replace("[tools.runners.text]\nrun_cmd", "[tools.runners.video]\nrun_cmd");
        let cfg = parse_config(&src).unwrap();
        let p = problems(&cfg);
        assert!(p.iter().any(|m| m.contains("runner \"video\"")), "{p:#?}");
    }

    #[test]
    fn duplicate_names_are_problems() {
        let mut cfg = base();
        cfg.tools[1].name = "a".into();
        cfg.tests.push(cfg.tests[0].clone());
        let p = problems(&cfg);
        assert!(p.iter().any(|m| m.contains("tool \"a\" is declared more than once")));
        assert!(p.iter().any(|m| m.contains("test \"t1\" is declared more than once")));
    }

    #[test]
    fn stopping_constants_are_range_checked() {
        let mut cfg = base();
        cfg.confidence_level = Some(1.0);
        cfg.stability_threshold = Some(0.0);
        cfg.max_failure_ratio = Some(1.0);
        assert_eq!(problems(&cfg).len(), 3);

        cfg.confidence_level = Some(0.99);
        cfg.stability_threshold = Some(0.05);
        cfg.max_failure_ratio = Some(0.0);
        validate(&cfg).unwrap();
    }

    #[test]
    fn missing_runner_is_not_a_config_error() {
        let mut cfg = base();
        cfg.tools[0].runners.clear();
        validate(&cfg).unwrap();
    }

    #[test]
    fn results_dir_that_is_a_file_is_rejected() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut cfg = base();
        cfg.results_dir = Some(tmp.path().display().to_string());
        let p = problems(&cfg);
        assert!(p[0].contains("already exists as a file"));
    }

    #[test]
    fn both_run_variants_fail_to_parse() {
        let src = BASE.replace("run_cmd = \"true\"", "run_cmd = \"true\"\nrun_args = []");
        assert!(matches!(parse_config(&src), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_reports_missing_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn template_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("benchify.toml");
        write_template(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), TEMPLATE);

        fs::write(&path, "keep me").unwrap();
        assert!(matches!(
            write_template(&path),
            Err(ConfigError::AlreadyExists { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn load_validated_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("benchify.toml");
        fs::write(&path, BASE).unwrap();
        let cfg = load_validated(&path).unwrap();
        assert_eq!(cfg.tests[0].name, "t1");
    }
}
