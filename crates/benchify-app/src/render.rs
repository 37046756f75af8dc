//! Markdown rendering of a finished report.

use benchify_types::{PairReport, PairStatus, Report, StopReason, TestReport};

pub fn render_markdown(report: &Report) -> String {
    let mut out = String::new();

    let header = if report.has_problems() {
        "⚠️ benchify: finished with problems"
    } else {
        "✅ benchify: all pairs measured"
    };
    out.push_str(header);
    out.push_str("\n\n");
    out.push_str(&format!(
        "**Run:** `{}` ({} to {}, {}/{})\n\n",
        report.run.id,
        report.run.started_at,
        report.run.ended_at,
        report.run.host.os,
        report.run.host.arch
    ));

    for test in &report.tests {
        out.push_str(&render_test_markdown(test));
        out.push('\n');
    }

    if !report.unavailable_tools.is_empty() {
        out.push_str("**Unavailable tools:**\n");
        for t in &report.unavailable_tools {
            out.push_str(&format!("- `{}`: {}", t.name, t.detail));
            if !t.install_instructions.is_empty() {
                out.push_str(&format!(" (install: {})", t.install_instructions));
            }
            out.push('\n');
        }
    }

    out
}

/// Table for a single test, also written as `summary_<test>.md`.
pub fn render_test_markdown(test: &TestReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("## {} (`{}`)\n\n", test.name, test.tag));
    out.push_str("| Tool | Mean (ms) ± StdDev (ms) | Ratio | Runs | Stop |\n");
    out.push_str("|---|---:|---:|---:|---|\n");

    for pair in &test.pairs {
        let is_main = test.main_tool.as_deref() == Some(pair.tool.as_str());
        let name = if is_main {
            format!("**{}**", pair.tool)
        } else {
            pair.tool.clone()
        };
        out.push_str(&format!(
            "| {name} | {mean} | {ratio} | {runs} | {stop} |\n",
            mean = format_mean(pair),
            ratio = format_ratio(pair),
            runs = format_runs(pair),
            stop = format_stop(pair),
        ));
    }

    let notes: Vec<&PairReport> = test.pairs.iter().filter(|p| p.reason.is_some()).collect();
    if !notes.is_empty() {
        out.push_str("\n**Notes:**\n");
        for p in notes {
            out.push_str(&format!(
                "- `{}`: {}\n",
                p.tool,
                p.reason.as_deref().unwrap_or_default()
            ));
        }
    }

    out
}

fn format_mean(pair: &PairReport) -> String {
    match &pair.stats {
        Some(s) => format!("{:.3} ± {:.3}", s.mean * 1e3, s.stddev * 1e3),
        None => "-".to_string(),
    }
}

fn format_ratio(pair: &PairReport) -> String {
    match pair.relative {
        Some(r) => format!("{:.3}", r.ratio),
        None => "-".to_string(),
    }
}

fn format_runs(pair: &PairReport) -> String {
    if pair.failures == 0 {
        pair.attempts.to_string()
    } else {
        format!("{} ({} failed)", pair.attempts, pair.failures)
    }
}

fn format_stop(pair: &PairReport) -> &'static str {
    match (pair.status, pair.stop_reason) {
        (PairStatus::Skipped, _) => "skipped",
        (_, Some(StopReason::StabilityReached)) => "stable",
        (_, Some(StopReason::MaxRunsReached)) => "max runs",
        (_, Some(StopReason::Cancelled)) => "cancelled",
        (_, Some(StopReason::ToolUnavailable)) => "unavailable",
        (_, Some(StopReason::FatalError)) | (_, None) => "FAIL",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchify_types::{
        HostInfo, REPORT_SCHEMA_V1, Relative, RunMeta, Stats, ToolInfo, UnavailableTool,
    };

    fn measured(tool: &str, mean: f64, ratio: f64) -> PairReport {
        PairReport {
            tool: tool.into(),
            status: PairStatus::Measured,
            stop_reason: Some(StopReason::StabilityReached),
            attempts: 10,
            failures: 0,
            stats: Some(Stats {
                count: 10,
                mean,
                stddev: 0.0005,
                min: mean,
                max: mean,
            }),
            relative: Some(Relative {
                ratio,
                pct: ratio - 1.0,
            }),
            reason: None,
        }
    }

    fn report(pairs: Vec<PairReport>) -> Report {
        Report {
            schema: REPORT_SCHEMA_V1.into(),
            tool: ToolInfo {
                name: "benchify".into(),
                version: "0.0.0".into(),
            },
            run: RunMeta {
                id: "run-1".into(),
                started_at: "2024-01-01T00:00:00Z".into(),
                ended_at: "2024-01-01T00:01:00Z".into(),
                host: HostInfo {
                    os: "linux".into(),
                    arch: "x86_64".into(),
                },
            },
            configured_main_tool: None,
            unavailable_tools: vec![],
            tests: vec![TestReport {
                name: "t1".into(),
                tag: "text".into(),
                main_tool: Some("gzip".into()),
                pairs,
            }],
        }
    }

    #[test]
    fn table_marks_main_tool_and_formats_milliseconds() {
        let md = render_markdown(&report(vec![
            measured("gzip", 0.0123456, 1.0),
            measured("xz", 0.0246912, 2.0),
        ]));
        assert!(md.starts_with("✅ benchify"));
        assert!(md.contains("## t1 (`text`)"));
        assert!(md.contains("| **gzip** | 12.346 ± 0.500 | 1.000 | 10 | stable |"), "{md}");
        assert!(md.contains("| xz | 24.691 ± 0.500 | 2.000 | 10 | stable |"), "{md}");
    }

    #[test]
    fn problems_show_in_header_notes_and_install_hints() {
        let mut r = report(vec![
            measured("gzip", 0.01, 1.0),
            PairReport {
                tool: "zstd".into(),
                status: PairStatus::Skipped,
                stop_reason: Some(StopReason::ToolUnavailable),
                attempts: 0,
                failures: 0,
                stats: None,
                relative: None,
                reason: Some("tool unavailable".into()),
            },
        ]);
        r.unavailable_tools.push(UnavailableTool {
            name: "zstd".into(),
            detail: "No such file or directory".into(),
            install_instructions: "apt install zstd".into(),
        });

        let md = render_markdown(&r);
        assert!(md.starts_with("⚠️ benchify"));
        assert!(md.contains("| zstd | - | - | 0 | skipped |"), "{md}");
        assert!(md.contains("- `zstd`: tool unavailable"));
        assert!(md.contains("(install: apt install zstd)"));
    }

    #[test]
    fn failed_attempts_are_counted() {
        let mut p = measured("gzip", 0.01, 1.0);
        p.attempts = 12;
        p.failures = 2;
        let md = render_test_markdown(&report(vec![p]).tests[0]);
        assert!(md.contains("| 12 (2 failed) |"), "{md}");
    }
}
