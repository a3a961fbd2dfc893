//! Renderers over an immutable suite result.

use crate::ReportError;
use promprobe_core::{Direction, SuiteResult, VerdictOutcome};

/// Structured JSON, the regeneration input. Stable field order and
/// formatting so re-rendering a loaded report is byte-identical.
pub(crate) fn to_json(suite: &SuiteResult) -> Result<String, ReportError> {
    let mut out = serde_json::to_string_pretty(suite)?;
    out.push('\n');
    Ok(out)
}

/// Tabular CSV: one row per metric verdict, plus one row per verdict-less
/// result so every test type appears.
pub(crate) fn to_csv(suite: &SuiteResult) -> Result<String, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "suite",
        "test_type",
        "status",
        "duration_ms",
        "metric",
        "observed",
        "threshold",
        "direction",
        "verdict",
    ])?;

    for result in &suite.results {
        let duration_ms = result.duration.as_millis().to_string();
        if result.verdicts.is_empty() {
            writer.write_record([
                suite.suite.clone(),
                result.test_type.to_string(),
                result.status.to_string(),
                duration_ms.clone(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
            ])?;
            continue;
        }

        for verdict in &result.verdicts {
            writer.write_record([
                suite.suite.clone(),
                result.test_type.to_string(),
                result.status.to_string(),
                duration_ms.clone(),
                verdict.metric.clone(),
                verdict.observed.to_string(),
                verdict.threshold.map(|t| t.to_string()).unwrap_or_default(),
                verdict.direction.map(direction_str).unwrap_or_default(),
                verdict_str(verdict.outcome).to_string(),
            ])?;
        }
    }

    let bytes = writer.into_inner().map_err(|err| {
        ReportError::Csv(csv::Error::from(std::io::Error::other(err.to_string())))
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Human-readable markdown narrative.
pub(crate) fn to_markdown(suite: &SuiteResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Test Report: {}\n\n", suite.suite));
    out.push_str(&format!(
        "- Started: {}\n- Duration: {}s\n- Overall: **{}**\n\n",
        suite.started_at.to_rfc3339(),
        suite.duration.as_secs(),
        suite.aggregate_status(),
    ));

    if let Some(error) = &suite.error {
        out.push_str(&format!("> Suite error: {error}\n\n"));
    }

    out.push_str("| Test | Status | Duration | Metrics |\n");
    out.push_str("|------|--------|----------|---------|\n");
    for result in &suite.results {
        out.push_str(&format!(
            "| {} | {} | {}ms | {} |\n",
            result.test_type,
            result.status,
            result.duration.as_millis(),
            result.verdicts.len(),
        ));
    }
    out.push('\n');

    for result in &suite.results {
        out.push_str(&format!("## {} — {}\n\n", result.test_type, result.status));

        if !result.verdicts.is_empty() {
            out.push_str("| Metric | Observed | Threshold | Verdict |\n");
            out.push_str("|--------|----------|-----------|---------|\n");
            for verdict in &result.verdicts {
                out.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    verdict.metric,
                    verdict.observed,
                    verdict
                        .threshold
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "—".to_string()),
                    verdict_str(verdict.outcome),
                ));
            }
            out.push('\n');
        }

        if !result.errors.is_empty() {
            out.push_str("Errors:\n\n");
            for error in &result.errors {
                out.push_str(&format!("- {error}\n"));
            }
            out.push('\n');
        }
    }

    out
}

/// Styled HTML document with embedded CSS.
pub(crate) fn to_html(suite: &SuiteResult) -> String {
    let mut rows = String::new();
    for result in &suite.results {
        rows.push_str(&format!(
            "      <tr class=\"{status}\"><td>{name}</td><td>{status}</td><td>{ms}ms</td><td>{errors}</td></tr>\n",
            status = result.status,
            name = result.test_type,
            ms = result.duration.as_millis(),
            errors = escape(&result.errors.join("; ")),
        ));
    }

    let error_banner = suite
        .error
        .as_ref()
        .map(|error| format!("    <p class=\"banner\">{}</p>\n", escape(error)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Test Report: {suite}</title>
  <style>
    body {{ font-family: sans-serif; margin: 2rem; color: #24292f; }}
    h1 {{ border-bottom: 2px solid #d0d7de; padding-bottom: .3rem; }}
    table {{ border-collapse: collapse; margin-top: 1rem; }}
    th, td {{ border: 1px solid #d0d7de; padding: .4rem .8rem; text-align: left; }}
    tr.passed td {{ background: #dafbe1; }}
    tr.failed td, tr.error td {{ background: #ffebe9; }}
    tr.skipped td {{ background: #fff8c5; }}
    .banner {{ background: #ffebe9; padding: .6rem; border-radius: 4px; }}
  </style>
</head>
<body>
  <h1>Test Report: {suite}</h1>
  <p>Started {started} · Duration {secs}s · Overall <strong>{overall}</strong></p>
{error_banner}  <table>
    <thead>
      <tr><th>Test</th><th>Status</th><th>Duration</th><th>Errors</th></tr>
    </thead>
    <tbody>
{rows}    </tbody>
  </table>
</body>
</html>
"#,
        suite = escape(&suite.suite),
        started = suite.started_at.to_rfc3339(),
        secs = suite.duration.as_secs(),
        overall = suite.aggregate_status(),
    )
}

fn verdict_str(outcome: VerdictOutcome) -> &'static str {
    match outcome {
        VerdictOutcome::Passed => "passed",
        VerdictOutcome::Failed => "failed",
        VerdictOutcome::Skipped => "skipped",
    }
}

fn direction_str(direction: Direction) -> String {
    match direction {
        Direction::UpperBound => "upper-bound".to_string(),
        Direction::LowerBound => "lower-bound".to_string(),
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
