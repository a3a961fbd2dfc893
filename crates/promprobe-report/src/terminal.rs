//! Terminal summary output.
//!
//! Printed at the end of every run regardless of how it ended; partial
//! data is strictly better than none for a test report.

use colored::Colorize;
use promprobe_core::{SuiteResult, TestStatus};

/// Prints the summary table: counts by status and the overall verdict.
pub fn print_summary(suite: &SuiteResult, use_colors: bool) {
    let overall = suite.aggregate_status();

    println!();
    if use_colors {
        println!("{}", format!("Suite: {}", suite.suite).bold());
    } else {
        println!("Suite: {}", suite.suite);
    }
    println!("{}", "─".repeat(40));

    for result in &suite.results {
        let glyph = status_glyph(result.status);
        let line = format!(
            "{glyph} {:<12} {:>8}  {}ms",
            result.test_type.to_string(),
            result.status.to_string(),
            result.duration.as_millis(),
        );
        if use_colors {
            println!("{}", colorize_line(&line, result.status));
        } else {
            println!("{line}");
        }
    }

    if let Some(error) = &suite.error {
        if use_colors {
            println!("{} {}", "suite error:".red().bold(), error);
        } else {
            println!("suite error: {error}");
        }
    }

    println!("{}", "─".repeat(40));
    let counts = format!(
        "total: {}  passed: {}  failed: {}  skipped: {}  errors: {}",
        suite.total_count(),
        suite.count(TestStatus::Passed),
        suite.count(TestStatus::Failed),
        suite.count(TestStatus::Skipped),
        suite.count(TestStatus::Error),
    );
    println!("{counts}");

    let verdict = format!("overall: {overall} ({}s)", suite.duration.as_secs());
    if use_colors {
        println!("{}", colorize_line(&verdict, overall).bold());
    } else {
        println!("{verdict}");
    }
}

/// Prints failed and errored results in detail.
pub fn print_failures(suite: &SuiteResult, use_colors: bool) {
    let failures = suite.failures();
    if failures.is_empty() {
        return;
    }

    println!();
    if use_colors {
        println!("{}", "Failures:".red().bold());
    } else {
        println!("Failures:");
    }

    for result in failures {
        println!("  {} ({})", result.test_type, result.status);
        for error in &result.errors {
            println!("    - {error}");
        }
    }
}

fn status_glyph(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Passed => "✓",
        TestStatus::Failed => "✗",
        TestStatus::Skipped => "-",
        TestStatus::Error => "!",
    }
}

fn colorize_line(line: &str, status: TestStatus) -> colored::ColoredString {
    match status {
        TestStatus::Passed => line.green(),
        TestStatus::Failed => line.red(),
        TestStatus::Skipped => line.yellow(),
        TestStatus::Error => line.red(),
    }
}
