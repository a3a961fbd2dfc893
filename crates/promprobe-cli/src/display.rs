//! Terminal display helpers for the CLI.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use promprobe_core::{
    Phase, Platform, ProgressCallback, ProgressEvent, TestConfig, TestType,
};
use promprobe_report::ReportFormat;
use std::sync::Mutex;
use std::time::Duration;

pub fn print_error(message: &str, use_colors: bool) {
    if use_colors {
        eprintln!("{} {}", "error:".red().bold(), message);
    } else {
        eprintln!("error: {message}");
    }
}

pub fn print_hint(message: &str, use_colors: bool) {
    if use_colors {
        eprintln!("{} {}", "hint:".cyan(), message);
    } else {
        eprintln!("hint: {message}");
    }
}

/// Shows the resolved configuration without executing anything.
pub fn print_dry_run(config: &TestConfig, selected: &[TestType], parallel: bool) {
    println!("Dry run mode - configuration:");
    println!("  Suite: {}", config.suite);
    println!("  Platform: {}", config.platform);
    println!("  Deployment mode: {}", config.deployment_mode);
    match &config.target.url {
        Some(url) => println!("  Target: {url} (connect-only)"),
        None => println!("  Target: provisioned by the harness"),
    }
    println!(
        "  Selected types: {}",
        selected
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "  Execution: {}",
        if parallel { "parallel" } else { "sequential" }
    );
    println!("  Global timeout: {}", config.global_timeout);
    println!("  Thresholds: {} entries", config.thresholds.len());
    println!("  Output dir: {}", config.output_dir.display());
}

pub fn print_status(healthy: bool, ready: bool, use_colors: bool) {
    let line = |label: &str, ok: bool| {
        if use_colors {
            let state = if ok { "ok".green() } else { "failing".red() };
            println!("{label}: {state}");
        } else {
            println!("{label}: {}", if ok { "ok" } else { "failing" });
        }
    };
    line("healthy", healthy);
    line("ready", ready);
}

/// Static capability listing for `promprobe info`.
pub fn print_info(use_colors: bool) {
    let header = |text: &str| {
        if use_colors {
            println!("{}", text.bold());
        } else {
            println!("{text}");
        }
    };

    header("Platforms:");
    for platform in Platform::all() {
        let mode = if platform.is_kubernetes() {
            "single-instance, multi-replica"
        } else {
            "single-instance"
        };
        println!("  {:<13} {mode}", platform.to_string());
    }

    println!();
    header("Test types (canonical order):");
    for test_type in TestType::all() {
        let class = if test_type.exclusive() {
            "exclusive"
        } else {
            "parallelizable"
        };
        println!("  {:<13} {class}", test_type.to_string());
    }

    println!();
    header("Report formats:");
    for format in ReportFormat::all() {
        println!("  {format}");
    }
}

/// Builds the progress callback: a spinner through the provisioning phases
/// and one line per executed test type.
pub fn progress_printer(use_colors: bool) -> ProgressCallback {
    let spinner: Mutex<Option<ProgressBar>> = Mutex::new(None);

    Box::new(move |event| {
        let mut guard = spinner.lock().unwrap();
        match event {
            ProgressEvent::PhaseChanged { phase } => {
                if let Some(bar) = guard.take() {
                    bar.finish_and_clear();
                }
                if matches!(phase, Phase::Deploying | Phase::Verifying | Phase::TearingDown) {
                    let bar = ProgressBar::new_spinner();
                    bar.set_style(
                        ProgressStyle::with_template("{spinner} {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                    );
                    bar.set_message(format!("{phase}..."));
                    bar.enable_steady_tick(Duration::from_millis(120));
                    *guard = Some(bar);
                }
            }
            ProgressEvent::TypeStarted { test_type } => {
                println!("running {test_type}...");
            }
            ProgressEvent::TypeCompleted {
                test_type,
                status,
                duration,
            } => {
                let line = format!("{test_type}: {status} ({}ms)", duration.as_millis());
                if use_colors {
                    use promprobe_core::TestStatus;
                    let colored_line = match status {
                        TestStatus::Passed => line.green(),
                        TestStatus::Failed | TestStatus::Error => line.red(),
                        TestStatus::Skipped => line.yellow(),
                    };
                    println!("{colored_line}");
                } else {
                    println!("{line}");
                }
            }
        }
    })
}
