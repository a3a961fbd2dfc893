//! # promprobe-cli
//!
//! Binary entry point for the Promprobe harness.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - The `run` command driving the full orchestration state machine
//! - Report regeneration via `promprobe report`
//! - Resource cleanup via `promprobe cleanup`
//! - Target health checks via `promprobe status`
//! - Capability listing via `promprobe info`

mod display;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use promprobe_core::{
    CliOverrides, ConfigError, DeploymentMode, Platform, RunOptions, Runner, TestConfig, TestType,
};
use promprobe_client::PromClient;
use promprobe_deploy::deployer_for;
use promprobe_report::{ReportFormat, ReportWriter, print_failures, print_summary};
use std::io::{IsTerminal, stdout};
use std::path::PathBuf;
use tracing::{info, warn};

/// Exit code for configuration errors, per the CLI contract.
const EXIT_CONFIG: i32 = 2;

/// Color output mode for terminal display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    /// Automatically detect if stdout is a TTY
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    /// Returns true if colors should be used based on mode and terminal detection.
    fn should_use_colors(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => stdout().is_terminal(),
        }
    }
}

/// Platform selection on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlatformArg {
    LocalBinary,
    Container,
    Eks,
    Gke,
    Aks,
    Openshift,
}

impl PlatformArg {
    fn to_lib(self) -> Platform {
        match self {
            PlatformArg::LocalBinary => Platform::LocalBinary,
            PlatformArg::Container => Platform::Container,
            PlatformArg::Eks => Platform::Eks,
            PlatformArg::Gke => Platform::Gke,
            PlatformArg::Aks => Platform::Aks,
            PlatformArg::Openshift => Platform::OpenShift,
        }
    }
}

/// Deployment mode selection on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    SingleInstance,
    MultiReplica,
}

impl ModeArg {
    fn to_lib(self) -> DeploymentMode {
        match self {
            ModeArg::SingleInstance => DeploymentMode::SingleInstance,
            ModeArg::MultiReplica => DeploymentMode::MultiReplica,
        }
    }
}

/// Test type selection on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TypeArg {
    Sanity,
    Integration,
    Load,
    Stress,
    Performance,
    Scalability,
    Endurance,
    Reliability,
    Chaos,
    Regression,
    Security,
}

impl TypeArg {
    fn to_lib(self) -> TestType {
        match self {
            TypeArg::Sanity => TestType::Sanity,
            TypeArg::Integration => TestType::Integration,
            TypeArg::Load => TestType::Load,
            TypeArg::Stress => TestType::Stress,
            TypeArg::Performance => TestType::Performance,
            TypeArg::Scalability => TestType::Scalability,
            TypeArg::Endurance => TestType::Endurance,
            TypeArg::Reliability => TestType::Reliability,
            TypeArg::Chaos => TestType::Chaos,
            TypeArg::Regression => TestType::Regression,
            TypeArg::Security => TestType::Security,
        }
    }
}

/// Report format selection on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    Csv,
    Markdown,
    Html,
}

impl FormatArg {
    fn to_lib(self) -> ReportFormat {
        match self {
            FormatArg::Json => ReportFormat::Json,
            FormatArg::Csv => ReportFormat::Csv,
            FormatArg::Markdown => ReportFormat::Markdown,
            FormatArg::Html => ReportFormat::Html,
        }
    }
}

/// Promprobe - test orchestration harness for Prometheus-compatible services
#[derive(Parser, Debug)]
#[command(name = "promprobe", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    // ─────────────────────────────────────────────────────────────────────────
    // Global options (available for all subcommands)
    // ─────────────────────────────────────────────────────────────────────────
    /// Path to configuration file
    #[arg(short, long, default_value = "promprobe.yml", global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output mode (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the selected test suites against a target
    Run(RunArgs),

    /// Regenerate reports from a previously saved structured result
    Report(ReportArgs),

    /// Tear down resources created by a previous run
    Cleanup(CleanupArgs),

    /// Check target health and readiness without running tests
    Status(StatusArgs),

    /// List supported platforms, test types, and report formats
    Info,
}

/// Arguments for the run subcommand.
#[derive(Parser, Debug)]
struct RunArgs {
    /// Deployment platform (overrides config)
    #[arg(long, value_enum)]
    platform: Option<PlatformArg>,

    /// Deployment mode (overrides config)
    #[arg(long, value_enum)]
    deployment_mode: Option<ModeArg>,

    /// Test types to run; repeatable. Defaults to the types enabled in config
    #[arg(short = 't', long = "type", value_enum)]
    types: Vec<TypeArg>,

    /// Attach to an existing Prometheus instead of deploying one
    #[arg(long)]
    prometheus_url: Option<String>,

    /// Override the virtual-user count for k6-driven test types
    #[arg(long)]
    k6_vus: Option<u32>,

    /// Override the k6 load duration (e.g. 5m)
    #[arg(long)]
    k6_duration: Option<String>,

    /// Run independent test types concurrently
    #[arg(long, conflicts_with = "sequential")]
    parallel: bool,

    /// Force strictly sequential execution (the default)
    #[arg(long, conflicts_with = "parallel")]
    sequential: bool,

    /// Global timeout in seconds for the whole run
    #[arg(long, value_name = "S")]
    timeout: Option<u64>,

    /// Abort remaining test types after the first failure
    #[arg(long)]
    fail_fast: bool,

    /// Directory for report output
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Report formats written after the run
    #[arg(long = "format", value_enum, default_values_t = [FormatArg::Json, FormatArg::Markdown])]
    formats: Vec<FormatArg>,

    /// Show the resolved configuration without deploying or executing
    #[arg(long)]
    dry_run: bool,
}

/// Arguments for the report subcommand.
#[derive(Parser, Debug)]
struct ReportArgs {
    /// Previously written JSON report to re-render
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Formats to render
    #[arg(long = "format", value_enum, default_values_t = [FormatArg::Json])]
    formats: Vec<FormatArg>,

    /// Directory for report output
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,
}

/// Arguments for the cleanup subcommand.
#[derive(Parser, Debug)]
struct CleanupArgs {
    /// Platform whose resources to tear down
    #[arg(long, value_enum, required_unless_present = "all")]
    platform: Option<PlatformArg>,

    /// Kubernetes namespace override
    #[arg(long, value_name = "N")]
    namespace: Option<String>,

    /// Exit zero even if a teardown step fails
    #[arg(long)]
    force: bool,

    /// Tear down every supported platform
    #[arg(long)]
    all: bool,
}

/// Arguments for the status subcommand.
#[derive(Parser, Debug)]
struct StatusArgs {
    /// Platform to check (builds its endpoint the same way run does)
    #[arg(long, value_enum)]
    platform: Option<PlatformArg>,

    /// Check a specific Prometheus URL directly
    #[arg(long)]
    prometheus_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run(args) => run_command(cli.config, cli.color, args).await,
        Commands::Report(args) => report_command(cli.color, args),
        Commands::Cleanup(args) => cleanup_command(cli.config, cli.color, args).await,
        Commands::Status(args) => status_command(cli.config, cli.color, args).await,
        Commands::Info => {
            info_command(cli.color);
            Ok(())
        }
    }
}

/// Loads configuration, exiting with the config-error code on failure.
fn load_config(path: &PathBuf, overrides: &CliOverrides, use_colors: bool) -> TestConfig {
    match TestConfig::load(Some(path), overrides) {
        Ok(config) => config,
        Err(err) => {
            display::print_error(&format!("configuration error: {err}"), use_colors);
            if matches!(err, ConfigError::UnsupportedMode { .. }) {
                display::print_hint(
                    "multi-replica mode needs a managed Kubernetes platform (eks, gke, aks, openshift)",
                    use_colors,
                );
            }
            std::process::exit(EXIT_CONFIG);
        }
    }
}

async fn run_command(config_path: PathBuf, color_mode: ColorMode, args: RunArgs) -> Result<()> {
    let use_colors = color_mode.should_use_colors();

    let overrides = CliOverrides {
        suite: None,
        platform: args.platform.map(PlatformArg::to_lib),
        deployment_mode: args.deployment_mode.map(ModeArg::to_lib),
        prometheus_url: args.prometheus_url.clone(),
        k6_vus: args.k6_vus,
        k6_duration: args.k6_duration.clone(),
        global_timeout: args.timeout.map(|secs| format!("{secs}s")),
        output_dir: args.output.clone(),
        thresholds_file: None,
    };
    let config = load_config(&config_path, &overrides, use_colors);

    // Explicit --type wins; otherwise whatever the config enables.
    let selected: Vec<TestType> = if args.types.is_empty() {
        config.tests.enabled_types()
    } else {
        args.types.iter().map(|t| t.to_lib()).collect()
    };

    if selected.is_empty() {
        display::print_error(
            "no test types selected: enable some in the config or pass --type",
            use_colors,
        );
        std::process::exit(EXIT_CONFIG);
    }

    if args.dry_run {
        display::print_dry_run(&config, &selected, args.parallel);
        return Ok(());
    }

    // Connect-only runs never provision; otherwise the factory picks the
    // deployer for the validated platform.
    let deployer = if config.connect_only() {
        info!(url = ?config.target.url, "Connect-only mode, skipping deployment");
        None
    } else {
        match deployer_for(&config) {
            Ok(deployer) => Some(deployer),
            Err(err) => {
                display::print_error(&format!("configuration error: {err}"), use_colors);
                std::process::exit(EXIT_CONFIG);
            }
        }
    };

    let runner = Runner::new(&config).on_progress(display::progress_printer(use_colors));

    // SIGINT cancels the in-flight test type and proceeds to teardown.
    let cancel = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let options = RunOptions {
        parallel: args.parallel,
        fail_fast: args.fail_fast,
    };
    let report = runner
        .run(deployer.as_deref(), &selected, &options)
        .await
        .context("runner failed")?;

    // Reports are written even after a fatal mid-run error; partial data is
    // strictly better than none.
    let formats: Vec<ReportFormat> = args.formats.iter().map(|f| f.to_lib()).collect();
    let writer = ReportWriter::new(&config.output_dir);
    match writer.write(&report.suite, &formats) {
        Ok(paths) => {
            for path in &paths {
                println!("report written: {}", path.display());
            }
        }
        Err(err) => display::print_error(&format!("failed to write reports: {err}"), use_colors),
    }

    print_failures(&report.suite, use_colors);
    print_summary(&report.suite, use_colors);

    let exit_code = report.outcome.exit_code(&report.suite);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

fn report_command(color_mode: ColorMode, args: ReportArgs) -> Result<()> {
    let use_colors = color_mode.should_use_colors();

    let suite = match promprobe_report::load(&args.input) {
        Ok(suite) => suite,
        Err(err) => {
            display::print_error(&format!("{err}"), use_colors);
            std::process::exit(1);
        }
    };

    let out_dir = args.output.unwrap_or_else(|| PathBuf::from("reports"));
    let formats: Vec<ReportFormat> = args.formats.iter().map(|f| f.to_lib()).collect();

    match ReportWriter::new(out_dir).write(&suite, &formats) {
        Ok(paths) => {
            for path in &paths {
                println!("report written: {}", path.display());
            }
            Ok(())
        }
        Err(err) => {
            display::print_error(&format!("{err}"), use_colors);
            std::process::exit(1);
        }
    }
}

async fn cleanup_command(
    config_path: PathBuf,
    color_mode: ColorMode,
    args: CleanupArgs,
) -> Result<()> {
    let use_colors = color_mode.should_use_colors();

    let platforms: Vec<Platform> = if args.all {
        Platform::all().to_vec()
    } else if let Some(platform) = args.platform {
        vec![platform.to_lib()]
    } else {
        // Unreachable: clap enforces required_unless_present = "all".
        display::print_error("--platform or --all is required", use_colors);
        std::process::exit(EXIT_CONFIG);
    };

    let mut failed = false;
    for platform in platforms {
        let overrides = CliOverrides::default();
        let mut config = load_config(&config_path, &overrides, use_colors);
        config.platform = platform;
        // Cleanup of a multi-replica run still tears down with the same
        // release name, so mode is irrelevant here.
        config.deployment_mode = DeploymentMode::SingleInstance;
        if let Some(namespace) = &args.namespace {
            config.target.namespace = namespace.clone();
        }

        let deployer = match deployer_for(&config) {
            Ok(deployer) => deployer,
            Err(err) => {
                display::print_error(&format!("{err}"), use_colors);
                failed = true;
                continue;
            }
        };

        match deployer.teardown().await {
            Ok(()) => println!("cleaned up {platform}"),
            Err(err) => {
                display::print_error(&format!("cleanup on {platform} failed: {err}"), use_colors);
                failed = true;
            }
        }
    }

    if failed && !args.force {
        std::process::exit(1);
    }
    Ok(())
}

async fn status_command(
    config_path: PathBuf,
    color_mode: ColorMode,
    args: StatusArgs,
) -> Result<()> {
    let use_colors = color_mode.should_use_colors();

    let overrides = CliOverrides {
        platform: args.platform.map(PlatformArg::to_lib),
        prometheus_url: args.prometheus_url.clone(),
        ..CliOverrides::default()
    };
    let config = load_config(&config_path, &overrides, use_colors);

    let (healthy, ready) = if let Some(url) = &config.target.url {
        let client = PromClient::new(url.clone(), config.request_timeout());
        (
            client.health().await.unwrap_or(false),
            client.ready().await.unwrap_or(false),
        )
    } else {
        let deployer = match deployer_for(&config) {
            Ok(deployer) => deployer,
            Err(err) => {
                display::print_error(&format!("{err}"), use_colors);
                std::process::exit(EXIT_CONFIG);
            }
        };
        (
            deployer.is_healthy().await.unwrap_or(false),
            deployer.is_ready().await.unwrap_or(false),
        )
    };

    display::print_status(healthy, ready, use_colors);

    if !(healthy && ready) {
        std::process::exit(1);
    }
    Ok(())
}

fn info_command(color_mode: ColorMode) {
    display::print_info(color_mode.should_use_colors());
}
