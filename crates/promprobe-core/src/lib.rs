//! # promprobe-core
//!
//! Core orchestration functionality for the Promprobe harness.
//!
//! This crate provides:
//! - Configuration loading, env-var expansion, and schema validation
//! - The test-type taxonomy and platform/deployment-mode model
//! - The deployer seam implemented by `promprobe-deploy`
//! - The suite runner: phase sequencing, exclusivity scheduling, fail-fast,
//!   global timeout, and cancellation
//! - Threshold evaluation and result aggregation

pub mod config;
mod deployer;
mod duration;
mod result;
mod runner;
pub mod strategy;
mod threshold;
mod types;

pub use config::{CliOverrides, ConfigError, TargetConfig, TestConfig, ToolPaths};
pub use deployer::{DeployError, PlatformDeployer, wait_until_ready};
pub use duration::{format_duration, parse_duration};
pub use result::{MetricObservation, SuiteResult, TestResult, TestStatus};
pub use runner::{
    Phase, ProgressCallback, ProgressEvent, RunOptions, RunOutcome, RunReport, Runner,
    RunnerError,
};
pub use strategy::{StrategyContext, StrategyError, TestStrategy, strategy_for};
pub use threshold::{
    Direction, MetricVerdict, ThresholdEntry, ThresholdTable, VerdictOutcome, default_table,
    evaluate,
};
pub use types::{DeploymentMode, Platform, TestType};
