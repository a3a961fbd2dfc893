//! k6-driven traffic strategies: load, stress, and endurance.
//!
//! All three generate traffic through the external k6 binary and differ
//! only in the scenario shape: steady (load), ramped stages (stress), or
//! low-intensity long-horizon (endurance).

use super::{StrategyContext, StrategyError, TestStrategy, to_observations};
use crate::config::TestConfig;
use crate::duration::parse_duration;
use crate::result::TestResult;
use crate::threshold::evaluate;
use crate::types::TestType;
use async_trait::async_trait;
use promprobe_client::{K6Options, K6Stage};
use std::time::Instant;
use tracing::info;

fn base_options(config: &TestConfig, target_url: &str) -> K6Options {
    let mut options = K6Options::new(target_url);
    options.binary = config.tools.k6.clone();
    options
}

async fn run_k6(
    test_type: TestType,
    options: K6Options,
    ctx: &StrategyContext<'_>,
) -> Result<TestResult, StrategyError> {
    let started = Instant::now();
    info!(%test_type, vus = options.virtual_users, stages = options.stages.len(), "Starting k6 scenario");

    let summary = ctx.k6.run(&options).await?;
    let observations = to_observations(summary.observations());
    let verdicts = evaluate(test_type, &observations, &ctx.config.thresholds);

    Ok(TestResult::from_evaluation(
        test_type,
        started.elapsed(),
        observations,
        verdicts,
        Vec::new(),
    ))
}

/// Steady traffic at the configured virtual-user count.
pub struct LoadStrategy;

#[async_trait]
impl TestStrategy for LoadStrategy {
    fn test_type(&self) -> TestType {
        TestType::Load
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<TestResult, StrategyError> {
        let load = &ctx.config.tests.load;
        let mut options = base_options(ctx.config, ctx.client.base_url());
        options.virtual_users = load.virtual_users;
        options.duration = parse_duration(&load.duration)
            .ok_or_else(|| StrategyError::Other(format!("bad load duration '{}'", load.duration)))?;
        options.rps = load.rps;

        run_k6(TestType::Load, options, ctx).await
    }
}

/// Ramped traffic through the configured stages.
pub struct StressStrategy;

#[async_trait]
impl TestStrategy for StressStrategy {
    fn test_type(&self) -> TestType {
        TestType::Stress
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<TestResult, StrategyError> {
        let stress = &ctx.config.tests.stress;
        let mut options = base_options(ctx.config, ctx.client.base_url());
        options.stages = stress
            .stages
            .iter()
            .map(|stage| {
                parse_duration(&stage.duration)
                    .map(|duration| K6Stage {
                        virtual_users: stage.virtual_users,
                        duration,
                    })
                    .ok_or_else(|| {
                        StrategyError::Other(format!("bad stage duration '{}'", stage.duration))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        run_k6(TestType::Stress, options, ctx).await
    }
}

/// Low-intensity traffic over a long horizon.
pub struct EnduranceStrategy;

#[async_trait]
impl TestStrategy for EnduranceStrategy {
    fn test_type(&self) -> TestType {
        TestType::Endurance
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<TestResult, StrategyError> {
        let endurance = &ctx.config.tests.endurance;
        let mut options = base_options(ctx.config, ctx.client.base_url());
        options.virtual_users = endurance.virtual_users;
        options.duration = parse_duration(&endurance.duration).ok_or_else(|| {
            StrategyError::Other(format!("bad endurance duration '{}'", endurance.duration))
        })?;

        run_k6(TestType::Endurance, options, ctx).await
    }
}
