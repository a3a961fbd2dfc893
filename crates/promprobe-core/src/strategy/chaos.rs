//! Chaos: disrupt the target and measure recovery.

use super::{StrategyContext, StrategyError, TestStrategy};
use crate::deployer::wait_until_ready;
use crate::result::{MetricObservation, TestResult};
use crate::threshold::evaluate;
use crate::types::TestType;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{info, warn};

/// Runs each configured disruption scenario and measures how long the
/// target takes to become ready again.
///
/// Requires a managed deployment: in connect-only mode there is nothing the
/// harness may disrupt, and the type is reported skipped.
pub struct ChaosStrategy;

#[async_trait]
impl TestStrategy for ChaosStrategy {
    fn test_type(&self) -> TestType {
        TestType::Chaos
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<TestResult, StrategyError> {
        let Some(deployer) = ctx.deployer else {
            return Ok(TestResult::skipped(
                TestType::Chaos,
                "chaos requires a harness-managed deployment (connect-only mode)",
            ));
        };

        let started = Instant::now();
        let mut errors = Vec::new();
        let mut worst_recovery_s: f64 = 0.0;

        for scenario in &ctx.config.tests.chaos.scenarios {
            info!(scenario, "Running chaos scenario");
            match scenario.as_str() {
                "restart-target" => {
                    let recovery_start = Instant::now();
                    deployer
                        .teardown()
                        .await
                        .map_err(|err| StrategyError::Other(err.to_string()))?;
                    deployer
                        .deploy()
                        .await
                        .map_err(|err| StrategyError::Other(err.to_string()))?;
                    wait_until_ready(deployer, ctx.config.deploy_timeout())
                        .await
                        .map_err(|err| StrategyError::Other(err.to_string()))?;

                    worst_recovery_s = worst_recovery_s.max(recovery_start.elapsed().as_secs_f64());
                }
                other => {
                    warn!(scenario = other, "Unknown chaos scenario");
                    errors.push(format!("unknown chaos scenario '{other}'"));
                }
            }
        }

        let observations = vec![MetricObservation::new(
            "recovery_s",
            worst_recovery_s,
            "s",
        )];
        let verdicts = evaluate(TestType::Chaos, &observations, &ctx.config.thresholds);

        Ok(TestResult::from_evaluation(
            TestType::Chaos,
            started.elapsed(),
            observations,
            verdicts,
            errors,
        ))
    }
}
