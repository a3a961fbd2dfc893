//! Reliability: periodic health probes with a failure budget.

use super::{StrategyContext, StrategyError, TestStrategy};
use crate::duration::parse_duration;
use crate::result::{MetricObservation, TestResult};
use crate::threshold::evaluate;
use crate::types::TestType;
use async_trait::async_trait;
use std::time::Instant;
use tracing::debug;

/// Probes the target on a fixed interval over the configured window and
/// reports the probe success rate and longest observed outage.
///
/// Transport failures here are observations, not infrastructure errors:
/// measuring them is the point of this type.
pub struct ReliabilityStrategy;

#[async_trait]
impl TestStrategy for ReliabilityStrategy {
    fn test_type(&self) -> TestType {
        TestType::Reliability
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<TestResult, StrategyError> {
        let started = Instant::now();
        let reliability = &ctx.config.tests.reliability;
        let interval = parse_duration(&reliability.probe_interval).ok_or_else(|| {
            StrategyError::Other(format!(
                "bad probe interval '{}'",
                reliability.probe_interval
            ))
        })?;
        let window = parse_duration(&reliability.duration).ok_or_else(|| {
            StrategyError::Other(format!("bad duration '{}'", reliability.duration))
        })?;

        let mut probes = 0u32;
        let mut failures = 0u32;
        let mut outage_start: Option<Instant> = None;
        let mut max_outage = std::time::Duration::ZERO;
        let deadline = Instant::now() + window;

        while Instant::now() < deadline {
            probes += 1;
            let ok = matches!(ctx.client.health().await, Ok(true));
            debug!(probes, ok, "Reliability probe");

            if ok {
                if let Some(start) = outage_start.take() {
                    max_outage = max_outage.max(start.elapsed());
                }
            } else {
                failures += 1;
                outage_start.get_or_insert_with(Instant::now);
            }

            tokio::time::sleep(interval).await;
        }

        // An outage still open at the end of the window counts in full.
        if let Some(start) = outage_start {
            max_outage = max_outage.max(start.elapsed());
        }

        let success_rate = if probes == 0 {
            1.0
        } else {
            f64::from(probes - failures) / f64::from(probes)
        };

        let mut errors = Vec::new();
        if failures > reliability.failure_budget {
            errors.push(format!(
                "{failures} failed probes exceed the budget of {}",
                reliability.failure_budget
            ));
        }

        let observations = vec![
            MetricObservation::new("probe_success_rate", success_rate, "ratio"),
            MetricObservation::new("max_outage_s", max_outage.as_secs_f64(), "s"),
        ];
        let verdicts = evaluate(TestType::Reliability, &observations, &ctx.config.thresholds);

        Ok(TestResult::from_evaluation(
            TestType::Reliability,
            started.elapsed(),
            observations,
            verdicts,
            errors,
        ))
    }
}
