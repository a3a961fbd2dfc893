//! Scalability: query latency as load on the target steps up.

use super::{StrategyContext, StrategyError, TestStrategy, percentile};
use crate::duration::parse_duration;
use crate::result::{MetricObservation, TestResult};
use crate::threshold::evaluate;
use crate::types::TestType;
use async_trait::async_trait;
use promprobe_client::{ClientError, K6Options};
use std::time::Instant;
use tracing::info;

/// Steps through the configured series counts, driving proportional k6
/// traffic at each step and sampling query latency under it.
///
/// The worst per-step p99 is the reported observation, so the threshold
/// bounds the most loaded step.
pub struct ScalabilityStrategy;

impl ScalabilityStrategy {
    /// Virtual users driven for a step, proportional to the series target.
    fn vus_for_step(series_count: u64) -> u32 {
        u32::try_from((series_count / 1_000).clamp(1, 200)).unwrap_or(200)
    }
}

#[async_trait]
impl TestStrategy for ScalabilityStrategy {
    fn test_type(&self) -> TestType {
        TestType::Scalability
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<TestResult, StrategyError> {
        let started = Instant::now();
        let scalability = &ctx.config.tests.scalability;
        let step_duration = parse_duration(&scalability.step_duration).ok_or_else(|| {
            StrategyError::Other(format!(
                "bad step duration '{}'",
                scalability.step_duration
            ))
        })?;

        let mut worst_p99_ms: f64 = 0.0;
        let mut errors = Vec::new();

        for series_count in &scalability.series_counts {
            let vus = Self::vus_for_step(*series_count);
            info!(series_count, vus, "Scalability step");

            let mut options = K6Options::new(ctx.client.base_url());
            options.binary = ctx.config.tools.k6.clone();
            options.virtual_users = vus;
            options.duration = step_duration;

            // Traffic and measurement run concurrently: k6 occupies the
            // target while we sample query latency from the side.
            let k6_run = ctx.k6.run(&options);
            let sampling = sample_latencies(ctx, step_duration);
            let (k6_result, latencies_ms) = tokio::join!(k6_run, sampling);

            if let Err(err) = k6_result {
                errors.push(format!("step {series_count}: k6 failed: {err}"));
                continue;
            }
            let latencies_ms = latencies_ms?;

            if let Some(p99) = percentile(&latencies_ms, 99.0) {
                worst_p99_ms = worst_p99_ms.max(p99);
            }
        }

        let mut observations = vec![MetricObservation::new(
            "query_latency_p99_ms",
            worst_p99_ms,
            "ms",
        )];
        if let Ok(head_series) = ctx.client.tsdb_head_series().await {
            observations.push(MetricObservation::new(
                "head_series_count",
                head_series as f64,
                "count",
            ));
        }

        let verdicts = evaluate(TestType::Scalability, &observations, &ctx.config.thresholds);

        Ok(TestResult::from_evaluation(
            TestType::Scalability,
            started.elapsed(),
            observations,
            verdicts,
            errors,
        ))
    }
}

/// Samples `up` query latency once per second for the step duration.
async fn sample_latencies(
    ctx: &StrategyContext<'_>,
    window: std::time::Duration,
) -> Result<Vec<f64>, StrategyError> {
    let mut latencies_ms = Vec::new();
    let deadline = Instant::now() + window;

    while Instant::now() < deadline {
        let sample_start = Instant::now();
        match ctx.client.query("up").await {
            Ok(_) => latencies_ms.push(sample_start.elapsed().as_secs_f64() * 1000.0),
            Err(err @ (ClientError::Connection { .. } | ClientError::Timeout { .. })) => {
                return Err(err.into());
            }
            Err(_) => {}
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }

    Ok(latencies_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vus_scale_with_series_count() {
        assert_eq!(ScalabilityStrategy::vus_for_step(500), 1);
        assert_eq!(ScalabilityStrategy::vus_for_step(1_000), 1);
        assert_eq!(ScalabilityStrategy::vus_for_step(10_000), 10);
        assert_eq!(ScalabilityStrategy::vus_for_step(100_000), 100);
        // Capped so a huge step cannot melt the harness host.
        assert_eq!(ScalabilityStrategy::vus_for_step(10_000_000), 200);
    }
}
