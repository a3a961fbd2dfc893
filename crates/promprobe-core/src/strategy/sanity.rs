//! Sanity: quick post-deployment validation of reachability and health.

use super::{StrategyContext, StrategyError, TestStrategy, probe_with_retry};
use crate::result::{MetricObservation, TestResult};
use crate::threshold::evaluate;
use crate::types::TestType;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info};

/// Probes the configured endpoint list and checks each answers 2xx.
pub struct SanityStrategy;

#[async_trait]
impl TestStrategy for SanityStrategy {
    fn test_type(&self) -> TestType {
        TestType::Sanity
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<TestResult, StrategyError> {
        let started = Instant::now();

        // Classify a dead target as an infrastructure error up front, so the
        // result is `error` rather than a wall of failed endpoint probes.
        probe_with_retry(ctx.client).await?;

        let mut errors = Vec::new();
        let mut failures = 0u32;
        let mut worst_latency_ms: f64 = 0.0;

        for endpoint in &ctx.config.tests.sanity.endpoints {
            let probe_start = Instant::now();
            let ok = ctx.client.probe_endpoint(endpoint).await?;
            let latency_ms = probe_start.elapsed().as_secs_f64() * 1000.0;
            worst_latency_ms = worst_latency_ms.max(latency_ms);

            debug!(endpoint, ok, latency_ms, "Sanity probe");
            if !ok {
                failures += 1;
                errors.push(format!("endpoint {endpoint} did not return 2xx"));
            }
        }

        let observations = vec![
            MetricObservation::new("probe_latency_ms", worst_latency_ms, "ms"),
            MetricObservation::new("endpoint_failures", f64::from(failures), "count"),
        ];
        let verdicts = evaluate(TestType::Sanity, &observations, &ctx.config.thresholds);

        info!(
            endpoints = ctx.config.tests.sanity.endpoints.len(),
            failures, "Sanity checks complete"
        );

        Ok(TestResult::from_evaluation(
            TestType::Sanity,
            started.elapsed(),
            observations,
            verdicts,
            errors,
        ))
    }
}
